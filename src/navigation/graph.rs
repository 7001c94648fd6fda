// src/navigation/graph.rs
// Static weighted map graph and Dijkstra shortest-path search.

use super::{MapError, Node, RouteError};
use log::debug;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

/// Adjacency map of the environment: node -> (neighbor -> weight)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    adjacency: BTreeMap<Node, BTreeMap<Node, u32>>,
}

/// Shortest path found by [`Graph::shortest_path`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResult {
    /// Total path cost
    pub cost: u64,
    /// Nodes from start to destination, both included
    pub path: Vec<Node>,
}

/// Priority queue entry, ordered so that `BinaryHeap` pops the lowest cost first
#[derive(Debug, Clone, PartialEq, Eq)]
struct SearchState {
    cost: u64,
    node: Node,
}

impl Ord for SearchState {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for SearchState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Graph::default()
    }

    /// Add an undirected edge, declared symmetrically in both adjacency lists
    pub fn add_edge(
        &mut self,
        a: impl Into<Node>,
        b: impl Into<Node>,
        weight: u32,
    ) -> Result<(), MapError> {
        let (a, b) = (a.into(), b.into());
        self.add_directed_edge(a.clone(), b.clone(), weight)?;
        self.add_directed_edge(b, a, weight)
    }

    /// Add a one-way edge; the target becomes a known node even without outgoing edges
    pub fn add_directed_edge(
        &mut self,
        from: impl Into<Node>,
        to: impl Into<Node>,
        weight: u32,
    ) -> Result<(), MapError> {
        let (from, to) = (from.into(), to.into());
        if weight == 0 {
            return Err(MapError::NonPositiveWeight {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        self.adjacency.entry(to.clone()).or_default();
        self.adjacency.entry(from).or_default().insert(to, weight);
        Ok(())
    }

    /// Register a node with no edges
    pub fn add_node(&mut self, node: impl Into<Node>) {
        self.adjacency.entry(node.into()).or_default();
    }

    /// Whether the node is part of the graph
    pub fn contains(&self, node: &str) -> bool {
        self.adjacency.contains_key(node)
    }

    /// All nodes, in label order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.adjacency.keys()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Neighbors of a node with their edge weights; empty for unknown nodes
    pub fn neighbors(&self, node: &str) -> impl Iterator<Item = (&Node, u32)> {
        self.adjacency
            .get(node)
            .into_iter()
            .flat_map(|edges| edges.iter().map(|(n, w)| (n, *w)))
    }

    /// Weight of the edge `from -> to`, if declared
    pub fn edge_weight(&self, from: &str, to: &str) -> Option<u32> {
        self.adjacency.get(from).and_then(|edges| edges.get(to)).copied()
    }

    /// Find the minimum-cost path between two nodes with Dijkstra's algorithm.
    ///
    /// Stale queue entries are skipped instead of decreasing keys, and the search
    /// stops as soon as the destination is popped. Among equal-cost paths the one
    /// returned is not specified.
    pub fn shortest_path(&self, start: &str, destination: &str) -> Result<PathResult, RouteError> {
        if start == destination {
            return Ok(PathResult {
                cost: 0,
                path: vec![Node::from(start)],
            });
        }

        let mut costs: HashMap<Node, u64> = HashMap::new();
        let mut parents: HashMap<Node, Node> = HashMap::new();
        let mut queue = BinaryHeap::new();

        costs.insert(Node::from(start), 0);
        queue.push(SearchState {
            cost: 0,
            node: Node::from(start),
        });

        let mut reached = false;
        while let Some(SearchState { cost, node }) = queue.pop() {
            if cost > costs.get(&node).copied().unwrap_or(u64::MAX) {
                continue;
            }

            if node.as_str() == destination {
                reached = true;
                break;
            }

            for (neighbor, weight) in self.neighbors(node.as_str()) {
                let next_cost = cost + u64::from(weight);
                if next_cost < costs.get(neighbor).copied().unwrap_or(u64::MAX) {
                    costs.insert(neighbor.clone(), next_cost);
                    parents.insert(neighbor.clone(), node.clone());
                    queue.push(SearchState {
                        cost: next_cost,
                        node: neighbor.clone(),
                    });
                }
            }
        }

        if !reached {
            debug!("Search exhausted without reaching {} from {}", destination, start);
            return Err(RouteError::RouteNotFound {
                start: start.to_string(),
                destination: destination.to_string(),
            });
        }

        let mut path = vec![Node::from(destination)];
        let mut current = destination;
        while let Some(parent) = parents.get(current) {
            path.push(parent.clone());
            current = parent.as_str();
        }
        path.reverse();

        Ok(PathResult {
            cost: costs.get(destination).copied().unwrap_or_default(),
            path,
        })
    }
}
