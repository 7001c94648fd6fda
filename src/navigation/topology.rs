// src/navigation/topology.rs
// Static map data: graph, decision table and dashboard layout.
// Loaded once at startup, either from the embedded demo map or a YAML file.

use super::{ActionTable, Command, DecisionKey, Graph, MapError, Node};
use log::{info, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// Home node of the embedded demo map
pub const DEMO_HOME: &str = "Branco";

/// Map as written in a YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDefinition {
    /// Node where the robot starts
    pub home: String,
    /// node -> (neighbor -> weight); each declaration is one directed edge
    pub graph: BTreeMap<String, BTreeMap<String, u32>>,
    /// Decision table entries
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
    /// Dashboard coordinates in percent of the map view
    #[serde(default)]
    pub layout: BTreeMap<String, [f32; 2]>,
}

/// One decision table row in a map file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEntry {
    /// Node the robot came from
    pub previous: String,
    /// Decision node
    pub current: String,
    /// Node the robot heads to
    pub next: String,
    /// Maneuver to perform
    pub command: Command,
}

/// Validated, immutable map used by the planner
#[derive(Debug)]
pub struct Topology {
    /// Map graph
    pub graph: Graph,
    /// Decision table
    pub actions: ActionTable,
    /// Home node, initial tracker position
    pub home: Node,
    /// Dashboard positions of the nodes
    pub layout: BTreeMap<Node, Point2<f32>>,
}

impl Topology {
    /// Build a topology from a parsed definition
    pub fn from_definition(definition: MapDefinition) -> Result<Self, MapError> {
        let mut graph = Graph::new();
        for (from, edges) in &definition.graph {
            graph.add_node(from.as_str());
            for (to, weight) in edges {
                graph.add_directed_edge(from.as_str(), to.as_str(), *weight)?;
            }
        }

        let home = Node::new(definition.home);
        if !graph.contains(home.as_str()) {
            return Err(MapError::UnknownHome(home.to_string()));
        }

        let actions = definition
            .actions
            .into_iter()
            .map(|entry| {
                (
                    DecisionKey::new(entry.previous, entry.current, entry.next),
                    entry.command,
                )
            })
            .collect();

        let layout = definition
            .layout
            .into_iter()
            .map(|(node, [x, y])| (Node::new(node), Point2::new(x, y)))
            .collect();

        Ok(Topology {
            graph,
            actions,
            home,
            layout,
        })
    }

    /// Load a topology from a YAML map file
    pub fn load(path: &Path) -> Result<Self, MapError> {
        let file = File::open(path)?;
        let definition: MapDefinition = serde_yaml::from_reader(file)?;
        let topology = Topology::from_definition(definition)?;
        info!(
            "Loaded map from {}: {} nodes, {} actions",
            path.display(),
            topology.graph.len(),
            topology.actions.len()
        );
        Ok(topology)
    }

    /// Override the home node
    pub fn with_home(mut self, home: &str) -> Result<Self, MapError> {
        if !self.graph.contains(home) {
            return Err(MapError::UnknownHome(home.to_string()));
        }
        self.home = Node::from(home);
        Ok(self)
    }

    /// Log every decision triple the table does not cover. Returns the gap count.
    pub fn report_coverage(&self) -> usize {
        let gaps = self.actions.coverage_gaps(&self.graph, &self.home);
        for gap in &gaps {
            warn!("Action table has no entry for {}", gap);
        }
        if gaps.is_empty() {
            info!("Action table covers every reachable decision");
        }
        gaps.len()
    }

    /// The 11-node color map of the demo floor
    pub fn demo() -> Self {
        let mut graph = Graph::new();
        let mut actions = ActionTable::new();
        let home = Node::from(DEMO_HOME);

        for (a, b) in DEMO_EDGES {
            let added = graph.add_edge(*a, *b, 1);
            debug_assert!(added.is_ok(), "invalid demo edge {}-{}", a, b);
        }

        for (previous, current, next, command) in DEMO_ACTIONS {
            actions.insert(DecisionKey::new(*previous, *current, *next), *command);
        }

        // Turning around on the spot
        let u_turns: Vec<DecisionKey> = actions
            .coverage_gaps(&graph, &home)
            .into_iter()
            .filter(DecisionKey::is_u_turn)
            .collect();
        for key in u_turns {
            actions.insert(key, Command::Reverse);
        }

        let layout = DEMO_LAYOUT
            .iter()
            .map(|(node, x, y)| (Node::from(*node), Point2::new(*x, *y)))
            .collect();

        Topology {
            graph,
            actions,
            home,
            layout,
        }
    }
}

const DEMO_EDGES: &[(&str, &str)] = &[
    ("Vermelho", "Laranja"),
    ("Vermelho", "Ciano"),
    ("Laranja", "Amarelo"),
    ("Laranja", "Azul-acinzentado"),
    ("Amarelo", "Verde"),
    ("Amarelo", "Lilás"),
    ("Ciano", "Azul-acinzentado"),
    ("Azul-acinzentado", "Lilás"),
    ("Lilás", "Roxo"),
    ("Lilás", "Branco"),
    ("Verde", "Azul"),
    ("Azul", "Azul-escuro"),
    ("Azul-escuro", "Roxo"),
];

use Command::{Left, Right, Straight};

const DEMO_ACTIONS: &[(&str, &str, &str, Command)] = &[
    // Leaving home
    ("Branco", "Branco", "Lilás", Straight),
    // Lilás
    ("Branco", "Lilás", "Amarelo", Straight),
    ("Branco", "Lilás", "Roxo", Right),
    ("Branco", "Lilás", "Azul-acinzentado", Left),
    ("Amarelo", "Lilás", "Roxo", Left),
    ("Amarelo", "Lilás", "Azul-acinzentado", Right),
    ("Amarelo", "Lilás", "Branco", Straight),
    ("Roxo", "Lilás", "Azul-acinzentado", Straight),
    ("Roxo", "Lilás", "Amarelo", Right),
    ("Roxo", "Lilás", "Branco", Left),
    ("Azul-acinzentado", "Lilás", "Roxo", Straight),
    ("Azul-acinzentado", "Lilás", "Amarelo", Left),
    ("Azul-acinzentado", "Lilás", "Branco", Right),
    // Amarelo
    ("Laranja", "Amarelo", "Verde", Straight),
    ("Laranja", "Amarelo", "Lilás", Right),
    ("Verde", "Amarelo", "Laranja", Straight),
    ("Verde", "Amarelo", "Lilás", Left),
    ("Lilás", "Amarelo", "Verde", Right),
    ("Lilás", "Amarelo", "Laranja", Left),
    // Laranja
    ("Vermelho", "Laranja", "Amarelo", Straight),
    ("Vermelho", "Laranja", "Azul-acinzentado", Right),
    ("Amarelo", "Laranja", "Vermelho", Straight),
    ("Amarelo", "Laranja", "Azul-acinzentado", Left),
    ("Azul-acinzentado", "Laranja", "Amarelo", Right),
    ("Azul-acinzentado", "Laranja", "Vermelho", Left),
    // Azul-acinzentado
    ("Ciano", "Azul-acinzentado", "Lilás", Straight),
    ("Ciano", "Azul-acinzentado", "Laranja", Left),
    ("Lilás", "Azul-acinzentado", "Ciano", Straight),
    ("Lilás", "Azul-acinzentado", "Laranja", Right),
    ("Laranja", "Azul-acinzentado", "Lilás", Left),
    ("Laranja", "Azul-acinzentado", "Ciano", Right),
    // Corners
    ("Laranja", "Vermelho", "Ciano", Left),
    ("Ciano", "Vermelho", "Laranja", Right),
    ("Lilás", "Roxo", "Azul-escuro", Straight),
    ("Azul-escuro", "Roxo", "Lilás", Straight),
    // Pass-through nodes
    ("Vermelho", "Ciano", "Azul-acinzentado", Straight),
    ("Azul-acinzentado", "Ciano", "Vermelho", Straight),
    ("Amarelo", "Verde", "Azul", Straight),
    ("Azul", "Verde", "Amarelo", Straight),
    ("Verde", "Azul", "Azul-escuro", Right),
    ("Azul-escuro", "Azul", "Verde", Left),
    ("Azul", "Azul-escuro", "Roxo", Right),
    ("Roxo", "Azul-escuro", "Azul", Left),
];

const DEMO_LAYOUT: &[(&str, f32, f32)] = &[
    ("Vermelho", 10.0, 20.0),
    ("Laranja", 30.0, 20.0),
    ("Amarelo", 50.0, 20.0),
    ("Verde", 70.0, 20.0),
    ("Azul", 90.0, 20.0),
    ("Ciano", 10.0, 50.0),
    ("Azul-acinzentado", 30.0, 50.0),
    ("Lilás", 50.0, 50.0),
    ("Roxo", 70.0, 50.0),
    ("Azul-escuro", 90.0, 50.0),
    ("Branco", 50.0, 80.0),
];
