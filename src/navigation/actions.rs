// src/navigation/actions.rs
// Decision table lookups that turn a node path into driving commands.

use super::{Command, Graph, Node};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Command substituted when a decision key has no table entry
pub const FALLBACK_COMMAND: Command = Command::Straight;

/// Exact (previous, current, next) triple used to look up a maneuver
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DecisionKey {
    /// Node the robot came from
    pub previous: Node,
    /// Node where the decision is taken
    pub current: Node,
    /// Node the robot heads to
    pub next: Node,
}

impl DecisionKey {
    /// Build a key from three node labels
    pub fn new(previous: impl Into<Node>, current: impl Into<Node>, next: impl Into<Node>) -> Self {
        DecisionKey {
            previous: previous.into(),
            current: current.into(),
            next: next.into(),
        }
    }

    /// Whether the maneuver sends the robot back where it came from
    pub fn is_u_turn(&self) -> bool {
        self.previous == self.next && self.previous != self.current
    }
}

impl fmt::Display for DecisionKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.previous, self.current, self.next)
    }
}

/// Maps decision keys to commands. Lookups that miss are counted.
#[derive(Debug, Default)]
pub struct ActionTable {
    entries: HashMap<DecisionKey, Command>,
    fallbacks: AtomicU64,
}

impl ActionTable {
    /// Create an empty table
    pub fn new() -> Self {
        ActionTable::default()
    }

    /// Insert or replace the command for a key
    pub fn insert(&mut self, key: DecisionKey, command: Command) -> Option<Command> {
        self.entries.insert(key, command)
    }

    /// Exact lookup, no fallback applied
    pub fn get(&self, key: &DecisionKey) -> Option<Command> {
        self.entries.get(key).copied()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&DecisionKey, &Command)> {
        self.entries.iter()
    }

    /// Total number of lookups that fell back to [`FALLBACK_COMMAND`]
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// Lookup used during synthesis; misses yield the fallback and are recorded
    fn resolve(&self, key: &DecisionKey) -> (Command, bool) {
        match self.get(key) {
            Some(command) => {
                debug!("Decision {} -> {}", key, command);
                (command, false)
            }
            None => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "No action for decision {}, falling back to {}",
                    key, FALLBACK_COMMAND
                );
                (FALLBACK_COMMAND, true)
            }
        }
    }

    /// List every triple reachable by legal traversal that has no entry.
    ///
    /// Covers (a, b, c) for every b and every pair of neighbors a, c of b, U-turns
    /// included, plus the stationary start triples (home, home, c).
    pub fn coverage_gaps(&self, graph: &Graph, home: &Node) -> Vec<DecisionKey> {
        let mut gaps = Vec::new();

        for current in graph.nodes() {
            let neighbors: Vec<&Node> = graph.neighbors(current.as_str()).map(|(n, _)| n).collect();
            for previous in &neighbors {
                // The robot must have been able to drive previous -> current
                if graph.edge_weight(previous.as_str(), current.as_str()).is_none() {
                    continue;
                }
                for next in &neighbors {
                    let key =
                        DecisionKey::new((*previous).clone(), current.clone(), (*next).clone());
                    if !self.entries.contains_key(&key) {
                        gaps.push(key);
                    }
                }
            }
        }

        for (next, _) in graph.neighbors(home.as_str()) {
            let key = DecisionKey::new(home.clone(), home.clone(), next.clone());
            if !self.entries.contains_key(&key) {
                gaps.push(key);
            }
        }

        gaps.sort();
        gaps
    }
}

impl FromIterator<(DecisionKey, Command)> for ActionTable {
    fn from_iter<I: IntoIterator<Item = (DecisionKey, Command)>>(iter: I) -> Self {
        ActionTable {
            entries: iter.into_iter().collect(),
            fallbacks: AtomicU64::new(0),
        }
    }
}

/// Output of [`synthesize_commands`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    /// One command per path node, ending with `stop`
    pub commands: Vec<Command>,
    /// Keys that were missing from the table and got the fallback
    pub fallbacks: Vec<DecisionKey>,
}

/// Derive driving commands for `path`, given where the robot really was before
/// `path[0]`.
///
/// A window of three slides over `[real_previous] ++ path`; each interior triple is
/// looked up in the table. `stop` is always appended for the destination.
pub fn synthesize_commands(table: &ActionTable, real_previous: &Node, path: &[Node]) -> Synthesis {
    let mut commands = Vec::with_capacity(path.len());
    let mut fallbacks = Vec::new();

    let extended: Vec<&Node> = std::iter::once(real_previous).chain(path.iter()).collect();
    for window in extended.windows(3) {
        let key = DecisionKey::new(window[0].clone(), window[1].clone(), window[2].clone());
        let (command, fell_back) = table.resolve(&key);
        if fell_back {
            fallbacks.push(key);
        }
        commands.push(command);
    }

    commands.push(Command::Stop);

    Synthesis { commands, fallbacks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn nodes(labels: &[&str]) -> Vec<Node> {
        labels.iter().map(|l| Node::from(*l)).collect()
    }

    #[fixture]
    fn table() -> ActionTable {
        [
            (DecisionKey::new("Branco", "Branco", "Lilás"), Command::Straight),
            (DecisionKey::new("Branco", "Lilás", "Amarelo"), Command::Straight),
            (DecisionKey::new("Lilás", "Amarelo", "Laranja"), Command::Left),
            (DecisionKey::new("Amarelo", "Lilás", "Amarelo"), Command::Reverse),
        ]
        .into_iter()
        .collect()
    }

    #[rstest]
    fn commands_follow_table_and_end_with_stop(table: ActionTable) {
        let path = nodes(&["Branco", "Lilás", "Amarelo", "Laranja"]);
        let synthesis = synthesize_commands(&table, &Node::from("Branco"), &path);

        assert_eq!(
            synthesis.commands,
            [Command::Straight, Command::Straight, Command::Left, Command::Stop]
        );
        assert!(synthesis.fallbacks.is_empty());
        assert_eq!(table.fallback_count(), 0);
    }

    #[rstest]
    fn real_previous_node_drives_first_decision(table: ActionTable) {
        let path = nodes(&["Lilás", "Amarelo"]);
        let synthesis = synthesize_commands(&table, &Node::from("Amarelo"), &path);
        assert_eq!(synthesis.commands, [Command::Reverse, Command::Stop]);
    }

    #[rstest]
    fn single_node_path_is_just_stop(table: ActionTable) {
        let synthesis = synthesize_commands(&table, &Node::from("Branco"), &nodes(&["Lilás"]));
        assert_eq!(synthesis.commands, [Command::Stop]);
    }

    #[rstest]
    fn missing_key_falls_back_to_straight_and_is_recorded(table: ActionTable) {
        let path = nodes(&["Lilás", "Roxo"]);
        let first = synthesize_commands(&table, &Node::from("Branco"), &path);
        let second = synthesize_commands(&table, &Node::from("Branco"), &path);

        assert_eq!(first, second);
        assert_eq!(first.commands, [Command::Straight, Command::Stop]);
        assert_eq!(first.fallbacks, [DecisionKey::new("Branco", "Lilás", "Roxo")]);
        assert_eq!(table.fallback_count(), 2);
    }

    #[test]
    fn coverage_gaps_lists_missing_turns_and_start_triples() {
        let mut graph = Graph::new();
        graph.add_edge("A", "B", 1).unwrap();
        graph.add_edge("B", "C", 1).unwrap();

        let table: ActionTable = [
            (DecisionKey::new("A", "B", "C"), Command::Straight),
            (DecisionKey::new("C", "B", "A"), Command::Straight),
            (DecisionKey::new("A", "B", "A"), Command::Reverse),
        ]
        .into_iter()
        .collect();

        let gaps = table.coverage_gaps(&graph, &Node::from("A"));
        assert_eq!(
            gaps,
            [
                DecisionKey::new("A", "A", "B"),
                DecisionKey::new("B", "A", "B"),
                DecisionKey::new("B", "C", "B"),
                DecisionKey::new("C", "B", "C"),
            ]
        );
    }

    #[test]
    fn u_turn_detection() {
        assert!(DecisionKey::new("A", "B", "A").is_u_turn());
        assert!(!DecisionKey::new("A", "A", "A").is_u_turn());
        assert!(!DecisionKey::new("A", "B", "C").is_u_turn());
    }
}
