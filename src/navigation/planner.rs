// src/navigation/planner.rs
// Composes graph search and command synthesis into a single planning call.
// Pure: the caller owns the position tracker and decides what to do with the route.

use super::{Node, Route, RouteError, Topology, synthesize_commands};
use log::{debug, info};
use std::sync::Arc;

/// Plans routes over a static topology
#[derive(Clone)]
pub struct RoutePlanner {
    topology: Arc<Topology>,
}

impl RoutePlanner {
    pub fn new(topology: Arc<Topology>) -> Self {
        RoutePlanner { topology }
    }

    /// Map the planner works on
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Plan a route from `start` to `destination`.
    /// - `real_previous`: node the robot occupied before `start`, from the tracker.
    /// Fails with `RouteNotFound` when unreachable, or `CommandLengthMismatch` when the
    /// synthesized commands do not line up with the path.
    pub fn plan(
        &self,
        real_previous: &Node,
        start: &Node,
        destination: &Node,
    ) -> Result<Route, RouteError> {
        let found = self
            .topology
            .graph
            .shortest_path(start.as_str(), destination.as_str())?;

        let synthesis = synthesize_commands(&self.topology.actions, real_previous, &found.path);
        if !synthesis.fallbacks.is_empty() {
            debug!(
                "Route {} -> {} used {} fallback commands",
                start,
                destination,
                synthesis.fallbacks.len()
            );
        }

        check_lengths(&found.path, &synthesis.commands)?;

        info!(
            "Route planned {} -> {} (cost {}): {}",
            start,
            destination,
            found.cost,
            found
                .path
                .iter()
                .map(Node::as_str)
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        Ok(Route {
            cost: found.cost,
            path: found.path,
            commands: synthesis.commands,
        })
    }
}

/// One command per path node, never empty. Never padded or truncated.
fn check_lengths<T, U>(path: &[T], commands: &[U]) -> Result<(), RouteError> {
    if path.is_empty() || path.len() != commands.len() {
        return Err(RouteError::CommandLengthMismatch {
            path: path.len(),
            commands: commands.len(),
        });
    }
    Ok(())
}
