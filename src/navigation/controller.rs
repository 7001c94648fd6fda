// src/navigation/controller.rs
// Planning entry point. Reads the tracked position, plans, hands the commands to the
// robot and only then advances the tracker. One request at a time.

use super::{Node, Route, RouteError, RoutePlanner};
use crate::core::state::{NavigationState, PlanningPhase, PositionTracker};
use crate::core::status::SharedStatus;
use crate::messaging::{Publisher, topics};
use log::{error, info, warn};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Inbound route request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteRequest {
    /// Node to drive to
    pub destination: String,
    /// Where the client believes the robot is. Advisory only.
    #[serde(default)]
    pub start: Option<String>,
}

impl RouteRequest {
    pub fn to(destination: impl Into<String>) -> Self {
        RouteRequest {
            destination: destination.into(),
            start: None,
        }
    }
}

pub struct RouteController {
    planner: RoutePlanner,
    state: Mutex<NavigationState>,
    publisher: Arc<dyn Publisher>,
    status: SharedStatus,
}

impl RouteController {
    pub fn new(planner: RoutePlanner, publisher: Arc<dyn Publisher>, status: SharedStatus) -> Self {
        let home = planner.topology().home.clone();
        RouteController {
            planner,
            state: Mutex::new(NavigationState::new(home)),
            publisher,
            status,
        }
    }

    /// Planner used by this controller
    pub fn planner(&self) -> &RoutePlanner {
        &self.planner
    }

    /// Snapshot of the tracked position
    pub fn position(&self) -> PositionTracker {
        self.lock_state().tracker().clone()
    }

    /// Current planning phase
    pub fn phase(&self) -> PlanningPhase {
        self.lock_state().phase()
    }

    /// (successful, failed) plan counts
    pub fn plan_counts(&self) -> (u64, u64) {
        let state = self.lock_state();
        (state.completed(), state.failed())
    }

    /// Serve one route request.
    ///
    /// The state lock is held from reading the tracker until it is advanced, so no two
    /// requests can interleave. Any failure leaves the tracker untouched.
    pub fn request_route(&self, request: &RouteRequest) -> Result<Route, RouteError> {
        let mut state = self.lock_state();
        state.begin();

        let previous = state.tracker().current_previous().clone();
        let current = state.tracker().current_node().clone();

        if let Some(asserted) = request.start.as_deref() {
            if asserted != current.as_str() {
                warn!(
                    "Client start {} differs from tracked position {}, planning from {}",
                    asserted, current, current
                );
            }
        }

        let destination = Node::from(request.destination.as_str());
        let route = match self
            .planner
            .plan(&previous, &current, &destination)
            .and_then(|route| self.dispatch(route))
        {
            Ok(route) => route,
            Err(e) => {
                warn!("Route request to {} failed: {}", destination, e);
                state.fail();
                return Err(e);
            }
        };

        let arrival = match (route.arrival_previous(), route.destination()) {
            (Some(previous), Some(current)) => Some((previous.clone(), current.clone())),
            _ => None,
        };
        state.succeed(arrival);

        if route.path.len() > 1 {
            let position = state.tracker().current_node().clone();
            let status = self.status.set_position(position);
            match serde_json::to_value(&status) {
                Ok(payload) => {
                    if let Err(e) = self.publisher.publish(topics::STATUS, payload) {
                        error!("Failed to publish status after route: {}", e);
                    }
                }
                Err(e) => error!("Failed to serialize status: {}", e),
            }
        }

        Ok(route)
    }

    /// Hand the command list to the robot
    fn dispatch(&self, route: Route) -> Result<Route, RouteError> {
        let payload = serde_json::to_value(&route.commands)
            .map_err(|e| RouteError::PublishFailed(e.to_string()))?;
        self.publisher
            .publish(topics::COMMANDS, payload)
            .map_err(|e| RouteError::PublishFailed(e.to_string()))?;
        info!("Commands sent: {:?}", route.commands);
        Ok(route)
    }

    fn lock_state(&self) -> MutexGuard<'_, NavigationState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
