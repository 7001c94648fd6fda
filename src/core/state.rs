// core/state.rs

// Tracks where the robot is on the map (its last two nodes) and the lifecycle of
// the planning request currently being served.

use crate::navigation::Node;
use log::{debug, info};

/// Planning request lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanningPhase {
    Idle,       // No request being served
    Planning,   // Search and command synthesis running
    Succeeded,  // Route produced, tracker advanced
    Failed,     // No route or invalid commands, tracker untouched
}

/// Last two positions of the robot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionTracker {
    previous: Node,
    current: Node,
}

impl PositionTracker {
    /// Starts with both positions at the home node
    pub fn new(home: Node) -> Self {
        PositionTracker {
            previous: home.clone(),
            current: home,
        }
    }

    /// Node occupied before the current one
    pub fn current_previous(&self) -> &Node {
        &self.previous
    }

    /// Node the robot is at
    pub fn current_node(&self) -> &Node {
        &self.current
    }

    /// Record a completed move
    pub fn advance(&mut self, previous: Node, current: Node) {
        info!(
            "Position advanced: ({}, {}) -> ({}, {})",
            self.previous, self.current, previous, current
        );
        self.previous = previous;
        self.current = current;
    }
}

/// Tracker plus the phase of the request holding it
pub struct NavigationState {
    tracker: PositionTracker,
    phase: PlanningPhase,
    completed: u64,
    failed: u64,
}

impl NavigationState {
    /// Idle state with the robot parked at `home`
    pub fn new(home: Node) -> Self {
        NavigationState {
            tracker: PositionTracker::new(home),
            phase: PlanningPhase::Idle,
            completed: 0,
            failed: 0,
        }
    }

    /// Position tracker
    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    /// Current phase
    pub fn phase(&self) -> PlanningPhase {
        self.phase
    }

    /// Number of successful plans
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Number of failed plans
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Idle -> Planning
    pub fn begin(&mut self) {
        self.transition(PlanningPhase::Planning);
    }

    /// Planning -> Succeeded -> Idle. The tracker only moves when the route does.
    pub fn succeed(&mut self, arrival: Option<(Node, Node)>) {
        self.transition(PlanningPhase::Succeeded);
        if let Some((previous, current)) = arrival {
            self.tracker.advance(previous, current);
        }
        self.completed += 1;
        self.transition(PlanningPhase::Idle);
    }

    /// Planning -> Failed -> Idle, tracker untouched
    pub fn fail(&mut self) {
        self.transition(PlanningPhase::Failed);
        self.failed += 1;
        self.transition(PlanningPhase::Idle);
    }

    fn transition(&mut self, next: PlanningPhase) {
        debug!("Planning phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }
}
