use agv_control::messaging::{PublishError, Publisher, topics};
use agv_control::navigation::{
    ActionTable, Command, DecisionKey, Graph, RouteError, synthesize_commands,
};
use agv_control::{Node, RouteController, RoutePlanner, RouteRequest, SharedStatus, Topology};
use rstest::{fixture, rstest};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Keeps every published message for inspection
#[derive(Default)]
struct RecordingPublisher {
    messages: Mutex<Vec<(String, Value)>>,
}

impl RecordingPublisher {
    fn on(&self, topic: &str) -> Vec<Value> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, topic: &str, payload: Value) -> Result<(), PublishError> {
        self.messages.lock().unwrap().push((topic.to_string(), payload));
        Ok(())
    }
}

fn nodes(labels: &[&str]) -> Vec<Node> {
    labels.iter().map(|l| Node::from(*l)).collect()
}

/// Branco - Lilás - Amarelo - Laranja, plus an isolated node
#[fixture]
fn line_map() -> Topology {
    let mut graph = Graph::new();
    graph.add_edge("Branco", "Lilás", 1).unwrap();
    graph.add_edge("Lilás", "Amarelo", 1).unwrap();
    graph.add_edge("Amarelo", "Laranja", 1).unwrap();
    graph.add_node("Isolado");

    let actions: ActionTable = [
        (DecisionKey::new("Branco", "Branco", "Lilás"), Command::Straight),
        (DecisionKey::new("Branco", "Lilás", "Amarelo"), Command::Right),
        (DecisionKey::new("Lilás", "Amarelo", "Laranja"), Command::Left),
    ]
    .into_iter()
    .collect();

    Topology {
        graph,
        actions,
        home: Node::from("Branco"),
        layout: BTreeMap::new(),
    }
}

fn controller(topology: Topology) -> (RouteController, Arc<RecordingPublisher>) {
    let publisher = Arc::new(RecordingPublisher::default());
    let status = SharedStatus::new(topology.home.clone());
    let controller = RouteController::new(
        RoutePlanner::new(Arc::new(topology)),
        publisher.clone(),
        status,
    );
    (controller, publisher)
}

#[rstest]
fn scenario_a_line_route(line_map: Topology) {
    let (controller, publisher) = controller(line_map);

    let route = controller.request_route(&RouteRequest::to("Laranja")).unwrap();

    assert_eq!(route.cost, 3);
    assert_eq!(route.path, nodes(&["Branco", "Lilás", "Amarelo", "Laranja"]));
    assert_eq!(
        route.commands,
        vec![Command::Straight, Command::Right, Command::Left, Command::Stop]
    );
    assert_eq!(controller.planner().topology().actions.fallback_count(), 0);
    assert_eq!(
        publisher.on(topics::COMMANDS),
        vec![serde_json::json!(["straight", "right", "left", "stop"])]
    );

    let tracker = controller.position();
    assert_eq!(tracker.current_previous().as_str(), "Amarelo");
    assert_eq!(tracker.current_node().as_str(), "Laranja");
}

#[rstest]
fn scenario_b_trivial_route_keeps_tracker(line_map: Topology) {
    let (controller, _) = controller(line_map);
    controller.request_route(&RouteRequest::to("Lilás")).unwrap();
    let before = controller.position();
    assert_eq!(before.current_node().as_str(), "Lilás");

    let route = controller.request_route(&RouteRequest::to("Lilás")).unwrap();

    assert_eq!(route.cost, 0);
    assert_eq!(route.path, nodes(&["Lilás"]));
    assert_eq!(route.commands, vec![Command::Stop]);
    assert_eq!(controller.position(), before);
}

#[rstest]
fn scenario_c_isolated_destination(line_map: Topology) {
    let (controller, publisher) = controller(line_map);
    let before = controller.position();

    let result = controller.request_route(&RouteRequest::to("Isolado"));

    assert!(matches!(result, Err(RouteError::RouteNotFound { .. })));
    assert_eq!(controller.position(), before);
    assert!(publisher.on(topics::COMMANDS).is_empty());
}

#[rstest]
fn client_start_is_advisory(line_map: Topology) {
    let (controller, _) = controller(line_map);
    let route = controller
        .request_route(&RouteRequest {
            destination: "Amarelo".into(),
            start: Some("Laranja".into()),
        })
        .unwrap();
    assert_eq!(route.path.first().map(Node::as_str), Some("Branco"));
}

#[test]
fn fallback_is_deterministic_and_counted() {
    let table = ActionTable::new();
    let path = nodes(&["B", "C", "D"]);

    let first = synthesize_commands(&table, &Node::from("A"), &path);
    let second = synthesize_commands(&table, &Node::from("A"), &path);

    assert_eq!(first, second);
    assert_eq!(
        first.commands,
        vec![Command::Straight, Command::Straight, Command::Stop]
    );
    assert_eq!(
        first.fallbacks,
        vec![DecisionKey::new("A", "B", "C"), DecisionKey::new("B", "C", "D")]
    );
    assert_eq!(table.fallback_count(), 4);
}

#[test]
fn demo_map_routes_never_fall_back() {
    let topology = Topology::demo();
    let planner = RoutePlanner::new(Arc::new(topology));
    let all: Vec<Node> = planner.topology().graph.nodes().cloned().collect();

    // Every (arrival edge, destination) combination the tracker can be in
    for current in &all {
        let mut arrivals: Vec<Node> = planner
            .topology()
            .graph
            .neighbors(current.as_str())
            .map(|(n, _)| n.clone())
            .collect();
        if current == &planner.topology().home {
            arrivals.push(current.clone());
        }
        for previous in &arrivals {
            for destination in &all {
                let route = planner.plan(previous, current, destination).unwrap();
                assert_eq!(route.commands.len(), route.path.len());
                assert_eq!(route.commands.last(), Some(&Command::Stop));
            }
        }
    }
    assert_eq!(planner.topology().actions.fallback_count(), 0);
}

#[test]
fn failed_plan_after_success_leaves_last_position() {
    let (controller, _) = controller(Topology::demo());
    controller.request_route(&RouteRequest::to("Verde")).unwrap();
    let before = controller.position();

    assert!(controller.request_route(&RouteRequest::to("Nowhere")).is_err());
    assert_eq!(controller.position(), before);
    assert_eq!(controller.plan_counts(), (1, 1));
}

#[test]
fn concurrent_requests_are_serialized() {
    let (controller, publisher) = controller(Topology::demo());
    let controller = Arc::new(controller);
    let destinations = ["Vermelho", "Azul", "Roxo", "Ciano", "Branco", "Verde"];

    let handles: Vec<_> = destinations
        .iter()
        .map(|destination| {
            let controller = Arc::clone(&controller);
            let destination = destination.to_string();
            std::thread::spawn(move || controller.request_route(&RouteRequest::to(destination)))
        })
        .collect();
    let routes: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    // Each route starts where some other route (or home) ended, and the tracker
    // ends at the destination of one of them.
    let ends: Vec<&Node> = routes.iter().filter_map(|r| r.destination()).collect();
    for route in &routes {
        let start = &route.path[0];
        assert!(start.as_str() == "Branco" || ends.contains(&start));
    }
    let final_node = controller.position().current_node().clone();
    assert!(ends.contains(&&final_node));
    assert_eq!(publisher.on(topics::COMMANDS).len(), destinations.len());
}

/// Exhaustive minimum over all simple paths
fn brute_force_cost(graph: &Graph, start: &str, destination: &str) -> Option<u64> {
    fn walk(
        graph: &Graph,
        node: &str,
        destination: &str,
        cost: u64,
        visited: &mut Vec<String>,
        best: &mut Option<u64>,
    ) {
        if node == destination {
            *best = Some(best.map_or(cost, |b| b.min(cost)));
            return;
        }
        for (next, weight) in graph.neighbors(node) {
            if visited.iter().any(|v| v == next.as_str()) {
                continue;
            }
            visited.push(next.to_string());
            walk(graph, next.as_str(), destination, cost + weight as u64, visited, best);
            visited.pop();
        }
    }

    let mut best = None;
    walk(graph, start, destination, 0, &mut vec![start.to_string()], &mut best);
    best
}

/// Small deterministic pseudo-random graph
fn random_graph(seed: u64, size: usize) -> Graph {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 33) as u32
    };

    let mut graph = Graph::new();
    for i in 0..size {
        graph.add_node(format!("n{}", i));
    }
    for i in 0..size {
        for j in (i + 1)..size {
            if next() % 3 == 0 {
                let weight = next() % 9 + 1;
                graph.add_edge(format!("n{}", i), format!("n{}", j), weight).unwrap();
            }
        }
    }
    graph
}

#[rstest]
#[case(1)]
#[case(7)]
#[case(42)]
#[case(1234)]
#[case(98765)]
fn search_matches_brute_force(#[case] seed: u64) {
    let graph = random_graph(seed, 7);
    let labels: Vec<String> = graph.nodes().map(|n| n.to_string()).collect();

    for start in &labels {
        for destination in &labels {
            let expected = brute_force_cost(&graph, start, destination);
            match graph.shortest_path(start, destination) {
                Ok(found) => {
                    assert_eq!(Some(found.cost), expected, "{} -> {}", start, destination);
                    assert_eq!(found.path.first().map(Node::as_str), Some(start.as_str()));
                    assert_eq!(found.path.last().map(Node::as_str), Some(destination.as_str()));
                    let walked: u64 = found
                        .path
                        .windows(2)
                        .map(|w| graph.edge_weight(w[0].as_str(), w[1].as_str()).unwrap() as u64)
                        .sum();
                    assert_eq!(walked, found.cost);
                }
                Err(RouteError::RouteNotFound { .. }) => assert_eq!(expected, None),
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
    }
}
