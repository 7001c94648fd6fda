use agv_control::messaging::{Envelope, read_frame, topics, write_frame};
use agv_control::{AgvConfig, AgvSystem, ApiRequest, ApiResponse};
use serde_json::{Value, json};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn start_system(dir: &TempDir) -> AgvSystem {
    let config = AgvConfig::local(dir.path().join("rfid-tags.json"));
    let mut system = AgvSystem::new(config).unwrap();
    system.start().unwrap();
    system
}

fn call(stream: &mut TcpStream, request: Value) -> ApiResponse {
    write_frame(stream, &request).unwrap();
    read_frame(stream).unwrap().unwrap()
}

#[test]
fn route_over_tcp_is_answered_and_broadcast() {
    let dir = tempfile::tempdir().unwrap();
    let mut system = start_system(&dir);

    let mut subscriber = TcpStream::connect(system.broadcast_addr()).unwrap();
    subscriber
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    // Let the broadcaster pick up the subscriber
    thread::sleep(Duration::from_millis(200));

    let mut client = TcpStream::connect(system.control_addr().unwrap()).unwrap();
    let response = call(&mut client, json!({"op": "route", "destination": "Amarelo"}));
    assert_eq!(response.status, 200);
    assert_eq!(response.body["path"], json!(["Branco", "Lilás", "Amarelo"]));

    let mut commands = None;
    let mut position = None;
    while commands.is_none() || position.is_none() {
        let envelope: Envelope = read_frame(&mut subscriber).unwrap().unwrap();
        match envelope.topic.as_str() {
            topics::COMMANDS => commands = Some(envelope.payload),
            topics::STATUS if commands.is_some() => {
                position = Some(envelope.payload["position"].clone())
            }
            _ => {}
        }
    }
    assert_eq!(commands, Some(json!(["straight", "straight", "stop"])));
    assert_eq!(position, Some(json!("Amarelo")));

    let status = system.get_status();
    assert_eq!(status.agv.position.as_str(), "Amarelo");
    assert_eq!(status.previous.as_str(), "Lilás");
    assert_eq!(status.routes_completed, 1);
    assert!(status.operational);

    system.shutdown();
    assert!(!system.get_status().operational);
}

#[test]
fn malformed_request_gets_bad_request_and_connection_stays_open() {
    let dir = tempfile::tempdir().unwrap();
    let system = start_system(&dir);
    let mut client = TcpStream::connect(system.control_addr().unwrap()).unwrap();

    let bad = call(&mut client, json!({"destination": "Roxo"}));
    assert_eq!(bad.status, 400);

    let good = call(&mut client, json!({"op": "map"}));
    assert_eq!(good.status, 200);
    assert_eq!(good.body["home"], "Branco");
}

#[test]
fn telemetry_rfid_read_resolves_registered_tag() {
    let dir = tempfile::tempdir().unwrap();
    let system = start_system(&dir);

    let created = system.api().handle(ApiRequest::RegisterTag {
        tag_id: "04A1B2C3".into(),
        item_name: "Caixa de Peças".into(),
    });
    assert_eq!(created.status, 201);

    let mut sensor = TcpStream::connect(system.telemetry_addr().unwrap()).unwrap();
    write_frame(
        &mut sensor,
        &Envelope::new(topics::RFID, json!({"tag": "04A1B2C3", "reader": "PicoW"})),
    )
    .unwrap();
    write_frame(
        &mut sensor,
        &Envelope::new(topics::STATUS, json!({"battery": 73})),
    )
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status = system.api().handle(ApiRequest::Status);
        if status.body["battery"] == 73 {
            assert_eq!(status.body["sensors"]["rfid"]["item"], "Caixa de Peças");
            break;
        }
        assert!(Instant::now() < deadline, "telemetry never arrived");
        thread::sleep(Duration::from_millis(20));
    }
}

/// Poll the status until the connected client count reaches `expected`
fn wait_for_clients(system: &AgvSystem, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while system.get_status().clients != expected {
        assert!(
            Instant::now() < deadline,
            "expected {} clients, still {}",
            expected,
            system.get_status().clients
        );
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn disconnected_clients_are_released() {
    let dir = tempfile::tempdir().unwrap();
    let system = start_system(&dir);
    let control = system.control_addr().unwrap();
    let telemetry = system.telemetry_addr().unwrap();

    let clients: Vec<TcpStream> = (0..20)
        .map(|i| {
            let addr = if i % 2 == 0 { control } else { telemetry };
            TcpStream::connect(addr).unwrap()
        })
        .collect();
    wait_for_clients(&system, 20);

    drop(clients);
    wait_for_clients(&system, 0);

    // The endpoints keep serving after the churn
    let mut client = TcpStream::connect(control).unwrap();
    assert_eq!(call(&mut client, json!({"op": "map"})).status, 200);
}

#[test]
fn tags_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let config = AgvConfig::local(dir.path().join("rfid-tags.json"));
        let system = AgvSystem::new(config).unwrap();
        let response = system.api().handle(ApiRequest::RegisterTag {
            tag_id: "T1".into(),
            item_name: "Pallet".into(),
        });
        assert!(response.is_success());
    }

    let config = AgvConfig::local(dir.path().join("rfid-tags.json"));
    let system = AgvSystem::new(config).unwrap();
    let response = system.api().handle(ApiRequest::GetTag {
        tag_id: "T1".into(),
    });
    assert_eq!(response.body["itemName"], "Pallet");
}
