//! TCP endpoints of the control panel
//!
//! Two listeners, each spawning one thread per connected client:
//!
//! | Endpoint | Inbound frame | Outbound frame |
//! |----------|---------------|----------------|
//! | control | [`ApiRequest`](crate::core::ApiRequest) JSON | [`ApiResponse`] |
//! | telemetry | [`Envelope`] | none |
//!
//! Both use the length-prefixed framing of [`crate::messaging::wire`].
//!
//! # Shutdown
//!
//! Accept loops are non-blocking and poll a shared running flag. Client threads
//! block on reads, so [`Server::stop`] shuts their sockets down to wake them.
//! Each client thread drops its socket from the shared registry when it exits.

use crate::core::{Api, ApiResponse};
use crate::messaging::{Envelope, TelemetryRelay, WireError, read_frame, write_frame};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Accept loop poll interval
const ACCEPT_POLL: Duration = Duration::from_millis(50);

type Handler = Arc<dyn Fn(TcpStream) + Send + Sync>;

/// Sockets of the clients currently being served, across both endpoints
#[derive(Default)]
struct Clients {
    next_id: AtomicU64,
    streams: Mutex<HashMap<u64, TcpStream>>,
}

impl Clients {
    fn streams(&self) -> MutexGuard<'_, HashMap<u64, TcpStream>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track a clone of `stream`; `None` if the socket cannot be cloned
    fn track(&self, stream: &TcpStream) -> Option<u64> {
        let clone = stream.try_clone().ok()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.streams().insert(id, clone);
        Some(id)
    }

    fn release(&self, id: Option<u64>) {
        if let Some(id) = id {
            self.streams().remove(&id);
        }
    }

    fn take_all(&self) -> Vec<TcpStream> {
        self.streams().drain().map(|(_, stream)| stream).collect()
    }

    fn len(&self) -> usize {
        self.streams().len()
    }
}

/// Running control and telemetry listeners
pub struct Server {
    running: Arc<AtomicBool>,
    clients: Arc<Clients>,
    control_addr: SocketAddr,
    telemetry_addr: SocketAddr,
    threads: Vec<JoinHandle<()>>,
}

impl Server {
    /// Bind both endpoints and start accepting clients
    pub fn start(
        control_bind: &str,
        telemetry_bind: &str,
        api: Api,
        relay: Arc<TelemetryRelay>,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let clients = Arc::new(Clients::default());

        let control = TcpListener::bind(control_bind)?;
        let telemetry = TcpListener::bind(telemetry_bind)?;
        let control_addr = control.local_addr()?;
        let telemetry_addr = telemetry.local_addr()?;

        let control_handler: Handler = Arc::new(move |stream| serve_control(&api, stream));
        let telemetry_handler: Handler = Arc::new(move |stream| serve_telemetry(&relay, stream));

        let threads = vec![
            spawn_listener(
                "control",
                control,
                control_handler,
                Arc::clone(&running),
                Arc::clone(&clients),
            )?,
            spawn_listener(
                "telemetry",
                telemetry,
                telemetry_handler,
                Arc::clone(&running),
                Arc::clone(&clients),
            )?,
        ];

        info!(
            "Control API on {}, telemetry ingest on {}",
            control_addr,
            telemetry_addr
        );

        Ok(Server {
            running,
            clients,
            control_addr,
            telemetry_addr,
            threads,
        })
    }

    /// Address of the control endpoint
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// Address of the telemetry endpoint
    pub fn telemetry_addr(&self) -> SocketAddr {
        self.telemetry_addr
    }

    /// Whether the listeners are still accepting
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Number of clients currently connected to either endpoint
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Stop accepting, disconnect every client and join the accept threads
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        for stream in self.clients.take_all() {
            let _ = stream.shutdown(Shutdown::Both);
        }

        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
        info!("Server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            self.stop();
        }
    }
}

fn spawn_listener(
    name: &'static str,
    listener: TcpListener,
    handler: Handler,
    running: Arc<AtomicBool>,
    clients: Arc<Clients>,
) -> std::io::Result<JoinHandle<()>> {
    listener.set_nonblocking(true)?;

    thread::Builder::new()
        .name(format!("{}-accept", name))
        .spawn(move || {
            while running.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nonblocking(false) {
                            warn!("Failed to configure {} client {}: {}", name, addr, e);
                            continue;
                        }
                        let _ = stream.set_nodelay(true);
                        info!("{} client connected: {}", name, addr);

                        let id = clients.track(&stream);
                        let handler = Arc::clone(&handler);
                        let thread_clients = Arc::clone(&clients);
                        let spawned = thread::Builder::new()
                            .name(format!("{}-{}", name, addr))
                            .spawn(move || {
                                handler(stream);
                                thread_clients.release(id);
                            });
                        if let Err(e) = spawned {
                            error!("Failed to spawn {} client thread: {}", name, e);
                            clients.release(id);
                        }
                    }
                    Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                        thread::sleep(ACCEPT_POLL);
                    }
                    Err(e) => {
                        error!("Error accepting {} client: {}", name, e);
                        thread::sleep(ACCEPT_POLL);
                    }
                }
            }
            debug!("{} accept loop exiting", name);
        })
}

/// Request/response loop for one control client
fn serve_control(api: &Api, mut stream: TcpStream) {
    let peer = stream.peer_addr().ok();
    loop {
        let response = match read_frame::<_, Value>(&mut stream) {
            Ok(Some(request)) => api.handle_value(request),
            Ok(None) => break,
            // The frame was consumed, so the stream is still aligned
            Err(WireError::Json(e)) => ApiResponse::error(400, format!("Invalid JSON: {}", e)),
            Err(e) => {
                debug!("Control client {:?} dropped: {}", peer, e);
                break;
            }
        };

        if let Err(e) = write_frame(&mut stream, &response) {
            error!("Failed to reply to {:?}: {}", peer, e);
            break;
        }
    }
    info!("Control client disconnected: {:?}", peer);
}

/// Ingest loop for one telemetry publisher
fn serve_telemetry(relay: &TelemetryRelay, mut stream: TcpStream) {
    let peer = stream.peer_addr().ok();
    loop {
        match read_frame::<_, Envelope>(&mut stream) {
            Ok(Some(envelope)) => {
                if let Err(e) = relay.ingest(&envelope) {
                    warn!("Dropped telemetry from {:?}: {}", peer, e);
                }
            }
            Ok(None) => break,
            Err(WireError::Json(e)) => {
                warn!("Malformed telemetry frame from {:?}: {}", peer, e)
            }
            Err(e) => {
                debug!("Telemetry client {:?} dropped: {}", peer, e);
                break;
            }
        }
    }
    info!("Telemetry client disconnected: {:?}", peer);
}
