// src/messaging/publisher.rs
// Publishes topic messages to every connected subscriber (robot, dashboards).

use super::Envelope;
use super::wire::encode_frame;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use log::{debug, error, info, warn};
use std::io::{self, ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest a single frame write may block on one subscriber before it is dropped
pub const SUBSCRIBER_WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// Publishing error types
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Publish queue is full")]
    QueueFull,

    #[error("Publisher is shut down")]
    Disconnected,
}

/// Outbound side of the pub/sub relay
#[cfg_attr(test, mockall::automock)]
pub trait Publisher: Send + Sync {
    /// Hand a payload to every subscriber of `topic`. Must not block on the network.
    fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), PublishError>;
}

/// Fan-out publisher over TCP.
///
/// A dedicated thread owns the listener and the client sockets; callers only push
/// onto a bounded channel, so `publish` returns immediately.
pub struct TcpBroadcaster {
    sender: Sender<Envelope>,
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TcpBroadcaster {
    /// Bind `bind_address` and start the broadcast thread
    pub fn bind(bind_address: &str, queue_depth: usize) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let (sender, receiver) = bounded(queue_depth.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);

        let thread = thread::Builder::new()
            .name("broadcaster".to_string())
            .spawn(move || Self::run(listener, receiver, shutdown_clone))?;

        info!("Broadcaster listening on {}", local_addr);

        Ok(TcpBroadcaster {
            sender,
            local_addr,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Address subscribers connect to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the broadcast thread
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn run(listener: TcpListener, receiver: Receiver<Envelope>, shutdown: Arc<AtomicBool>) {
        let mut clients: Vec<TcpStream> = Vec::new();
        let mut sent = 0u64;

        while !shutdown.load(Ordering::Relaxed) {
            loop {
                match listener.accept() {
                    Ok((stream, addr)) => {
                        if let Err(e) = configure_subscriber(&stream) {
                            warn!("Failed to configure subscriber {}: {}", addr, e);
                            continue;
                        }
                        info!("Subscriber connected: {}", addr);
                        clients.push(stream);
                    }
                    Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => {
                        error!("Error accepting subscriber: {}", e);
                        break;
                    }
                }
            }

            match receiver.recv_timeout(Duration::from_millis(20)) {
                Ok(envelope) => {
                    Self::broadcast(&mut clients, &envelope);
                    sent += 1;
                    // Drain whatever queued up meanwhile
                    loop {
                        match receiver.try_recv() {
                            Ok(envelope) => {
                                Self::broadcast(&mut clients, &envelope);
                                sent += 1;
                            }
                            Err(TryRecvError::Empty) => break,
                            Err(TryRecvError::Disconnected) => return,
                        }
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }

        info!("Broadcaster exiting ({} messages published)", sent);
    }

    /// Send one envelope to all clients, dropping the ones that went away
    fn broadcast(clients: &mut Vec<TcpStream>, envelope: &Envelope) {
        let frame = match encode_frame(envelope) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode message on {}: {}", envelope.topic, e);
                return;
            }
        };

        debug!("Broadcasting {} to {} subscribers", envelope.topic, clients.len());
        clients.retain_mut(|client| match client.write_all(&frame) {
            Ok(_) => true,
            Err(e) => {
                if let Ok(addr) = client.peer_addr() {
                    debug!("Subscriber {} disconnected: {}", addr, e);
                }
                false
            }
        });
    }
}

/// Blocking writes, bounded by [`SUBSCRIBER_WRITE_TIMEOUT`] so a subscriber that
/// stops reading is dropped instead of stalling the fan-out thread
fn configure_subscriber(stream: &TcpStream) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(SUBSCRIBER_WRITE_TIMEOUT))?;
    let _ = stream.set_nodelay(true);
    Ok(())
}

impl Publisher for TcpBroadcaster {
    fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), PublishError> {
        match self.sender.try_send(Envelope::new(topic, payload)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("Publish queue full, dropping message on {}", topic);
                Err(PublishError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(PublishError::Disconnected),
        }
    }
}

impl Drop for TcpBroadcaster {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
