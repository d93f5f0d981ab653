use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use turntable_core::protocol::Frame;

/// Outbound queue depth per connection. A client that falls this far
/// behind is dropped rather than allowed to stall everyone else.
pub const SEND_QUEUE_DEPTH: usize = 256;

/// One registered websocket. Writing goes through a bounded channel
/// drained by the connection's writer task, so sends never block.
pub struct ClientHandle {
    pub conn_id: String,
    pub session_id: String,
    sender: mpsc::Sender<Message>,
}

impl ClientHandle {
    fn send_frame(&self, frame: &Frame) -> bool {
        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(err) => {
                warn!(event = "frame_encode_error", error = %err);
                return false;
            }
        };
        self.sender.try_send(Message::Text(text)).is_ok()
    }

    fn send_close(&self, code: u16, reason: &'static str) {
        let _ = self
            .sender
            .try_send(Message::Close(Some(axum::extract::ws::CloseFrame {
                code,
                reason: reason.into(),
            })));
    }
}

#[derive(Default)]
struct Sockets {
    host: Option<Arc<ClientHandle>>,
    sides: HashMap<String, Arc<ClientHandle>>,
}

/// Owns the one host socket and the set of side sockets. All sends are
/// best-effort: a dead or slow socket is logged (and, for sides, removed)
/// without affecting delivery to the rest.
#[derive(Default)]
pub struct ConnectionBroker {
    conn_counter: AtomicU64,
    sockets: RwLock<Sockets>,
}

impl ConnectionBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_conn_id(&self) -> String {
        let id = self.conn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("conn-{id}")
    }

    /// Register the host socket, replacing any previous one. The previous
    /// handle is abandoned: senders simply stop holding it. The snapshot is
    /// pushed to the new socket only.
    pub fn register_host(
        &self,
        session_id: &str,
        sender: mpsc::Sender<Message>,
        snapshot: Vec<Frame>,
    ) -> Arc<ClientHandle> {
        let handle = Arc::new(ClientHandle {
            conn_id: self.next_conn_id(),
            session_id: session_id.to_string(),
            sender,
        });
        let previous = {
            let mut sockets = self.sockets.write().expect("sockets lock");
            sockets.host.replace(handle.clone())
        };
        if let Some(previous) = previous {
            info!(event = "host_replaced", old_conn = %previous.conn_id, new_conn = %handle.conn_id);
            previous.send_close(1000, "superseded");
        }
        info!(event = "host_connected", conn_id = %handle.conn_id);
        self.push_snapshot(&handle, &snapshot);
        handle
    }

    pub fn register_side(
        &self,
        session_id: &str,
        sender: mpsc::Sender<Message>,
        snapshot: Vec<Frame>,
    ) -> Arc<ClientHandle> {
        let handle = Arc::new(ClientHandle {
            conn_id: self.next_conn_id(),
            session_id: session_id.to_string(),
            sender,
        });
        self.sockets
            .write()
            .expect("sockets lock")
            .sides
            .insert(handle.conn_id.clone(), handle.clone());
        info!(event = "side_connected", conn_id = %handle.conn_id);
        self.push_snapshot(&handle, &snapshot);
        handle
    }

    fn push_snapshot(&self, handle: &ClientHandle, snapshot: &[Frame]) {
        for frame in snapshot {
            if !handle.send_frame(frame) {
                warn!(event = "snapshot_send_error", conn_id = %handle.conn_id);
                return;
            }
        }
        debug!(event = "snapshot_sent", conn_id = %handle.conn_id, count = snapshot.len());
    }

    /// Remove a socket from whichever set it belongs to. Idempotent; a
    /// replaced host handle no longer matches and is left alone.
    pub fn unregister(&self, handle: &ClientHandle) {
        let mut sockets = self.sockets.write().expect("sockets lock");
        if sockets
            .host
            .as_ref()
            .is_some_and(|host| host.conn_id == handle.conn_id)
        {
            sockets.host = None;
            info!(event = "host_disconnected", conn_id = %handle.conn_id);
        }
        if sockets.sides.remove(&handle.conn_id).is_some() {
            info!(event = "side_disconnected", conn_id = %handle.conn_id);
        }
    }

    /// Best-effort single send; silently a no-op with no host connected.
    pub fn send_to_host(&self, frame: &Frame) {
        let host = self.sockets.read().expect("sockets lock").host.clone();
        if let Some(host) = host {
            if !host.send_frame(frame) {
                warn!(event = "host_send_error", conn_id = %host.conn_id);
            }
        }
    }

    /// Best-effort fan-out. A failed send drops that side socket's
    /// membership without affecting delivery to the others.
    pub fn send_to_sides(&self, frame: &Frame) {
        let sides: Vec<Arc<ClientHandle>> = self
            .sockets
            .read()
            .expect("sockets lock")
            .sides
            .values()
            .cloned()
            .collect();
        let mut failed = Vec::new();
        for side in sides {
            if !side.send_frame(frame) {
                warn!(event = "side_send_error", conn_id = %side.conn_id);
                failed.push(side.conn_id.clone());
            }
        }
        if !failed.is_empty() {
            let mut sockets = self.sockets.write().expect("sockets lock");
            for conn_id in failed {
                sockets.sides.remove(&conn_id);
            }
        }
    }

    pub fn broadcast(&self, frame: &Frame) {
        self.send_to_host(frame);
        self.send_to_sides(frame);
    }

    pub fn side_count(&self) -> usize {
        self.sockets.read().expect("sockets lock").sides.len()
    }

    pub fn has_host(&self) -> bool {
        self.sockets.read().expect("sockets lock").host.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turntable_core::protocol::Command;

    fn channel() -> (mpsc::Sender<Message>, mpsc::Receiver<Message>) {
        mpsc::channel(SEND_QUEUE_DEPTH)
    }

    fn recv_frame(rx: &mut mpsc::Receiver<Message>) -> Frame {
        match rx.try_recv().expect("queued message") {
            Message::Text(text) => serde_json::from_str(&text).expect("frame json"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn new_socket_receives_snapshot_before_broadcasts() {
        let broker = ConnectionBroker::new();
        let snapshot = vec![
            Frame::with_value(Command::PlayState, serde_json::json!(false)),
            Frame::with_value(Command::Settings, serde_json::json!({"volume": 50})),
        ];
        let (tx, mut rx) = channel();
        broker.register_side("session-a", tx, snapshot.clone());
        broker.broadcast(&Frame::with_value(Command::PlayState, serde_json::json!(true)));

        assert_eq!(recv_frame(&mut rx), snapshot[0]);
        assert_eq!(recv_frame(&mut rx), snapshot[1]);
        assert_eq!(
            recv_frame(&mut rx).value,
            Some(serde_json::json!(true))
        );
    }

    #[test]
    fn broadcast_reaches_host_and_all_sides() {
        let broker = ConnectionBroker::new();
        let (host_tx, mut host_rx) = channel();
        let (side_tx, mut side_rx) = channel();
        broker.register_host("host", host_tx, Vec::new());
        broker.register_side("side", side_tx, Vec::new());

        broker.broadcast(&Frame::bare(Command::RefreshHost));
        assert_eq!(recv_frame(&mut host_rx).command, Command::RefreshHost);
        assert_eq!(recv_frame(&mut side_rx).command, Command::RefreshHost);
    }

    #[test]
    fn failed_side_send_drops_membership_but_not_the_rest() {
        let broker = ConnectionBroker::new();
        let (dead_tx, dead_rx) = channel();
        let (live_tx, mut live_rx) = channel();
        broker.register_side("dead", dead_tx, Vec::new());
        broker.register_side("live", live_tx, Vec::new());
        drop(dead_rx);

        broker.send_to_sides(&Frame::bare(Command::PlayNext));
        assert_eq!(recv_frame(&mut live_rx).command, Command::PlayNext);
        assert_eq!(broker.side_count(), 1);
    }

    #[test]
    fn latest_host_wins_and_old_handle_is_ignored() {
        let broker = ConnectionBroker::new();
        let (old_tx, mut old_rx) = channel();
        let (new_tx, mut new_rx) = channel();
        let old = broker.register_host("host-1", old_tx, Vec::new());
        broker.register_host("host-2", new_tx, Vec::new());

        broker.send_to_host(&Frame::bare(Command::PlayNext));
        assert_eq!(recv_frame(&mut new_rx).command, Command::PlayNext);
        // the old handle only got its close frame
        match old_rx.try_recv().expect("close frame") {
            Message::Close(_) => {}
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(old_rx.try_recv().is_err());

        // unregistering the stale handle must not evict the new host
        broker.unregister(&old);
        assert!(broker.has_host());
    }

    #[test]
    fn send_to_host_without_host_is_a_noop() {
        let broker = ConnectionBroker::new();
        broker.send_to_host(&Frame::bare(Command::PlayNext));
        broker.broadcast(&Frame::bare(Command::PlayNext));
    }

    #[test]
    fn unregister_is_idempotent() {
        let broker = ConnectionBroker::new();
        let (tx, _rx) = channel();
        let handle = broker.register_side("side", tx, Vec::new());
        broker.unregister(&handle);
        broker.unregister(&handle);
        assert_eq!(broker.side_count(), 0);
    }
}
