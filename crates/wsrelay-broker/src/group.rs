//! Group registry: `group name -> {session_id -> Session}`.
//!
//! Many connection tasks mutate the registry concurrently; fan-out snapshots
//! the target set before enqueueing so a racing join/leave never corrupts
//! iteration. Each session's outbound queue has many producers (every other
//! session in the group) and a single consumer (the connection's drain side
//! of the select loop).

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// One relayed logical message. The broker forwards these verbatim.
#[derive(Debug, Clone)]
pub enum RelayFrame {
    Text(String),
    Binary(Bytes),
}

/// Server-side handle to one connected endpoint within a group.
pub struct Session {
    id: String,
    tx: mpsc::Sender<RelayFrame>,
    drain: Mutex<Option<mpsc::Receiver<RelayFrame>>>,
}

impl Session {
    fn new(id: &str, queue_depth: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(queue_depth);
        Arc::new(Self {
            id: id.to_string(),
            tx,
            drain: Mutex::new(Some(rx)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Take the queue's consumer side. `None` means another live connection
    /// is already draining this session.
    pub fn take_drain(&self) -> Option<mpsc::Receiver<RelayFrame>> {
        match self.drain.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        }
    }

    /// Enqueue one frame, dropping it if the queue is full (best-effort).
    pub fn enqueue(&self, frame: RelayFrame) {
        if self.tx.try_send(frame).is_err() {
            tracing::warn!(session = %self.id, "outbound queue full, dropping frame");
        }
    }
}

/// Named set of sessions eligible to receive each other's messages.
pub struct Group {
    name: String,
    sessions: DashMap<String, Arc<Session>>,
}

impl Group {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            sessions: DashMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Enqueue `frame` for every session except the sender.
    pub fn fan_out(&self, sender_id: &str, frame: &RelayFrame) {
        // Snapshot, then enqueue: keeps iteration safe against concurrent
        // joins/leaves and keeps shard locks out of the send path.
        let targets: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .filter(|entry| entry.key() != sender_id)
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for session in targets {
            session.enqueue(frame.clone());
        }
    }
}

/// Process-wide registry, owned by the broker state (not a global).
pub struct GroupRegistry {
    groups: DashMap<String, Arc<Group>>,
    queue_depth: usize,
}

impl GroupRegistry {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            groups: DashMap::new(),
            queue_depth,
        }
    }

    /// Create-or-locate the group and the session within it, idempotent by
    /// `(group, session_id)`.
    pub fn join(&self, group_name: &str, session_id: &str) -> (Arc<Group>, Arc<Session>) {
        loop {
            let group = self
                .groups
                .entry(group_name.to_string())
                .or_insert_with(|| Group::new(group_name))
                .clone();
            let session = group
                .sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Session::new(session_id, self.queue_depth))
                .clone();

            // A concurrent last-leave may have removed the group between the
            // two inserts above; retry so the session lands in a registered
            // group and never in an orphaned one.
            let still_registered = self
                .groups
                .get(group_name)
                .map(|current| Arc::ptr_eq(current.value(), &group))
                .unwrap_or(false);
            if still_registered {
                return (group, session);
            }
            group.sessions.remove(session_id);
        }
    }

    /// Remove the session; drop the group once its last session is gone.
    pub fn leave(&self, group_name: &str, session_id: &str) {
        if let Some(group) = self.groups.get(group_name).map(|g| Arc::clone(g.value())) {
            group.sessions.remove(session_id);
        }
        self.groups
            .remove_if(group_name, |_, group| group.sessions.is_empty());
    }

    pub fn get(&self, group_name: &str) -> Option<Arc<Group>> {
        self.groups.get(group_name).map(|g| Arc::clone(g.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> GroupRegistry {
        GroupRegistry::new(16)
    }

    #[test]
    fn fan_out_excludes_the_sender() {
        let reg = registry();
        let (_, a) = reg.join("g1", "a");
        let (_, b) = reg.join("g1", "b");
        let (group, c) = reg.join("g1", "c");

        let mut a_rx = a.take_drain().unwrap();
        let mut b_rx = b.take_drain().unwrap();
        let mut c_rx = c.take_drain().unwrap();

        group.fan_out("a", &RelayFrame::Text("hi".into()));

        assert!(matches!(b_rx.try_recv(), Ok(RelayFrame::Text(t)) if t == "hi"));
        assert!(matches!(c_rx.try_recv(), Ok(RelayFrame::Text(t)) if t == "hi"));
        assert!(a_rx.try_recv().is_err());
    }

    #[test]
    fn join_is_idempotent_per_group_and_id() {
        let reg = registry();
        let (group_first, first) = reg.join("g1", "a");
        let (group_second, second) = reg.join("g1", "a");

        assert!(Arc::ptr_eq(&group_first, &group_second));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(group_first.session_count(), 1);

        // Only the first connection gets the drain side.
        assert!(first.take_drain().is_some());
        assert!(second.take_drain().is_none());
    }

    #[test]
    fn same_id_in_different_groups_is_distinct() {
        let reg = registry();
        let (_, in_g1) = reg.join("g1", "a");
        let (_, in_g2) = reg.join("g2", "a");
        assert!(!Arc::ptr_eq(&in_g1, &in_g2));
    }

    #[test]
    fn empty_groups_are_removed() {
        let reg = registry();
        reg.join("g1", "a");
        reg.join("g1", "b");

        reg.leave("g1", "a");
        assert!(reg.get("g1").is_some());

        reg.leave("g1", "b");
        assert!(reg.get("g1").is_none());
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let reg = GroupRegistry::new(1);
        let (group, b) = reg.join("g1", "b");
        reg.join("g1", "a");
        let mut b_rx = b.take_drain().unwrap();

        group.fan_out("a", &RelayFrame::Text("first".into()));
        group.fan_out("a", &RelayFrame::Text("second".into()));

        assert!(matches!(b_rx.try_recv(), Ok(RelayFrame::Text(t)) if t == "first"));
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn queue_preserves_fifo_order() {
        let reg = registry();
        let (group, b) = reg.join("g1", "b");
        reg.join("g1", "a");
        let mut b_rx = b.take_drain().unwrap();

        for i in 0..5 {
            group.fan_out("a", &RelayFrame::Text(format!("m{i}")));
        }
        for i in 0..5 {
            assert!(matches!(b_rx.try_recv(), Ok(RelayFrame::Text(t)) if t == format!("m{i}")));
        }
    }
}
