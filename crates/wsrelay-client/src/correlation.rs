//! Pending request table for request/reply correlation.
//!
//! Maps a request id to the oneshot that unblocks the waiting caller.
//! Resolution is at-most-once: the entry is removed before the sender fires,
//! so a late or duplicate reply finds nothing and is a no-op.

use dashmap::DashMap;
use serde_json::value::RawValue;
use tokio::sync::oneshot;
use uuid::Uuid;

#[derive(Default)]
pub(crate) struct PendingReplies {
    entries: DashMap<Uuid, oneshot::Sender<Box<RawValue>>>,
}

impl PendingReplies {
    /// Register a fresh request id; the receiver resolves with the raw reply
    /// payload.
    pub fn register(&self, id: Uuid) -> oneshot::Receiver<Box<RawValue>> {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(id, tx);
        rx
    }

    /// Resolve the pending request for `id`, if any. Returns whether a
    /// correlation existed.
    pub fn resolve(&self, id: Uuid, raw: Box<RawValue>) -> bool {
        match self.entries.remove(&id) {
            Some((_, tx)) => {
                if tx.send(raw).is_err() {
                    tracing::debug!(%id, "reply arrived after the waiter gave up");
                }
                true
            }
            None => false,
        }
    }

    /// Drop the registration on timeout so a late reply has no effect.
    pub fn forget(&self, id: Uuid) {
        self.entries.remove(&id);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> Box<RawValue> {
        RawValue::from_string(json.to_string()).unwrap()
    }

    #[tokio::test]
    async fn resolves_at_most_once() {
        let pending = PendingReplies::default();
        let id = Uuid::new_v4();
        let rx = pending.register(id);

        assert!(pending.resolve(id, raw("true")));
        assert!(!pending.resolve(id, raw("false")));
        assert_eq!(pending.len(), 0);

        let got = rx.await.unwrap();
        assert_eq!(got.get(), "true");
    }

    #[tokio::test]
    async fn forgotten_entry_ignores_late_replies() {
        let pending = PendingReplies::default();
        let id = Uuid::new_v4();
        let rx = pending.register(id);

        pending.forget(id);
        assert!(!pending.resolve(id, raw("true")));
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn unknown_id_is_a_miss() {
        let pending = PendingReplies::default();
        assert!(!pending.resolve(Uuid::new_v4(), raw("1")));
    }
}
