//! Type dispatch registry: tag -> decode-and-handle function.
//!
//! First registration wins, silently. A message with no matching handler is
//! discarded — an endpoint may legitimately ignore types it does not
//! understand, so a miss is a `debug` log, never an error.
//!
//! Binary frames have their own single handler slot, independent of the
//! text-type registry.

use std::sync::{Arc, RwLock};

use bytes::Bytes;
use dashmap::DashMap;
use serde_json::value::RawValue;

use crate::engine::ReplyToken;

pub(crate) type TextHandler = Arc<dyn Fn(&RawValue, Option<ReplyToken>) + Send + Sync>;
pub(crate) type BinaryHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    text: DashMap<String, TextHandler>,
    binary: RwLock<Option<BinaryHandler>>,
}

impl HandlerRegistry {
    pub fn register_text(&self, tag: &str, handler: TextHandler) {
        self.text.entry(tag.to_string()).or_insert(handler);
    }

    pub fn register_binary(&self, handler: BinaryHandler) {
        if let Ok(mut slot) = self.binary.write() {
            if slot.is_none() {
                *slot = Some(handler);
            }
        }
    }

    pub fn dispatch_text(&self, tag: &str, raw: &RawValue, token: Option<ReplyToken>) {
        // Clone out of the map before invoking: a handler may register more
        // handlers, which must not deadlock against a held shard.
        let handler = self.text.get(tag).map(|entry| Arc::clone(entry.value()));
        match handler {
            Some(handler) => handler(raw, token),
            None => tracing::debug!(%tag, "no handler registered, discarding message"),
        }
    }

    pub fn dispatch_binary(&self, data: Bytes) {
        let handler = self.binary.read().ok().and_then(|slot| slot.clone());
        match handler {
            Some(handler) => handler(data),
            None => tracing::debug!("no binary handler registered, discarding message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn raw(json: &str) -> Box<RawValue> {
        RawValue::from_string(json.to_string()).unwrap()
    }

    #[test]
    fn first_registration_wins_silently() {
        let registry = HandlerRegistry::default();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first);
        registry.register_text(
            "Greeting",
            Arc::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let counter = Arc::clone(&second);
        registry.register_text(
            "Greeting",
            Arc::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.dispatch_text("Greeting", &raw("{}"), None);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn miss_is_silent() {
        let registry = HandlerRegistry::default();
        registry.dispatch_text("Unknown", &raw("{}"), None);
        registry.dispatch_binary(Bytes::from_static(b"\x00\x01"));
    }

    #[test]
    fn binary_slot_is_separate_and_single() {
        let registry = HandlerRegistry::default();
        let text_hits = Arc::new(AtomicUsize::new(0));
        let binary_hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&text_hits);
        registry.register_text(
            "Blob",
            Arc::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let counter = Arc::clone(&binary_hits);
        registry.register_binary(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        registry.register_binary(Arc::new(|_| panic!("second registration must be ignored")));

        registry.dispatch_binary(Bytes::from_static(b"anything"));
        assert_eq!(binary_hits.load(Ordering::SeqCst), 1);
        assert_eq!(text_hits.load(Ordering::SeqCst), 0);
    }
}
