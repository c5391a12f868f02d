//! Frame reassembly.
//!
//! A logical message may span multiple physical frames; only the terminal
//! fragment carries the `fin` mark. The reassembler accumulates fragments
//! until `fin`, then emits one [`LogicalMessage`] and resets.
//!
//! Growth is capped by `max_bytes`: exceeding it fails with
//! [`RelayError::MessageTooLarge`], which callers treat as fatal for the
//! connection (the stream position inside a partial message is lost).

use bytes::Bytes;

use crate::error::{RelayError, Result};

/// Kind of a physical fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Text,
    Binary,
    /// Follow-up fragment of an already-started message.
    Continuation,
}

/// One physical frame as delivered by the transport.
#[derive(Debug)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub data: Bytes,
    pub fin: bool,
}

impl Fragment {
    /// Complete text message in a single frame (the common case).
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self {
            kind: FragmentKind::Text,
            data: data.into(),
            fin: true,
        }
    }

    /// Complete binary message in a single frame.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self {
            kind: FragmentKind::Binary,
            data: data.into(),
            fin: true,
        }
    }

    /// First fragment of a multi-frame message.
    pub fn start(kind: FragmentKind, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            data: data.into(),
            fin: false,
        }
    }

    /// Follow-up fragment; `fin` marks the terminal one.
    pub fn continuation(data: impl Into<Bytes>, fin: bool) -> Self {
        Self {
            kind: FragmentKind::Continuation,
            data: data.into(),
            fin,
        }
    }
}

/// One fully reassembled message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalMessage {
    Text(String),
    Binary(Bytes),
}

/// Accumulates fragments into logical messages.
///
/// One instance per connection; not shared across tasks.
#[derive(Debug)]
pub struct Reassembler {
    max_bytes: usize,
    kind: Option<FragmentKind>,
    buf: Vec<u8>,
}

impl Reassembler {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            kind: None,
            buf: Vec::new(),
        }
    }

    /// Feed one fragment. Returns `Ok(Some(..))` when a message completes.
    ///
    /// `MessageTooLarge` is fatal for the connection. `MalformedEnvelope`
    /// (invalid UTF-8 in a completed text message) only drops that message.
    pub fn push(&mut self, fragment: Fragment) -> Result<Option<LogicalMessage>> {
        match fragment.kind {
            FragmentKind::Continuation => {
                if self.kind.is_none() {
                    tracing::warn!("continuation frame without a started message, dropping");
                    return Ok(None);
                }
            }
            kind => {
                if self.kind.is_some() {
                    tracing::warn!("new message started before previous one finished, resetting");
                    self.buf.clear();
                }
                self.kind = Some(kind);
            }
        }

        let projected = self.buf.len() + fragment.data.len();
        if projected > self.max_bytes {
            let limit = self.max_bytes;
            self.reset();
            return Err(RelayError::MessageTooLarge {
                limit,
                observed: projected,
            });
        }
        self.buf.extend_from_slice(&fragment.data);

        if !fragment.fin {
            return Ok(None);
        }

        let Some(kind) = self.kind.take() else {
            return Ok(None);
        };
        let data = std::mem::take(&mut self.buf);
        match kind {
            FragmentKind::Text => match String::from_utf8(data) {
                Ok(text) => Ok(Some(LogicalMessage::Text(text))),
                Err(e) => Err(RelayError::MalformedEnvelope(format!(
                    "text message is not valid utf-8: {e}"
                ))),
            },
            _ => Ok(Some(LogicalMessage::Binary(Bytes::from(data)))),
        }
    }

    fn reset(&mut self) {
        self.kind = None;
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;

    #[test]
    fn single_frame_text_passes_through() {
        let mut r = Reassembler::new(1024);
        let out = r.push(Fragment::text("hello")).unwrap();
        assert_eq!(out, Some(LogicalMessage::Text("hello".into())));
    }

    #[test]
    fn fragmented_binary_is_joined_in_order() {
        let mut r = Reassembler::new(1 << 20);
        assert!(r
            .push(Fragment::start(FragmentKind::Binary, vec![1u8, 2]))
            .unwrap()
            .is_none());
        assert!(r
            .push(Fragment::continuation(vec![3u8, 4], false))
            .unwrap()
            .is_none());
        let out = r.push(Fragment::continuation(vec![5u8], true)).unwrap();
        assert_eq!(
            out,
            Some(LogicalMessage::Binary(Bytes::from_static(&[1, 2, 3, 4, 5])))
        );
    }

    #[test]
    fn large_payload_reassembles_unmodified() {
        // 200 KB across many fragments, as a fragmenting transport would send it.
        let payload: Vec<u8> = (0..200_000).map(|i| (i % 251) as u8).collect();
        let mut r = Reassembler::new(1 << 20);

        let chunks: Vec<&[u8]> = payload.chunks(16 * 1024).collect();
        let mut result = None;
        for (i, chunk) in chunks.iter().enumerate() {
            let fin = i == chunks.len() - 1;
            let frag = if i == 0 {
                Fragment {
                    kind: FragmentKind::Binary,
                    data: Bytes::copy_from_slice(chunk),
                    fin,
                }
            } else {
                Fragment::continuation(Bytes::copy_from_slice(chunk), fin)
            };
            result = r.push(frag).unwrap();
        }
        assert_eq!(result, Some(LogicalMessage::Binary(Bytes::from(payload))));
    }

    #[test]
    fn growth_cap_is_enforced() {
        let mut r = Reassembler::new(10);
        assert!(r
            .push(Fragment::start(FragmentKind::Binary, vec![0u8; 8]))
            .unwrap()
            .is_none());
        let err = r
            .push(Fragment::continuation(vec![0u8; 8], true))
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::MessageTooLarge {
                limit: 10,
                observed: 16
            }
        ));
        // State was reset; the reassembler stays usable.
        let out = r.push(Fragment::binary(vec![7u8])).unwrap();
        assert_eq!(out, Some(LogicalMessage::Binary(Bytes::from_static(&[7]))));
    }

    #[test]
    fn stray_continuation_is_dropped() {
        let mut r = Reassembler::new(1024);
        assert!(r
            .push(Fragment::continuation(vec![1u8], true))
            .unwrap()
            .is_none());
    }

    #[test]
    fn invalid_utf8_text_is_malformed_not_fatal() {
        let mut r = Reassembler::new(1024);
        let err = r
            .push(Fragment {
                kind: FragmentKind::Text,
                data: Bytes::from_static(&[0xff, 0xfe]),
                fin: true,
            })
            .unwrap_err();
        assert!(matches!(err, RelayError::MalformedEnvelope(_)));
        // Next message is unaffected.
        let out = r.push(Fragment::text("ok")).unwrap();
        assert_eq!(out, Some(LogicalMessage::Text("ok".into())));
    }
}
