//! Protocol modules (text envelope + frame reassembly).
//!
//! Two wire frame kinds exist:
//! - Text frames carry a JSON [`envelope::Envelope`].
//! - Binary frames carry raw bytes and bypass the envelope codec entirely.
//!
//! All parsers are panic-free: malformed input is reported as `RelayError`
//! instead of panicking or indexing raw buffers.

pub mod envelope;
pub mod frame;
