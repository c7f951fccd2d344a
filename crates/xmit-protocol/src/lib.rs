//! Shared wire-format types and constants for client ↔ service communication.
//!
//! This crate is intentionally minimal: the manifest tree, integer-keyed
//! request/response records, endpoint paths, and discovery validation. No
//! network or filesystem I/O.

pub mod discovery;
pub mod tree;
pub mod wire;

pub use discovery::DiscoveryInfo;
pub use tree::Node;

/// Protocol identifier that must appear in a service's discovery document.
pub const PROTOCOL_ID: &str = "xmit/0";

/// Well-known path of the discovery document.
pub const WELL_KNOWN_PATH: &str = "/.well-known/web-publication-protocol";

/// Media type of every API request and response body.
pub const CONTENT_TYPE: &str = "application/cbor+zstd";
