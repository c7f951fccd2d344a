//! Integer-keyed request/response records.
//!
//! The integer tags are the wire contract and must not be renumbered. Every
//! record is a CBOR map; optional fields are omitted entirely when absent,
//! and unknown keys received from the service are skipped.

use minicbor::bytes::ByteVec;
use minicbor::{Decode, Encode};
use xmit_types::Hash;

/// API endpoint paths, all POST, all `application/cbor+zstd`.
pub mod endpoint {
    pub const PREFIX: &str = "/api/0";
    pub const SUGGEST: &str = "/api/0/suggest";
    pub const BUNDLE: &str = "/api/0/bundle";
    pub const MISSING: &str = "/api/0/missing";
    pub const FINALIZE: &str = "/api/0/finalize";
    pub const DL_BUNDLE: &str = "/api/0/dl/bundle";
    pub const DL_PARTS: &str = "/api/0/dl/parts";
    pub const TEAMS: &str = "/api/0/teams";
}

/// Borrowed view of the status fields common to every response.
#[derive(Debug, Clone, Copy)]
pub struct ServerNotes<'a> {
    pub success: bool,
    pub errors: &'a [String],
    pub warnings: &'a [String],
    pub messages: &'a [String],
}

macro_rules! server_notes {
    ($($ty:ty),+ $(,)?) => {$(
        impl $ty {
            pub fn notes(&self) -> ServerNotes<'_> {
                ServerNotes {
                    success: self.success,
                    errors: self.errors.as_deref().unwrap_or_default(),
                    warnings: self.warnings.as_deref().unwrap_or_default(),
                    messages: self.messages.as_deref().unwrap_or_default(),
                }
            }
        }
    )+};
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(map)]
pub struct SuggestRequest {
    #[n(1)]
    pub key: String,
    #[n(2)]
    pub team: Option<String>,
    #[n(5)]
    pub domain: Option<String>,
    #[n(6)]
    pub id: Hash,
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(map)]
pub struct SuggestResponse {
    #[n(1)]
    pub success: bool,
    #[n(2)]
    pub errors: Option<Vec<String>>,
    #[n(3)]
    pub warnings: Option<Vec<String>>,
    #[n(4)]
    pub messages: Option<Vec<String>>,
    #[n(5)]
    pub present: Option<bool>,
    #[n(6)]
    pub missing: Option<Vec<Hash>>,
}

impl SuggestResponse {
    pub fn present(&self) -> bool {
        self.present.unwrap_or(false)
    }

    pub fn missing(&self) -> &[Hash] {
        self.missing.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(map)]
pub struct ManifestUploadRequest {
    #[n(1)]
    pub key: String,
    #[n(2)]
    pub team: Option<String>,
    #[n(5)]
    pub domain: Option<String>,
    #[n(6)]
    pub bundle: ByteVec,
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(map)]
pub struct ManifestUploadResponse {
    #[n(1)]
    pub success: bool,
    #[n(2)]
    pub errors: Option<Vec<String>>,
    #[n(3)]
    pub warnings: Option<Vec<String>>,
    #[n(4)]
    pub messages: Option<Vec<String>>,
    #[n(5)]
    pub id: Option<Hash>,
    #[n(6)]
    pub missing: Option<Vec<Hash>>,
}

impl ManifestUploadResponse {
    pub fn missing(&self) -> &[Hash] {
        self.missing.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(map)]
pub struct PartsUploadRequest {
    #[n(1)]
    pub key: String,
    #[n(2)]
    pub team: Option<String>,
    #[n(5)]
    pub domain: Option<String>,
    #[n(6)]
    pub id: Option<Hash>,
    #[n(7)]
    pub parts: Vec<ByteVec>,
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(map)]
pub struct PartsUploadResponse {
    #[n(1)]
    pub success: bool,
    #[n(2)]
    pub errors: Option<Vec<String>>,
    #[n(3)]
    pub warnings: Option<Vec<String>>,
    #[n(4)]
    pub messages: Option<Vec<String>>,
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(map)]
pub struct FinalizeRequest {
    #[n(1)]
    pub key: String,
    #[n(2)]
    pub team: Option<String>,
    #[n(5)]
    pub domain: Option<String>,
    #[n(6)]
    pub id: Hash,
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(map)]
pub struct FinalizeResponse {
    #[n(1)]
    pub success: bool,
    #[n(2)]
    pub errors: Option<Vec<String>>,
    #[n(3)]
    pub warnings: Option<Vec<String>>,
    #[n(4)]
    pub messages: Option<Vec<String>>,
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(map)]
pub struct ManifestDownloadRequest {
    #[n(1)]
    pub key: String,
    #[n(2)]
    pub team: Option<String>,
    #[n(5)]
    pub domain: Option<String>,
    /// Snapshot ID; omitted selects the latest published snapshot.
    #[n(6)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(map)]
pub struct ManifestDownloadResponse {
    #[n(1)]
    pub success: bool,
    #[n(2)]
    pub errors: Option<Vec<String>>,
    #[n(3)]
    pub warnings: Option<Vec<String>>,
    #[n(4)]
    pub messages: Option<Vec<String>>,
    /// Raw canonical manifest bytes (not nested-compressed).
    #[n(5)]
    pub bundle: Option<ByteVec>,
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(map)]
pub struct PartsDownloadRequest {
    #[n(1)]
    pub key: String,
    #[n(2)]
    pub team: Option<String>,
    #[n(5)]
    pub domain: Option<String>,
    #[n(6)]
    pub hashes: Vec<Hash>,
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(map)]
pub struct PartsDownloadResponse {
    #[n(1)]
    pub success: bool,
    #[n(2)]
    pub errors: Option<Vec<String>>,
    #[n(3)]
    pub warnings: Option<Vec<String>>,
    #[n(4)]
    pub messages: Option<Vec<String>>,
    #[n(5)]
    pub parts: Option<Vec<ByteVec>>,
}

impl PartsDownloadResponse {
    pub fn parts(&self) -> &[ByteVec] {
        self.parts.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(map)]
pub struct TeamsRequest {
    #[n(1)]
    pub key: String,
    #[n(2)]
    pub team: Option<String>,
    #[n(5)]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
#[cbor(map)]
pub struct Team {
    #[n(1)]
    pub id: Option<String>,
    #[n(2)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(map)]
pub struct TeamsResponse {
    #[n(1)]
    pub success: bool,
    #[n(2)]
    pub errors: Option<Vec<String>>,
    #[n(3)]
    pub warnings: Option<Vec<String>>,
    #[n(4)]
    pub messages: Option<Vec<String>>,
    #[n(5)]
    pub teams: Option<Vec<Team>>,
    #[n(6)]
    pub management_url: Option<String>,
}

server_notes!(
    SuggestResponse,
    ManifestUploadResponse,
    PartsUploadResponse,
    FinalizeResponse,
    ManifestDownloadResponse,
    PartsDownloadResponse,
    TeamsResponse,
);
