use serde::Deserialize;

/// The service's well-known discovery document.
///
/// Fetched once per invocation; `url` is the canonical API base for every
/// subsequent request, `api_key_management_url` is surfaced to users who have
/// no key configured.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryInfo {
    #[serde(default)]
    pub protocols: Vec<String>,
    pub url: String,
    #[serde(default)]
    pub api_key_management_url: Option<String>,
}

impl DiscoveryInfo {
    /// Whether the service speaks the protocol revision this client
    /// implements.
    pub fn supports_current_protocol(&self) -> bool {
        self.protocols.iter().any(|p| p == crate::PROTOCOL_ID)
    }
}
