//! Discovery of the service's API base URL.

use std::time::Duration;

use tracing::debug;
use xmit_protocol::{DiscoveryInfo, PROTOCOL_ID, WELL_KNOWN_PATH};
use xmit_types::{Result, XmitError};

/// Fetch and validate the well-known discovery document.
///
/// Fails unless the service lists `xmit/0` among its protocols.
pub fn discover(base_url: &str) -> Result<DiscoveryInfo> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), WELL_KNOWN_PATH);
    debug!("fetching discovery document from {url}");

    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(30))
        .build();
    let response = match agent.get(&url).call() {
        Ok(resp) => resp,
        Err(ureq::Error::Status(code, _)) => {
            return Err(XmitError::Discovery(format!(
                "{url} returned status {code}"
            )))
        }
        Err(e) => return Err(XmitError::Discovery(format!("fetching {url}: {e}"))),
    };

    let info: DiscoveryInfo = response
        .into_json()
        .map_err(|e| XmitError::Discovery(format!("malformed discovery document: {e}")))?;

    if !info.supports_current_protocol() {
        return Err(XmitError::Discovery(format!(
            "service does not support the {PROTOCOL_ID} protocol"
        )));
    }

    Ok(info)
}
