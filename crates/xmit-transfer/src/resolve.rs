//! Service address resolution and the pinned client pool.
//!
//! The service hostname usually resolves to several addresses, each fronting
//! its own uplink. One HTTP client is built per address with its DNS lookup
//! replaced by that fixed address, so concurrent transfers spread across all
//! paths instead of sharing one TCP connection's bandwidth cap.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::info;
use xmit_types::{Result, XmitError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Scheme, host and port picked out of a service base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlParts {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl UrlParts {
    pub fn parse(base_url: &str) -> Result<Self> {
        let (scheme, rest) = base_url
            .split_once("://")
            .ok_or_else(|| XmitError::Transport(format!("invalid service URL '{base_url}'")))?;
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if authority.is_empty() {
            return Err(XmitError::Transport(format!(
                "invalid service URL '{base_url}': no host"
            )));
        }

        let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
            // Bracketed IPv6 literal.
            let (host, after) = rest.split_once(']').ok_or_else(|| {
                XmitError::Transport(format!("invalid service URL '{base_url}'"))
            })?;
            (host.to_string(), after.strip_prefix(':'))
        } else {
            match authority.split_once(':') {
                Some((host, port)) => (host.to_string(), Some(port)),
                None => (authority.to_string(), None),
            }
        };

        let port = match port {
            Some(p) => p.parse::<u16>().map_err(|_| {
                XmitError::Transport(format!("invalid port in service URL '{base_url}'"))
            })?,
            None => match scheme {
                "https" => 443,
                "http" => 80,
                other => {
                    return Err(XmitError::Transport(format!(
                        "unsupported scheme '{other}' in service URL"
                    )))
                }
            },
        };

        Ok(UrlParts {
            scheme: scheme.to_string(),
            host,
            port,
        })
    }
}

/// Keep only IPv4 addresses when any exist, otherwise return everything.
fn prefer_ipv4(addrs: Vec<SocketAddr>) -> Vec<SocketAddr> {
    let v4: Vec<SocketAddr> = addrs.iter().copied().filter(SocketAddr::is_ipv4).collect();
    if v4.is_empty() {
        addrs
    } else {
        v4
    }
}

/// A set of HTTP clients, one per resolved service address, addressed round
/// robin through a single atomic counter.
pub struct ClientPool {
    agents: Vec<ureq::Agent>,
    next: AtomicUsize,
}

impl ClientPool {
    /// Resolve the service URL's host through the system resolver and build
    /// one pinned client per address.
    pub fn resolve(base_url: &str) -> Result<Self> {
        let parts = UrlParts::parse(base_url)?;
        let addrs: Vec<SocketAddr> = (parts.host.as_str(), parts.port)
            .to_socket_addrs()
            .map_err(|e| XmitError::Transport(format!("resolving {}: {e}", parts.host)))?
            .collect();
        let addrs = prefer_ipv4(addrs);
        if addrs.is_empty() {
            return Err(XmitError::Transport(format!(
                "no addresses found for {}",
                parts.host
            )));
        }
        info!("resolved {} to {} address(es)", parts.host, addrs.len());
        Ok(Self::pinned_to(&addrs))
    }

    /// Build a pool pinned to the given addresses, bypassing resolution.
    pub fn pinned_to(addrs: &[SocketAddr]) -> Self {
        let agents = addrs
            .iter()
            .map(|addr| {
                let addr = *addr;
                // The resolver ignores the requested host and hands back the
                // pinned address, preserving the URL's scheme and port
                // semantics while forcing the connection onto one path.
                ureq::AgentBuilder::new()
                    .timeout_connect(CONNECT_TIMEOUT)
                    .resolver(move |_netloc: &str| -> std::io::Result<Vec<SocketAddr>> {
                        Ok(vec![addr])
                    })
                    .build()
            })
            .collect();
        Self {
            agents,
            next: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Select the next client round robin. Returns the client's index for
    /// logging along with the client itself.
    pub fn pick(&self) -> (usize, &ureq::Agent) {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.agents.len();
        (idx, &self.agents[idx])
    }
}
