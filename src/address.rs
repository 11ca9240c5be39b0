//! Address Resolver: computes the gateway's base address and its failover
//! candidates.

use crate::config::Config;
use crate::store::SessionStore;
use std::fmt;
use url::Url;

/// Root segment every address ends in.
pub const API_ROOT: &str = "/api";

/// Root of the API surface, e.g. `http://localhost:49724/api` or `/api`.
///
/// Never carries a trailing slash and always ends in [`API_ROOT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address(String);

impl Address {
    /// Builds an address from an origin, appending the API root unless present.
    pub fn from_origin(origin: &str) -> Self {
        let trimmed = origin.trim().trim_end_matches('/');
        if trimmed.ends_with(API_ROOT) {
            Address(trimmed.to_string())
        } else {
            Address(format!("{}{}", trimmed, API_ROOT))
        }
    }

    /// Same-origin deployment: the bare API root.
    pub fn relative() -> Self {
        Address(API_ROOT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The address without its API root, as persisted in the store.
    pub fn origin(&self) -> &str {
        self.0.strip_suffix(API_ROOT).unwrap_or(&self.0)
    }

    pub fn is_relative(&self) -> bool {
        !(self.0.starts_with("http://") || self.0.starts_with("https://"))
    }

    /// Absolute URL for `path`, resolving relative addresses against `page_origin`.
    pub fn join(&self, page_origin: &str, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.is_relative() {
            format!("{}{}/{}", page_origin.trim_end_matches('/'), self.0, path)
        } else {
            format!("{}/{}", self.0, path)
        }
    }

    /// The address with `from` port swapped for `to`, when it uses `from`.
    fn with_port_swapped(&self, from: u16, to: u16) -> Option<Address> {
        if self.is_relative() {
            return None;
        }
        let mut url = Url::parse(&self.0).ok()?;
        if url.port_or_known_default() != Some(from) {
            return None;
        }
        url.set_port(Some(to)).ok()?;
        Some(Address::from_origin(url.as_str()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Environment default: configured backend origin, else same-origin `/api`.
pub fn default_address(config: &Config) -> Address {
    match config.backend_url {
        Some(ref origin) => Address::from_origin(origin),
        None => Address::relative(),
    }
}

/// Address used at start-up: persisted override, then environment default,
/// then same-origin. Never fails.
pub fn resolve_initial_address(store: &dyn SessionStore, config: &Config) -> Address {
    if let Some(stored) = store.base_override() {
        let address = Address::from_origin(&stored);
        tracing::debug!("Using persisted API address override: {}", address);
        return address;
    }
    let address = default_address(config);
    tracing::debug!("Using default API address: {}", address);
    address
}

/// Alternates for `current`, in priority order: the environment default,
/// then the configured port swaps in both directions. Duplicates removed.
pub fn failover_candidates(current: &Address, config: &Config) -> Vec<Address> {
    let mut candidates: Vec<Address> = Vec::new();
    let mut push = |candidate: Address| {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    };

    push(default_address(config));
    for &(a, b) in &config.failover_ports {
        if let Some(swapped) = current.with_port_swapped(a, b) {
            push(swapped);
        }
        if let Some(swapped) = current.with_port_swapped(b, a) {
            push(swapped);
        }
    }
    candidates
}

/// First candidate that differs from `current`.
pub fn next_failover_target(current: &Address, config: &Config) -> Option<Address> {
    failover_candidates(current, config)
        .into_iter()
        .find(|candidate| candidate != current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, BASE_URL_KEY};

    fn config_with_backend(backend: Option<&str>) -> Config {
        Config {
            backend_url: backend.map(String::from),
            ..Config::default()
        }
    }

    #[test]
    fn test_from_origin_normalizes() {
        assert_eq!(
            Address::from_origin("http://localhost:49724/").as_str(),
            "http://localhost:49724/api"
        );
        assert_eq!(
            Address::from_origin("http://localhost:49724/api//").as_str(),
            "http://localhost:49724/api"
        );
        assert_eq!(
            Address::from_origin("http://localhost:49724/api").origin(),
            "http://localhost:49724"
        );
    }

    #[test]
    fn test_join() {
        let abs = Address::from_origin("http://localhost:49724");
        assert_eq!(
            abs.join("http://ignored", "/leads/GetLeads"),
            "http://localhost:49724/api/leads/GetLeads"
        );
        let rel = Address::relative();
        assert_eq!(
            rel.join("http://localhost:3000/", "leads"),
            "http://localhost:3000/api/leads"
        );
    }

    #[test]
    fn test_resolution_priority() {
        let store = MemoryStore::new();
        assert_eq!(
            resolve_initial_address(&store, &config_with_backend(None)),
            Address::relative()
        );
        assert_eq!(
            resolve_initial_address(&store, &config_with_backend(Some("https://crm.example.com"))),
            Address::from_origin("https://crm.example.com")
        );
        store.set(BASE_URL_KEY, "http://localhost:44308/").unwrap();
        assert_eq!(
            resolve_initial_address(&store, &config_with_backend(Some("https://crm.example.com")))
                .as_str(),
            "http://localhost:44308/api"
        );
    }

    #[test]
    fn test_port_swap_candidates() {
        let config = config_with_backend(None);
        let current = Address::from_origin("http://localhost:49724");
        let target = next_failover_target(&current, &config).unwrap();
        // the relative default comes first
        assert_eq!(target, Address::relative());

        let config = config_with_backend(Some("http://localhost:49724"));
        let target = next_failover_target(&current, &config).unwrap();
        assert_eq!(target.as_str(), "http://localhost:44308/api");

        let current = Address::from_origin("http://localhost:44308");
        let target = next_failover_target(&current, &config).unwrap();
        assert_eq!(target.as_str(), "http://localhost:49724/api");
    }

    #[test]
    fn test_no_candidate_when_nothing_differs() {
        let config = Config {
            backend_url: Some("https://crm.example.com".into()),
            failover_ports: vec![],
            ..Config::default()
        };
        let current = Address::from_origin("https://crm.example.com");
        assert!(next_failover_target(&current, &config).is_none());
    }
}
