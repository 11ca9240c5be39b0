use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the gateway and the local facade.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend origin supplied by the environment (without the `/api` root).
    pub backend_url: Option<String>,
    /// Origin that relative addresses are resolved against.
    pub page_origin: String,
    /// Fixed per-call deadline; an unanswered call counts as a transport failure.
    pub request_timeout: Duration,
    /// Enables request/response diagnostics. Never on by default.
    pub http_debug: bool,
    /// Port pairs swapped against each other when building failover candidates.
    pub failover_ports: Vec<(u16, u16)>,
    /// File backing the persistent session store.
    pub store_path: PathBuf,
    /// Navigation target announced when the session is invalidated.
    pub sign_in_route: String,
    /// Port the local facade listens on.
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: None,
            page_origin: "http://localhost:3000".to_string(),
            request_timeout: Duration::from_secs(10),
            http_debug: false,
            failover_ports: vec![(49724, 44308)],
            store_path: PathBuf::from(".leads-session.json"),
            sign_in_route: "/login".to_string(),
            port: 3001,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            backend_url: std::env::var("LEADS_BACKEND_URL")
                .ok()
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty())
                .map(|url| {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("LEADS_BACKEND_URL must start with http:// or https://");
                    }
                    Ok(url)
                })
                .transpose()?,
            page_origin: std::env::var("LEADS_PAGE_ORIGIN")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|origin| {
                    if !origin.starts_with("http://") && !origin.starts_with("https://") {
                        anyhow::bail!("LEADS_PAGE_ORIGIN must start with http:// or https://");
                    }
                    Ok(origin.trim_end_matches('/').to_string())
                })
                .transpose()?
                .unwrap_or(defaults.page_origin),
            request_timeout: match std::env::var("LEADS_HTTP_TIMEOUT_SECS") {
                Ok(secs) => {
                    let secs: u64 = secs.trim().parse().map_err(|_| {
                        anyhow::anyhow!("LEADS_HTTP_TIMEOUT_SECS must be a whole number of seconds")
                    })?;
                    if secs == 0 {
                        anyhow::bail!("LEADS_HTTP_TIMEOUT_SECS must be greater than zero");
                    }
                    Duration::from_secs(secs)
                }
                Err(_) => defaults.request_timeout,
            },
            http_debug: std::env::var("LEADS_HTTP_DEBUG")
                .map(|v| v.trim() == "1")
                .unwrap_or(false),
            failover_ports: match std::env::var("LEADS_FAILOVER_PORTS") {
                Ok(raw) => parse_port_pairs(&raw)?,
                Err(_) => defaults.failover_ports,
            },
            store_path: std::env::var("LEADS_STORE_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.store_path),
            sign_in_route: std::env::var("LEADS_SIGN_IN_ROUTE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.sign_in_route),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| defaults.port.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
        };

        tracing::info!("Configuration loaded successfully");
        match config.backend_url {
            Some(ref url) => tracing::debug!("Backend URL: {}", url),
            None => tracing::debug!("No backend URL configured, using same-origin /api"),
        }
        tracing::debug!("Failover port pairs: {:?}", config.failover_ports);
        tracing::debug!("Session store: {}", config.store_path.display());
        if config.http_debug {
            tracing::info!("HTTP diagnostics enabled");
        }

        Ok(config)
    }
}

/// Parses `"49724:44308,8080:8081"` into port pairs. An empty string disables port swapping.
pub fn parse_port_pairs(raw: &str) -> anyhow::Result<Vec<(u16, u16)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (a, b) = pair
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("failover port pair '{}' must be PORT:PORT", pair))?;
            let a: u16 = a
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid port '{}' in LEADS_FAILOVER_PORTS", a))?;
            let b: u16 = b
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid port '{}' in LEADS_FAILOVER_PORTS", b))?;
            Ok((a, b))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_pairs() {
        let pairs = parse_port_pairs("49724:44308, 8080:8081").unwrap();
        assert_eq!(pairs, vec![(49724, 44308), (8080, 8081)]);
    }

    #[test]
    fn test_parse_port_pairs_empty_disables_swapping() {
        assert!(parse_port_pairs("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_port_pairs_rejects_garbage() {
        assert!(parse_port_pairs("49724").is_err());
        assert!(parse_port_pairs("abc:44308").is_err());
    }

    #[test]
    fn test_default_is_quiet() {
        let config = Config::default();
        assert!(!config.http_debug);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.sign_in_route, "/login");
    }
}
