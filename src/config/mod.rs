use anyhow::Result;
use reqwest::Url;
use std::time::Duration;

const DEFAULT_NODE_URL: &str = "http://localhost:9550";
const DEFAULT_PAGE_SIZE: usize = 30;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_500;
const DEFAULT_STREAM_WATCHDOG_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct Config {
    pub node_url: String,
    pub api_key: Option<String>,
    /// Explicit streaming override; `None` resolves from the endpoint kind.
    pub streaming: Option<bool>,
    pub page_size: usize,
    pub poll_interval: Duration,
    pub stream_watchdog: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let node_url = std::env::var("SHINKAI_NODE_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_NODE_URL.to_string());

        let api_key = std::env::var("SHINKAI_API_KEY")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let streaming = std::env::var("SHINKAI_STREAMING")
            .ok()
            .and_then(|v| parse_bool_str(&v));

        Ok(Self {
            node_url,
            api_key,
            streaming,
            page_size: env_override_usize("SHINKAI_PAGE_SIZE", DEFAULT_PAGE_SIZE, 5, 200),
            poll_interval: Duration::from_millis(env_override_u64(
                "SHINKAI_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
                250,
                30_000,
            )),
            stream_watchdog: Duration::from_secs(env_override_u64(
                "SHINKAI_STREAM_WATCHDOG_SECS",
                DEFAULT_STREAM_WATCHDOG_SECS,
                10,
                900,
            )),
        })
    }

    /// Streaming defaults on for remote nodes. Local node builds frequently
    /// ship without the SSE endpoint, so those fall back to polling unless
    /// `SHINKAI_STREAMING` says otherwise.
    pub fn streaming_enabled(&self) -> bool {
        match self.streaming {
            Some(explicit) => explicit,
            None => !is_local_endpoint_url(&self.node_url),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if Url::parse(&self.node_url).is_err() {
            anyhow::bail!("invalid node URL: {}", self.node_url);
        }
        if self.api_key.is_none() && !is_local_endpoint_url(&self.node_url) {
            tracing::warn!(
                node_url = %self.node_url,
                "no SHINKAI_API_KEY set for a remote node; requests will likely be rejected"
            );
        }
        Ok(())
    }
}

pub fn parse_bool_str(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Returns true for localhost, loopback IPv4/IPv6, and 0.0.0.0 URLs.
pub fn is_local_endpoint_url(url: &str) -> bool {
    let parsed = match Url::parse(url.trim()) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };

    match parsed.host_str() {
        Some(host) => {
            let normalized = host.trim().to_ascii_lowercase();
            normalized == "localhost"
                || normalized == "::1"
                || normalized == "[::1]"
                || normalized == "0.0.0.0"
                || normalized.starts_with("127.")
        }
        None => false,
    }
}

fn env_override_usize(key: &str, default: usize, min: usize, max: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map(|v| v.clamp(min, max))
        .unwrap_or(default)
}

fn env_override_u64(key: &str, default: u64, min: u64, max: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|v| v.clamp(min, max))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_config(node_url: &str) -> Config {
        Config {
            node_url: node_url.to_string(),
            api_key: None,
            streaming: None,
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            stream_watchdog: Duration::from_secs(DEFAULT_STREAM_WATCHDOG_SECS),
        }
    }

    #[test]
    fn test_parse_bool_str_variants() {
        assert_eq!(parse_bool_str("true"), Some(true));
        assert_eq!(parse_bool_str(" ON "), Some(true));
        assert_eq!(parse_bool_str("0"), Some(false));
        assert_eq!(parse_bool_str("off"), Some(false));
        assert_eq!(parse_bool_str("maybe"), None);
    }

    #[test]
    fn test_is_local_endpoint_url_checks_host_not_substring() {
        assert!(is_local_endpoint_url("http://localhost:9550"));
        assert!(is_local_endpoint_url("https://127.0.0.1:9550"));
        assert!(is_local_endpoint_url("http://0.0.0.0:9550"));
        assert!(!is_local_endpoint_url("https://evil-localhost.com"));
        assert!(!is_local_endpoint_url("https://node.shinkai.com"));
    }

    #[test]
    fn test_streaming_defaults_follow_endpoint_kind() {
        assert!(!bare_config("http://localhost:9550").streaming_enabled());
        assert!(bare_config("https://node.shinkai.com").streaming_enabled());

        let mut forced = bare_config("http://localhost:9550");
        forced.streaming = Some(true);
        assert!(forced.streaming_enabled());
    }

    #[test]
    fn test_env_override_clamps_to_range() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var("SHINKAI_PAGE_SIZE_TEST", "100000");
        assert_eq!(
            env_override_usize("SHINKAI_PAGE_SIZE_TEST", DEFAULT_PAGE_SIZE, 5, 200),
            200
        );
        std::env::set_var("SHINKAI_PAGE_SIZE_TEST", "garbage");
        assert_eq!(
            env_override_usize("SHINKAI_PAGE_SIZE_TEST", DEFAULT_PAGE_SIZE, 5, 200),
            DEFAULT_PAGE_SIZE
        );
        std::env::remove_var("SHINKAI_PAGE_SIZE_TEST");
    }

    #[test]
    fn test_validate_rejects_malformed_url() {
        assert!(bare_config("not a url").validate().is_err());
        assert!(bare_config("http://localhost:9550").validate().is_ok());
    }
}
