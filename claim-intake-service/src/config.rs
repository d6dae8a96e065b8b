//! Service configuration read from the environment at startup.
//!
//! | Variable                  | Default                                          |
//! |---------------------------|--------------------------------------------------|
//! | `PREDICTION_ENDPOINT`     | required                                         |
//! | `DOC_S3_PATH`             | `s3://buckett0/Auto Claim Acceptance Rules.pdf`  |
//! | `BIND_ADDR`               | `0.0.0.0:3000`                                   |
//! | `PREDICTION_TIMEOUT_SECS` | unset, no timeout                                |
//!
//! Logging is configured separately through `LOG_FORMAT` and `RUST_LOG`.

use std::net::SocketAddr;
use std::time::Duration;

use claim_flow::DEFAULT_DOC_S3_PATH;
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub prediction_endpoint: String,
    pub doc_s3_path: String,
    pub bind_addr: SocketAddr,
    pub prediction_timeout: Option<Duration>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let prediction_endpoint =
            get("PREDICTION_ENDPOINT").ok_or(ConfigError::Missing("PREDICTION_ENDPOINT"))?;
        if !prediction_endpoint.starts_with("http://") && !prediction_endpoint.starts_with("https://")
        {
            return Err(ConfigError::Invalid {
                key: "PREDICTION_ENDPOINT",
                value: prediction_endpoint,
                reason: "expected an http(s) URL".to_string(),
            });
        }

        let doc_s3_path = get("DOC_S3_PATH").unwrap_or_else(|| DEFAULT_DOC_S3_PATH.to_string());

        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "BIND_ADDR",
                value: bind_addr.clone(),
                reason: e.to_string(),
            })?;

        let prediction_timeout = get("PREDICTION_TIMEOUT_SECS")
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| ConfigError::Invalid {
                        key: "PREDICTION_TIMEOUT_SECS",
                        value: raw.clone(),
                        reason: e.to_string(),
                    })
            })
            .transpose()?;

        Ok(Self {
            prediction_endpoint,
            doc_s3_path,
            bind_addr,
            prediction_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            ServiceConfig::from_lookup(lookup(&[("PREDICTION_ENDPOINT", "https://predict.example.com/")]))
                .unwrap();
        assert_eq!(config.prediction_endpoint, "https://predict.example.com/");
        assert_eq!(config.doc_s3_path, DEFAULT_DOC_S3_PATH);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR.parse::<SocketAddr>().unwrap());
        assert_eq!(config.prediction_timeout, None);
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("PREDICTION_ENDPOINT", "http://localhost:9000/predict"),
            ("DOC_S3_PATH", "s3://rules/home.pdf"),
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("PREDICTION_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.doc_s3_path, "s3://rules/home.pdf");
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.prediction_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_missing_endpoint() {
        let err = ServiceConfig::from_lookup(lookup(&[("PREDICTION_ENDPOINT", "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("PREDICTION_ENDPOINT"));
    }

    #[test]
    fn test_invalid_values() {
        let err = ServiceConfig::from_lookup(lookup(&[("PREDICTION_ENDPOINT", "ftp://x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PREDICTION_ENDPOINT", .. }));

        let err = ServiceConfig::from_lookup(lookup(&[
            ("PREDICTION_ENDPOINT", "http://x"),
            ("PREDICTION_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PREDICTION_TIMEOUT_SECS", .. }));

        let err = ServiceConfig::from_lookup(lookup(&[
            ("PREDICTION_ENDPOINT", "http://x"),
            ("BIND_ADDR", "nowhere"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "BIND_ADDR", .. }));
    }
}
