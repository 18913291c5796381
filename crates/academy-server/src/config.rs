//! Server Configuration
//!
//! Process-level settings read from the environment. Payment settings
//! (price ids, Stripe keys, redirect URLs) are loaded by `academy-payments`.

use thiserror::Error;

/// Default legacy entry points still receiving inbound links
pub const DEFAULT_LEGACY_REDIRECTS: &str = "/enroll=/checkout,/cohort-checkout=/checkout";

/// Paths served by the router itself
const RESERVED_PATHS: &[&str] = &[
    "/health",
    "/api/checkout",
    "/api/enrollments",
    "/api/enrollments/claim",
    "/webhook/stripe",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// A deprecated path forwarded to its canonical replacement
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyRedirect {
    pub from: String,
    pub to: String,
}

/// Server settings
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,

    /// Stripe webhook signing secret; webhooks answer 503 without it
    pub webhook_secret: Option<String>,

    /// Deprecated paths and their targets
    pub legacy_redirects: Vec<LegacyRedirect>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            webhook_secret: None,
            legacy_redirects: parse_legacy_redirects(DEFAULT_LEGACY_REDIRECTS).unwrap_or_default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = optional_env("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into());
        let webhook_secret = optional_env("STRIPE_WEBHOOK_SECRET");
        let legacy_redirects = parse_legacy_redirects(
            &optional_env("LEGACY_REDIRECTS").unwrap_or_else(|| DEFAULT_LEGACY_REDIRECTS.into()),
        )?;

        Ok(Self {
            bind_addr,
            webhook_secret,
            legacy_redirects,
        })
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `from=to,from=to`
pub fn parse_legacy_redirects(raw: &str) -> Result<Vec<LegacyRedirect>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (from, to) = pair.split_once('=').ok_or_else(|| ConfigError::Invalid {
                name: "LEGACY_REDIRECTS",
                reason: format!("expected from=to, got {pair:?}"),
            })?;
            let (from, to) = (from.trim(), to.trim());
            if !from.starts_with('/') || !to.starts_with('/') {
                return Err(ConfigError::Invalid {
                    name: "LEGACY_REDIRECTS",
                    reason: format!("paths must start with '/': {pair:?}"),
                });
            }
            if to.contains(['?', '#']) {
                return Err(ConfigError::Invalid {
                    name: "LEGACY_REDIRECTS",
                    reason: format!("{to} must be a bare path, the inbound query is appended"),
                });
            }
            let has_pattern = from.contains(['{', '}', '*', '?', '#'])
                || from.split('/').any(|segment| segment.starts_with(':'));
            if has_pattern || RESERVED_PATHS.contains(&from) {
                return Err(ConfigError::Invalid {
                    name: "LEGACY_REDIRECTS",
                    reason: format!("{from} cannot be redirected"),
                });
            }
            if from == to {
                return Err(ConfigError::Invalid {
                    name: "LEGACY_REDIRECTS",
                    reason: format!("{from} redirects to itself"),
                });
            }
            Ok(LegacyRedirect {
                from: from.to_string(),
                to: to.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_redirects() {
        let config = ServerConfig::default();
        assert_eq!(config.legacy_redirects.len(), 2);
        assert_eq!(config.legacy_redirects[0].from, "/enroll");
        assert_eq!(config.legacy_redirects[0].to, "/checkout");
    }

    #[test]
    fn test_parse_redirects() {
        let parsed = parse_legacy_redirects(" /apply = /checkout , ,/old-store=/store").unwrap();
        assert_eq!(
            parsed,
            vec![
                LegacyRedirect { from: "/apply".into(), to: "/checkout".into() },
                LegacyRedirect { from: "/old-store".into(), to: "/store".into() },
            ]
        );
    }

    #[test]
    fn test_reject_bad_redirects() {
        assert!(parse_legacy_redirects("/apply").is_err());
        assert!(parse_legacy_redirects("apply=/checkout").is_err());
        assert!(parse_legacy_redirects("/checkout=/checkout").is_err());
        assert!(parse_legacy_redirects("/api/checkout=/checkout").is_err());
        assert!(parse_legacy_redirects("/old/{id}=/checkout").is_err());
        assert!(parse_legacy_redirects("/old/:id=/checkout").is_err());
        assert!(parse_legacy_redirects("/enroll=/checkout?x=1").is_err());
        assert!(parse_legacy_redirects("/enroll=/checkout#plans").is_err());
        assert!(parse_legacy_redirects("/enroll?x=1=/checkout").is_err());
    }
}
