use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::layout::{CorrectionFactors, PageFormat};

/// Application configuration loaded from environment variables.
/// Fails at startup if a value is present but malformed.
#[derive(Debug, Clone)]
pub struct Config {
    /// Absent means drafts live in memory only.
    pub database_url: Option<String>,
    pub port: u16,
    pub rust_log: String,
    /// Trailing-edge delay before live edits are persisted.
    pub persist_debounce: Duration,
    /// Open drafts untouched this long are flushed and dropped from memory.
    pub draft_idle_ttl: Duration,
    pub page_format: PageFormat,
    /// Applied on top of each template's default height corrections.
    pub height_corrections: CorrectionFactors,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Config {
            database_url: var("DATABASE_URL"),
            port: var("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            persist_debounce: Duration::from_millis(
                var("PERSIST_DEBOUNCE_MS")
                    .unwrap_or_else(|| "800".to_string())
                    .parse::<u64>()
                    .context("PERSIST_DEBOUNCE_MS must be a whole number of milliseconds")?,
            ),
            draft_idle_ttl: Duration::from_secs(
                var("DRAFT_IDLE_TTL_SECS")
                    .unwrap_or_else(|| "900".to_string())
                    .parse::<u64>()
                    .context("DRAFT_IDLE_TTL_SECS must be a whole number of seconds")?,
            ),
            page_format: var("PAGE_FORMAT")
                .map(|v| v.parse::<PageFormat>())
                .transpose()
                .map_err(|e| anyhow!(e))
                .context("PAGE_FORMAT must be 'a4' or 'letter'")?
                .unwrap_or_default(),
            height_corrections: var("HEIGHT_CORRECTIONS")
                .map(|v| CorrectionFactors::parse(&v))
                .transpose()
                .map_err(|e| anyhow!(e))
                .context("HEIGHT_CORRECTIONS must look like 'skills=0.9,summary=0.8'")?
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_config(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = make_config(&[]).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.port, 8080);
        assert_eq!(config.rust_log, "info");
        assert_eq!(config.persist_debounce, Duration::from_millis(800));
        assert_eq!(config.draft_idle_ttl, Duration::from_secs(900));
        assert_eq!(config.page_format, PageFormat::A4);
        assert!(config.height_corrections.is_empty());
    }

    #[test]
    fn test_values_are_parsed() {
        let config = make_config(&[
            ("DATABASE_URL", "postgres://localhost/pagewright"),
            ("PAGE_FORMAT", "Letter"),
            ("PERSIST_DEBOUNCE_MS", "250"),
            ("DRAFT_IDLE_TTL_SECS", "60"),
            ("HEIGHT_CORRECTIONS", "skills=0.8, summary=1.1"),
        ])
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/pagewright"));
        assert_eq!(config.page_format, PageFormat::Letter);
        assert_eq!(config.persist_debounce, Duration::from_millis(250));
        assert_eq!(config.draft_idle_ttl, Duration::from_secs(60));
        assert!((config.height_corrections.factor("summary") - 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_blank_database_url_means_memory_store() {
        let config = make_config(&[("DATABASE_URL", "  ")]).unwrap();
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_malformed_values_fail() {
        assert!(make_config(&[("PORT", "eighty")]).is_err());
        assert!(make_config(&[("PAGE_FORMAT", "a3")]).is_err());
        assert!(make_config(&[("HEIGHT_CORRECTIONS", "skills")]).is_err());
        assert!(make_config(&[("PERSIST_DEBOUNCE_MS", "-5")]).is_err());
        assert!(make_config(&[("DRAFT_IDLE_TTL_SECS", "soon")]).is_err());
    }
}
