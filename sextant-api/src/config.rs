//! API Configuration Module
//!
//! Settings for CORS, rate limiting and the translation pipeline, loaded
//! from environment variables with development-friendly defaults.

use std::time::Duration;

use sextant_llm::{CandidateList, DEFAULT_ATTEMPT_TIMEOUT};
use sextant_prom::DEFAULT_CATALOG_TTL;

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Deployment environment, from `SEXTANT_ENV` or `NODE_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }

    pub fn from_env() -> Self {
        std::env::var("SEXTANT_ENV")
            .or_else(|_| std::env::var("NODE_ENV"))
            .map(|v| Self::parse(&v))
            .unwrap_or(Environment::Development)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for CORS, rate limiting and the pipeline.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub environment: Environment,

    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Rate Limiting Configuration
    // ========================================================================
    pub rate_limit_enabled: bool,

    /// Requests allowed per client IP in each window.
    pub rate_limit_requests: u32,

    pub rate_limit_window: Duration,

    // ========================================================================
    // Pipeline Configuration
    // ========================================================================
    /// Ordered generation candidates.
    pub candidates: CandidateList,

    /// Upper bound on a single candidate call.
    pub generation_timeout: Duration,

    /// How long a fetched metric catalog stays fresh.
    pub catalog_ttl: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Development)
    }
}

impl ApiConfig {
    /// Defaults for `environment` without reading any variables.
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            environment,
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 86400,
            rate_limit_enabled: true,
            rate_limit_requests: if environment == Environment::Development {
                200
            } else {
                100
            },
            rate_limit_window: Duration::from_secs(15 * 60),
            candidates: CandidateList::default(),
            generation_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            catalog_ttl: DEFAULT_CATALOG_TTL,
        }
    }

    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SEXTANT_ENV` / `NODE_ENV`: development, test or production
    /// - `SEXTANT_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `SEXTANT_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `SEXTANT_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `SEXTANT_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `SEXTANT_RATE_LIMIT_REQUESTS`: Requests per window per IP (default: 100, 200 in development)
    /// - `SEXTANT_RATE_LIMIT_WINDOW_SECS`: Window length (default: 900)
    /// - `SEXTANT_GEMINI_MODELS`: Comma-separated candidate list
    /// - `SEXTANT_GENERATION_TIMEOUT_SECS`: Per-candidate timeout (default: 30)
    /// - `SEXTANT_CATALOG_TTL_SECS`: Metric catalog freshness (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::for_environment(Environment::from_env());

        let cors_origins = std::env::var("SEXTANT_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = std::env::var("SEXTANT_CORS_ALLOW_CREDENTIALS")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(false);

        let rate_limit_enabled = std::env::var("SEXTANT_RATE_LIMIT_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        let candidates = std::env::var("SEXTANT_GEMINI_MODELS")
            .ok()
            .and_then(|s| CandidateList::parse(&s))
            .unwrap_or(defaults.candidates);

        Self {
            environment: defaults.environment,
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs: env_parse("SEXTANT_CORS_MAX_AGE_SECS")
                .unwrap_or(defaults.cors_max_age_secs),
            rate_limit_enabled,
            rate_limit_requests: env_parse("SEXTANT_RATE_LIMIT_REQUESTS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.rate_limit_requests),
            rate_limit_window: env_parse("SEXTANT_RATE_LIMIT_WINDOW_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            candidates,
            generation_timeout: env_parse("SEXTANT_GENERATION_TIMEOUT_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.generation_timeout),
            // Zero is allowed and disables catalog caching.
            catalog_ttl: env_parse("SEXTANT_CATALOG_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.catalog_ttl),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == "*" || allowed == origin {
                return true;
            }
            // Wildcard subdomains: *.example.com
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain.ends_with(&format!(".{}", pattern))
                        || origin_domain == pattern;
                }
            }
            false
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert!(!config.cors_allow_credentials);
        assert_eq!(config.cors_max_age_secs, 86400);
        assert!(config.rate_limit_enabled);
        assert_eq!(config.rate_limit_requests, 200);
        assert_eq!(config.rate_limit_window, Duration::from_secs(900));
        assert_eq!(config.candidates.len(), 5);
        assert_eq!(config.generation_timeout, Duration::from_secs(30));
        assert_eq!(config.catalog_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_production_rate_limit_is_stricter() {
        let config = ApiConfig::for_environment(Environment::Production);
        assert_eq!(config.rate_limit_requests, 100);
        assert!(config.is_production());
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse("PROD"), Environment::Production);
        assert_eq!(Environment::parse("test"), Environment::Test);
        assert_eq!(Environment::parse("staging"), Environment::Development);
    }

    #[test]
    fn test_origin_allowed_dev_mode() {
        let config = ApiConfig::default();
        assert!(config.is_origin_allowed("https://anything.com"));
        assert!(config.is_origin_allowed("http://localhost:5173"));
    }

    #[test]
    fn test_origin_allowed_production() {
        let mut config = ApiConfig::for_environment(Environment::Production);
        config.cors_origins = vec![
            "https://sextant.run".to_string(),
            "*.grafana.example".to_string(),
        ];

        assert!(config.is_origin_allowed("https://sextant.run"));
        assert!(config.is_origin_allowed("https://ops.grafana.example"));
        assert!(!config.is_origin_allowed("https://evil.com"));
        assert!(!config.is_origin_allowed("https://notgrafana.example"));
    }

    // Env-mutating assertions share one test so they never race each other.
    #[test]
    fn test_from_env_overrides() {
        let _env = EnvVarGuard::set("SEXTANT_ENV", Some("production"));
        let _origins = EnvVarGuard::set(
            "SEXTANT_CORS_ORIGINS",
            Some("https://a.example, ,https://b.example"),
        );
        let _models = EnvVarGuard::set("SEXTANT_GEMINI_MODELS", Some("gemini-2.5-pro, gemini-2.5-flash"));
        let _timeout = EnvVarGuard::set("SEXTANT_GENERATION_TIMEOUT_SECS", Some("5"));
        let _ttl = EnvVarGuard::set("SEXTANT_CATALOG_TTL_SECS", Some("0"));
        let _requests = EnvVarGuard::set("SEXTANT_RATE_LIMIT_REQUESTS", Some("not-a-number"));
        let _enabled = EnvVarGuard::set("SEXTANT_RATE_LIMIT_ENABLED", Some("FALSE"));

        let config = ApiConfig::from_env();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.candidates.ids(), vec!["gemini-2.5-pro", "gemini-2.5-flash"]);
        assert_eq!(config.generation_timeout, Duration::from_secs(5));
        assert_eq!(config.catalog_ttl, Duration::ZERO);
        assert_eq!(config.rate_limit_requests, 100);
        assert!(!config.rate_limit_enabled);
    }
}
