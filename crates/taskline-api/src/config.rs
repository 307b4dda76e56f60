//! Server configuration.

use serde::{Deserialize, Serialize};

use taskline_core::{Error, Result};

/// CORS configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorsConfig {
    /// Allowed origins. `["*"]` allows any origin (debug only).
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Preflight cache duration in seconds.
    #[serde(default = "default_cors_max_age")]
    pub max_age_seconds: u64,
}

fn default_cors_max_age() -> u64 {
    3600
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            max_age_seconds: default_cors_max_age(),
        }
    }
}

/// JWT verification configuration.
///
/// Exactly one of `hs256_secret` / `rs256_public_key_pem` must be set when
/// debug mode is off.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JwtConfig {
    /// Shared secret for HS256 verification.
    #[serde(default)]
    pub hs256_secret: Option<String>,
    /// PEM-encoded RSA public key for RS256 verification.
    #[serde(default)]
    pub rs256_public_key_pem: Option<String>,
    /// Expected `iss` claim, when set.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Expected `aud` claim, when set.
    #[serde(default)]
    pub audience: Option<String>,
    /// Claim carrying the user identifier.
    #[serde(default = "default_user_claim")]
    pub user_claim: String,
}

fn default_user_claim() -> String {
    "sub".to_string()
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            hs256_secret: None,
            rs256_public_key_pem: None,
            issuer: None,
            audience: None,
            user_claim: default_user_claim(),
        }
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("hs256_secret", &self.hs256_secret.as_ref().map(|_| "[REDACTED]"))
            .field(
                "rs256_public_key_pem",
                &self.rs256_public_key_pem.as_ref().map(|_| "[PEM]"),
            )
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("user_claim", &self.user_claim)
            .finish()
    }
}

/// Configuration for the Taskline API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server port.
    pub http_port: u16,

    /// Enable debug mode.
    ///
    /// In debug mode the user identifier is taken from the `X-User-Id`
    /// header instead of a verified JWT, and logs are pretty-printed.
    pub debug: bool,

    /// CORS settings.
    #[serde(default)]
    pub cors: CorsConfig,

    /// JWT verification settings (production mode).
    #[serde(default)]
    pub jwt: JwtConfig,

    /// Consecutive failures of one `(user, op_id)` before it is
    /// dead-lettered.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
}

fn default_retry_budget() -> u32 {
    taskline_sync::failure::DEFAULT_RETRY_BUDGET
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8080,
            debug: true,
            cors: CorsConfig::default(),
            jwt: JwtConfig::default(),
            retry_budget: default_retry_budget(),
        }
    }
}

impl Config {
    /// Loads configuration from `TASKLINE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable is present but unparseable.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(port) = env_u16("TASKLINE_HTTP_PORT")? {
            config.http_port = port;
        }
        if let Some(debug) = env_bool("TASKLINE_DEBUG")? {
            config.debug = debug;
        }
        if let Some(origins) = env_string("TASKLINE_CORS_ALLOWED_ORIGINS") {
            config.cors.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(max_age) = env_u64("TASKLINE_CORS_MAX_AGE_SECONDS")? {
            config.cors.max_age_seconds = max_age;
        }
        config.jwt.hs256_secret = env_string("TASKLINE_JWT_HS256_SECRET");
        config.jwt.rs256_public_key_pem = env_string("TASKLINE_JWT_RS256_PUBLIC_KEY_PEM");
        config.jwt.issuer = env_string("TASKLINE_JWT_ISSUER");
        config.jwt.audience = env_string("TASKLINE_JWT_AUDIENCE");
        if let Some(claim) = env_string("TASKLINE_JWT_USER_CLAIM") {
            config.jwt.user_claim = claim;
        }
        if let Some(budget) = env_u32("TASKLINE_SYNC_RETRY_BUDGET")? {
            config.retry_budget = budget;
        }
        Ok(config)
    }

    /// Validates that the configuration is safe to serve with.
    ///
    /// # Errors
    ///
    /// Returns an error for insecure production settings: missing JWT key
    /// material, ambiguous key material, or wildcard CORS.
    pub fn validate(&self) -> Result<()> {
        if !self.debug {
            let has_hs256 = self.jwt.hs256_secret.is_some();
            let has_rs256 = self.jwt.rs256_public_key_pem.is_some();
            if !has_hs256 && !has_rs256 {
                return Err(Error::InvalidInput(
                    "jwt.hs256_secret or jwt.rs256_public_key_pem is required when debug=false"
                        .to_string(),
                ));
            }
            if has_hs256 && has_rs256 {
                return Err(Error::InvalidInput(
                    "jwt.hs256_secret and jwt.rs256_public_key_pem are mutually exclusive"
                        .to_string(),
                ));
            }
            if self.cors.allowed_origins.iter().any(|origin| origin == "*") {
                return Err(Error::InvalidInput(
                    "cors.allowed_origins cannot include '*' when debug=false".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_u16(name: &str) -> Result<Option<u16>> {
    env_string(name)
        .map(|v| {
            v.parse::<u16>()
                .map_err(|e| Error::InvalidInput(format!("{name} must be a port number: {e}")))
        })
        .transpose()
}

fn env_u32(name: &str) -> Result<Option<u32>> {
    env_string(name)
        .map(|v| {
            v.parse::<u32>()
                .map_err(|e| Error::InvalidInput(format!("{name} must be an integer: {e}")))
        })
        .transpose()
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    env_string(name)
        .map(|v| {
            v.parse::<u64>()
                .map_err(|e| Error::InvalidInput(format!("{name} must be an integer: {e}")))
        })
        .transpose()
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    env_string(name)
        .map(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(Error::InvalidInput(format!(
                "{name} must be a boolean, got '{other}'"
            ))),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_debug_friendly() {
        let config = Config::default();
        assert!(config.debug);
        assert_eq!(config.retry_budget, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn production_requires_key_material() {
        let config = Config {
            debug: false,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn production_rejects_ambiguous_key_material() {
        let config = Config {
            debug: false,
            jwt: JwtConfig {
                hs256_secret: Some("secret".to_string()),
                rs256_public_key_pem: Some("pem".to_string()),
                ..JwtConfig::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn production_rejects_wildcard_cors() {
        let config = Config {
            debug: false,
            jwt: JwtConfig {
                hs256_secret: Some("secret".to_string()),
                ..JwtConfig::default()
            },
            cors: CorsConfig {
                allowed_origins: vec!["*".to_string()],
                max_age_seconds: 60,
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_secret_is_redacted() {
        let jwt = JwtConfig {
            hs256_secret: Some("super-secret".to_string()),
            ..JwtConfig::default()
        };
        let rendered = format!("{jwt:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
