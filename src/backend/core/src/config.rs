//! Configuration management.
//!
//! Values come from an optional file and from `CAREHUB__SECTION__KEY`
//! environment variables, environment taking precedence.

use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::time::Duration;

use crate::ownership::validate_identifier;

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Policy and ownership database. Without it the server runs on an
    /// in-memory policy store.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    /// Token validation
    #[serde(default)]
    pub auth: AuthConfig,

    /// Enforcer tuning
    #[serde(default)]
    pub authz: AuthzConfig,

    /// Resource kinds with ownership checks
    #[serde(default)]
    pub ownership: OwnershipConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Requests still running after this are cancelled
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Upper bound for bodies read by validation steps
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,

    /// Apply embedded migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared secret for HS256/HS384/HS512
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// PEM public key for RS*/ES* algorithms
    #[serde(default)]
    pub jwt_public_key: Option<String>,

    #[serde(default = "default_jwt_algorithm")]
    pub jwt_algorithm: Algorithm,

    #[serde(default)]
    pub issuer: Option<String>,

    #[serde(default)]
    pub audience: Option<String>,

    /// Leeway for expiration checks (in seconds)
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,

    /// Claim holding the tenant (provider) id
    #[serde(default = "default_tenant_claim")]
    pub tenant_claim: String,
}

impl DatabaseConfig {
    /// Pool defaults for `url`.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout: default_acquire_timeout(),
            run_migrations: default_true(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_public_key: None,
            jwt_algorithm: default_jwt_algorithm(),
            issuer: None,
            audience: None,
            leeway_secs: default_leeway_secs(),
            tenant_claim: default_tenant_claim(),
        }
    }
}

impl AuthConfig {
    /// HMAC config with the given secret and defaults elsewhere.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: Some(secret.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthzConfig {
    /// Bound on role hierarchy expansion
    #[serde(default = "default_max_role_depth")]
    pub max_role_depth: usize,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            max_role_depth: default_max_role_depth(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnershipConfig {
    #[serde(default = "default_ownership_resources")]
    pub resources: Vec<OwnedResourceConfig>,
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            resources: default_ownership_resources(),
        }
    }
}

/// Where the owning tenant of one resource kind is stored.
#[derive(Debug, Clone, Deserialize)]
pub struct OwnedResourceConfig {
    pub kind: String,
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_tenant_column")]
    pub tenant_column: String,
}

impl OwnedResourceConfig {
    pub fn new(kind: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            table: table.into(),
            id_column: default_id_column(),
            tenant_column: default_tenant_column(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// OpenTelemetry OTLP endpoint
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Reported as `service.name`
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_level: default_log_level(),
            log_format: default_log_format(),
            service_name: default_service_name(),
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> Duration { Duration::from_secs(30) }
fn default_body_limit() -> usize { 1024 * 1024 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_acquire_timeout() -> Duration { Duration::from_secs(5) }
fn default_true() -> bool { true }
fn default_jwt_algorithm() -> Algorithm { Algorithm::HS256 }
fn default_leeway_secs() -> u64 { 60 }
fn default_tenant_claim() -> String { "provider_id".to_string() }
fn default_max_role_depth() -> usize { crate::rbac::DEFAULT_MAX_ROLE_DEPTH }
fn default_id_column() -> String { "id".to_string() }
fn default_tenant_column() -> String { "provider_id".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> LogFormat { LogFormat::Json }
fn default_service_name() -> String { "carehub-core".to_string() }

fn default_ownership_resources() -> Vec<OwnedResourceConfig> {
    [
        ("patient", "patients"),
        ("assessment", "assessments"),
        ("appointment", "appointments"),
        ("invoice", "invoices"),
        ("staff", "staff"),
    ]
    .into_iter()
    .map(|(kind, table)| OwnedResourceConfig::new(kind, table))
    .collect()
}

impl Config {
    /// Load configuration from environment only.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("CAREHUB").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a file, with environment overrides. A missing file is not
    /// an error.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("CAREHUB").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings that would only fail later, at request time.
    pub fn validate(&self) -> anyhow::Result<()> {
        let auth = &self.auth;
        match auth.jwt_algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                if auth.jwt_secret.as_deref().map_or(true, str::is_empty) {
                    anyhow::bail!("auth.jwt_secret is required for {:?}", auth.jwt_algorithm);
                }
            }
            _ => {
                if auth.jwt_public_key.is_none() {
                    anyhow::bail!("auth.jwt_public_key is required for {:?}", auth.jwt_algorithm);
                }
            }
        }

        if self.authz.max_role_depth == 0 {
            anyhow::bail!("authz.max_role_depth must be at least 1");
        }

        for resource in &self.ownership.resources {
            for (field, value) in [
                ("table", &resource.table),
                ("id_column", &resource.id_column),
                ("tenant_column", &resource.tenant_column),
            ] {
                validate_identifier(value).map_err(|e| {
                    anyhow::anyhow!("ownership resource {}: {}: {}", resource.kind, field, e)
                })?;
            }
        }

        Ok(())
    }
}
