//! Bearer-token identity resolution.
//!
//! Reads `Authorization: Bearer <jwt>`, validates signature, expiry and the
//! optional issuer/audience, and maps the claims onto an [`Identity`]. The
//! tenant comes from a configurable claim (`provider_id` by default).

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::{Identity, IdentityResolver};
use crate::config::AuthConfig;
use crate::error::{CarehubError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// JWT Claims
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (identity id)
    pub sub: String,

    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default)]
    pub iat: i64,

    pub exp: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    /// Everything else, including the tenant claim.
    #[serde(flatten)]
    pub custom: HashMap<String, serde_json::Value>,
}

impl Claims {
    pub fn new(subject: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: subject.into(),
            roles: Vec::new(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: None,
            aud: None,
            custom: HashMap::new(),
        }
    }

    pub fn with_tenant(mut self, claim: &str, tenant: impl Into<String>) -> Self {
        self.custom
            .insert(claim.to_string(), serde_json::Value::String(tenant.into()));
        self
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.iss = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.aud = Some(audience.into());
        self
    }

    /// Absolute expiry, overriding the ttl.
    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.exp = at.timestamp();
        self
    }

    /// Non-empty subject.
    pub fn subject(&self) -> Option<&str> {
        Some(self.sub.as_str()).filter(|s| !s.is_empty())
    }

    /// Non-empty string value of `claim`.
    pub fn tenant(&self, claim: &str) -> Option<&str> {
        self.custom
            .get(claim)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resolver
// ═══════════════════════════════════════════════════════════════════════════════

pub struct JwtIdentityResolver {
    algorithm: Algorithm,
    tenant_claim: String,
    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let (encoding_key, decoding_key) = match config.jwt_algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                let secret = config
                    .jwt_secret
                    .as_ref()
                    .ok_or_else(|| CarehubError::internal("JWT secret required for HMAC algorithms"))?;
                (
                    Some(EncodingKey::from_secret(secret.as_bytes())),
                    DecodingKey::from_secret(secret.as_bytes()),
                )
            }
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
                let pem = config
                    .jwt_public_key
                    .as_ref()
                    .ok_or_else(|| CarehubError::internal("JWT public key required for RSA algorithms"))?;
                let key = DecodingKey::from_rsa_pem(pem.as_bytes())
                    .map_err(|e| CarehubError::internal(format!("Invalid RSA public key: {}", e)))?;
                (None, key)
            }
            Algorithm::ES256 | Algorithm::ES384 => {
                let pem = config
                    .jwt_public_key
                    .as_ref()
                    .ok_or_else(|| CarehubError::internal("JWT public key required for EC algorithms"))?;
                let key = DecodingKey::from_ec_pem(pem.as_bytes())
                    .map_err(|e| CarehubError::internal(format!("Invalid EC public key: {}", e)))?;
                (None, key)
            }
            other => {
                return Err(CarehubError::internal(format!(
                    "Unsupported JWT algorithm: {:?}",
                    other
                )));
            }
        };

        let mut validation = Validation::new(config.jwt_algorithm);
        validation.leeway = config.leeway_secs;
        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(ref audience) = config.audience {
            validation.set_audience(&[audience]);
        }

        Ok(Self {
            algorithm: config.jwt_algorithm,
            tenant_claim: config.tenant_claim.clone(),
            encoding_key,
            decoding_key,
            validation,
        })
    }

    pub fn tenant_claim(&self) -> &str {
        &self.tenant_claim
    }

    /// Sign `claims`. Only available with HMAC keys.
    pub fn generate_token(&self, claims: &Claims) -> Result<String> {
        let key = self
            .encoding_key
            .as_ref()
            .ok_or_else(|| CarehubError::internal("JWT encoding key not configured"))?;

        encode(&Header::new(self.algorithm), claims, key)
            .map_err(|e| CarehubError::internal(format!("Failed to generate token: {}", e)))
    }

    /// Decode a raw token. Any validation failure yields `None`.
    pub fn decode_token(&self, token: &str) -> Option<Identity> {
        let claims = match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(error = %e, "JWT validation failed");
                return None;
            }
        };

        let Some(subject) = claims.subject() else {
            debug!("JWT has an empty subject");
            return None;
        };

        let Some(tenant) = claims.tenant(&self.tenant_claim) else {
            debug!(sub = %claims.sub, claim = %self.tenant_claim, "JWT has no tenant claim");
            return None;
        };

        Some(Identity {
            id: subject.into(),
            tenant_id: tenant.into(),
            expires_at: claims.expires_at(),
            role_claims: claims.roles,
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer ").or_else(|| s.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, parts: &Parts) -> Result<Option<Identity>> {
        Ok(bearer_token(&parts.headers).and_then(|token| self.decode_token(token)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
