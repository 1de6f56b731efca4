//! HS256 JWT implementation of `IdentityResolver`.
//!
//! Tokens carry `sub` (the user id), optional `name` and `email`,
//! `email_verified`, and `exp`. Anything that fails signature or expiry checks resolves to
//! `DomainError::Unauthenticated`.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use domains::{DomainError, Identity, IdentityResolver, UserId};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    exp: i64,
}

pub struct JwtIdentityResolver {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            validation,
        }
    }

    /// Mints a token for `identity`, valid for `ttl`.
    pub fn issue(&self, identity: &Identity, ttl: Duration) -> Result<String, DomainError> {
        let claims = Claims {
            sub: identity.user_id.to_string(),
            name: identity.display_name.clone(),
            email: identity.email.clone(),
            email_verified: identity.email_verified,
            exp: (Utc::now() + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|_| DomainError::Unauthenticated)
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, bearer: &str) -> Result<Identity, DomainError> {
        let data = decode::<Claims>(bearer, &self.decoding, &self.validation).map_err(|e| {
            debug!(error = %e, "bearer token rejected");
            DomainError::Unauthenticated
        })?;
        let claims = data.claims;
        if claims.sub.is_empty() {
            return Err(DomainError::Unauthenticated);
        }
        Ok(Identity {
            user_id: UserId::new(claims.sub),
            display_name: claims.name.filter(|n| !n.trim().is_empty()),
            email: claims.email,
            email_verified: claims.email_verified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(secret: &str) -> JwtIdentityResolver {
        JwtIdentityResolver::new(&SecretString::from(secret.to_string()))
    }

    #[tokio::test]
    async fn issued_token_resolves_to_identity() {
        let auth = resolver("test-secret");
        let identity = Identity {
            user_id: UserId::new("user-1"),
            display_name: Some("Camper".into()),
            email: Some("camper@example.com".into()),
            email_verified: true,
        };
        let token = auth.issue(&identity, Duration::minutes(5)).unwrap();
        assert_eq!(auth.resolve(&token).await.unwrap(), identity);
    }

    #[tokio::test]
    async fn wrong_secret_and_expired_tokens_are_rejected() {
        let identity = Identity::new("user-1");
        let token = resolver("a").issue(&identity, Duration::minutes(5)).unwrap();
        assert_eq!(
            resolver("b").resolve(&token).await,
            Err(DomainError::Unauthenticated)
        );

        let auth = resolver("a");
        let expired = auth.issue(&identity, Duration::hours(-2)).unwrap();
        assert_eq!(auth.resolve(&expired).await, Err(DomainError::Unauthenticated));
        assert_eq!(auth.resolve("not-a-jwt").await, Err(DomainError::Unauthenticated));
    }
}
