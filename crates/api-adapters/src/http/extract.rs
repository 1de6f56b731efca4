//! Request extractors for the caller's identity and network origin.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header;
use axum::http::request::Parts;
use tracing::debug;

use domains::{DomainError, Identity};

use super::error::ApiError;
use super::state::AppState;

/// Rejects the request with 401 unless a valid bearer token is present.
#[derive(Debug, Clone)]
pub struct RequireIdentity(pub Identity);

/// The caller's identity if they sent a valid bearer token. A missing or
/// unusable token makes the request anonymous rather than failing it.
#[derive(Debug, Clone)]
pub struct MaybeIdentity(pub Option<Identity>);

/// Network origin used for anonymous rate limiting: the socket peer
/// address, or the first `X-Forwarded-For` hop when that peer is a trusted
/// proxy. `"unknown"` when no peer address is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOrigin(pub String);

fn bearer(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl FromRequestParts<AppState> for RequireIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or(DomainError::Unauthenticated)?;
        let identity = state.identity.resolve(token).await?;
        Ok(Self(identity))
    }
}

impl FromRequestParts<AppState> for MaybeIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer(parts) else {
            return Ok(Self(None));
        };
        match state.identity.resolve(token).await {
            Ok(identity) => Ok(Self(Some(identity))),
            Err(e) => {
                debug!(error = %e, "ignoring unusable bearer token");
                Ok(Self(None))
            }
        }
    }
}

impl FromRequestParts<AppState> for ClientOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(client_origin(parts, &state.trusted_proxies)))
    }
}

fn client_origin(parts: &Parts, trusted_proxies: &[IpAddr]) -> String {
    let Some(peer) = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_canonical())
    else {
        return "unknown".to_string();
    };
    if !trusted_proxies.contains(&peer) {
        return peer.to_string();
    }
    parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.to_string())
}
