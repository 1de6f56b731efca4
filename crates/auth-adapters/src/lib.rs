//! # auth-adapters
//!
//! Identity resolution for bearer credentials. The core only sees the
//! `IdentityResolver` port; which token format backs it is chosen here.

#[cfg(feature = "auth-jwt")]
pub mod jwt;

#[cfg(feature = "auth-jwt")]
pub use jwt::JwtIdentityResolver;
