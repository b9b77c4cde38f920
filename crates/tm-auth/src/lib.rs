//! # tm-auth
//!
//! Identity for the TradeMinutes booking core.
//!
//! - [`JwtManager`] issues and validates HS256 session tokens
//! - [`JwtIdentityProvider`] resolves the caller of a request from its
//!   `Authorization: Bearer <token>` header

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod identity;
pub mod jwt;

pub use error::{AuthError, Result};
pub use identity::JwtIdentityProvider;
pub use jwt::{extract_jwt_from_header, AuthSettings, JwtClaims, JwtConfig, JwtManager};
