//! [`IdentityProvider`] backed by JWT bearer tokens.

use tm_booking::{BookingError, Caller, IdentityProvider, RequestContext};
use tracing::debug;

use crate::jwt::{extract_jwt_from_header, JwtManager};

/// Resolves callers from `Authorization: Bearer <jwt>` headers.
#[derive(Debug)]
pub struct JwtIdentityProvider {
    manager: JwtManager,
}

impl JwtIdentityProvider {
    /// Create a provider validating with `manager`.
    #[must_use]
    pub const fn new(manager: JwtManager) -> Self {
        Self { manager }
    }

    /// The underlying token manager.
    #[must_use]
    pub const fn manager(&self) -> &JwtManager {
        &self.manager
    }

    fn resolve(&self, ctx: &RequestContext) -> Result<Caller, BookingError> {
        let header = ctx
            .authorization
            .as_deref()
            .ok_or_else(|| BookingError::Unauthorized {
                reason: "missing authorization header".to_string(),
            })?;
        let token = extract_jwt_from_header(header)?;
        let claims = self.manager.validate_token(token)?;
        let user_id = claims.user_id()?;
        debug!(%user_id, request_id = ctx.request_id.as_deref().unwrap_or("-"), "caller resolved");
        Ok(Caller {
            user_id,
            email: claims.email,
        })
    }
}

impl IdentityProvider for JwtIdentityProvider {
    async fn resolve_caller(&self, ctx: &RequestContext) -> tm_booking::Result<Caller> {
        self.resolve(ctx)
    }
}
