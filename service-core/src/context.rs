//! Request context for the BFF trust model.
//!
//! The upstream frontend authenticates the user and forwards identity in
//! headers. Services read it here and never re-validate tokens.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const BRANCH_ID_HEADER: &str = "x-branch-id";

/// Identity of the caller as forwarded by the frontend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: String,
    pub role: String,
    pub branch_id: Option<String>,
}

impl RequestContext {
    /// Build the context from request headers, defaulting missing values.
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        Self {
            user_id: header(USER_ID_HEADER).unwrap_or_else(|| "system".to_string()),
            role: header(USER_ROLE_HEADER).unwrap_or_default(),
            branch_id: header(BRANCH_ID_HEADER),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}
