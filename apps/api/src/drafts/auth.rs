//! Explicit per-request credential context.
//!
//! Callers identify themselves with `X-User-Id` (a signed-in user) or
//! `X-Guest-Token` (an anonymous editor). The extracted `Session` is passed
//! to whatever needs it; there is no process-wide auth state.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use uuid::Uuid;

use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const GUEST_TOKEN_HEADER: &str = "x-guest-token";

/// Who a persisted draft belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    User(Uuid),
    Guest(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    User(Uuid),
    Guest(String),
    Anonymous,
}

impl Session {
    /// A user id wins over a guest token when both are sent.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        if let Some(raw) = header_str(headers, USER_ID_HEADER)? {
            let id = Uuid::parse_str(raw)
                .map_err(|_| AppError::Validation(format!("{USER_ID_HEADER} must be a UUID")))?;
            return Ok(Session::User(id));
        }
        if let Some(token) = header_str(headers, GUEST_TOKEN_HEADER)? {
            return Ok(Session::Guest(token.to_string()));
        }
        Ok(Session::Anonymous)
    }

    /// Owner to record on drafts created by this session.
    pub fn require_owner(&self) -> Result<Owner, AppError> {
        match self {
            Session::User(id) => Ok(Owner::User(*id)),
            Session::Guest(token) => Ok(Owner::Guest(token.clone())),
            Session::Anonymous => Err(AppError::Unauthorized),
        }
    }

    pub fn authorize(&self, owner: &Owner) -> Result<(), AppError> {
        if self.require_owner()? == *owner {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, AppError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => {
            let s = value
                .to_str()
                .map_err(|_| AppError::Validation(format!("{name} must be visible ASCII")))?
                .trim();
            Ok((!s.is_empty()).then_some(s))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Session::from_headers(&parts.headers)
    }
}
