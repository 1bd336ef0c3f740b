//! Authentication gate for routes that need an identity.
//!
//! Mounted per route group, never globally. The credential is read from
//! `Authorization` (a leading `Bearer ` is optional) and resolved by the
//! [`UserLookup`] collaborator.
//!
//! | Outcome | Response |
//! |---|---|
//! | no credential | 401 `Authorization Missing` |
//! | lookup failed | classified [`Failure`] |
//! | user id is 0 | 401 `Authorization Expired` |
//! | otherwise | identity attached, chain continues |

use std::sync::Arc;

use async_trait::async_trait;
use http::header::{AUTHORIZATION, HeaderName};

use crate::classify::Failure;
use crate::context::{RequestContext, User};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::status::Status;

pub const AUTH_MISSING: &str = "Authorization Missing";
pub const AUTH_EXPIRED: &str = "Authorization Expired";

/// Resolves a credential to a user. Implemented by the service layer.
///
/// Implementations convert their raw errors into [`Failure`] variants so the
/// gate can classify them.
#[async_trait]
pub trait UserLookup: Send + Sync + 'static {
    async fn get_user_token(&self, ctx: &RequestContext, token: &str) -> Result<User, Failure>;
}

#[derive(Clone)]
pub struct Authenticate {
    users: Arc<dyn UserLookup>,
    header: HeaderName,
}

impl Authenticate {
    pub fn new(users: Arc<dyn UserLookup>) -> Self {
        Self { users, header: AUTHORIZATION }
    }

    /// Reads the credential from a different header.
    pub fn header(mut self, name: HeaderName) -> Self {
        self.header = name;
        self
    }
}

#[async_trait]
impl Middleware for Authenticate {
    async fn handle(&self, mut req: Request, next: Next) -> Response {
        let Some(token) = credential(&req, &self.header) else {
            return Response::error(Status::Unauthorized, AUTH_MISSING);
        };

        let user = match self.users.get_user_token(req.context(), &token).await {
            Ok(user) => user,
            Err(failure) => {
                req.context().logger().error("user lookup failed", &failure);
                return failure.into_response();
            }
        };

        if user.id == 0 {
            return Response::error(Status::Unauthorized, AUTH_EXPIRED);
        }

        req.context_mut().set_identity(Arc::new(user));
        next.run(req).await
    }
}

fn credential(req: &Request, header: &HeaderName) -> Option<String> {
    let raw = req.headers().get(header)?.to_str().ok()?.trim();
    let token = match raw.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer ") => raw[7..].trim_start(),
        // A bare scheme with nothing after it.
        _ if raw.eq_ignore_ascii_case("bearer") => "",
        _ => raw,
    };
    (!token.is_empty()).then(|| token.to_owned())
}
