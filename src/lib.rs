//! # gatehouse
//!
//! The request-processing middleware of an HTTP API gateway, on a minimal
//! hyper/tokio framework.
//!
//! ## The contract
//!
//! The edge proxy owns TLS, rate limiting, slow clients and body-size limits.
//! The business services own their logic. gatehouse owns what every request
//! needs in between:
//!
//! - **Trace ids**: adopt `X-Trace-Id` or mint one, and key every log line by it
//! - **Panic recovery**: a panicking handler costs one 500, not the process
//! - **CORS**: preflights answered at the door
//! - **Access logs**: one structured record per request, bodies included
//! - **Authentication**: opt-in per route, identity attached to the request
//! - **Error envelopes**: every failure becomes `{"msg": ..., "detail"?: ...}`
//!   with a status from one fixed vocabulary
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gatehouse::middleware::{AccessLog, Authenticate, Cors, Recover, TraceContext, UserLookup};
//! use gatehouse::{Config, Failure, Group, Method, Request, RequestContext, Response, Router, Server, User};
//!
//! struct Users;
//!
//! #[async_trait::async_trait]
//! impl UserLookup for Users {
//!     async fn get_user_token(&self, _ctx: &RequestContext, token: &str) -> Result<User, Failure> {
//!         Ok(User { id: 1, primary_id: token.to_owned(), secondary_id: String::new() })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gatehouse::Error> {
//!     let config = Config::from_env()?;
//!
//!     let app = Router::new()
//!         .layer(Recover::new())
//!         .layer(Cors::default())
//!         .layer(TraceContext::new())
//!         .layer(AccessLog::new(config.access_log.clone()))
//!         .on(Method::Get, "/ping", ping)
//!         .group(Group::new().layer(Authenticate::new(Arc::new(Users))).on(Method::Get, "/me", me));
//!
//!     Server::bind(config.addr).serve(app).await
//! }
//!
//! async fn ping(_req: Request) -> &'static str {
//!     "pong"
//! }
//!
//! async fn me(req: Request) -> Response {
//!     let id = req.context().identity().map(|u| u.id).unwrap_or_default();
//!     Response::json(format!(r#"{{"id":{id}}}"#))
//! }
//! ```

mod body;
mod classify;
mod context;
mod envelope;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod config;
pub mod logging;
pub mod middleware;

pub use body::Body;
pub use classify::{BoxError, Failure, classify};
pub use config::Config;
pub use context::{IdentitySlot, RequestContext, TraceSlot, User};
pub use envelope::Envelope;
pub use error::Error;
pub use handler::Handler;
pub use method::Method;
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::{App, Group, Router};
pub use server::Server;
pub use status::Status;
