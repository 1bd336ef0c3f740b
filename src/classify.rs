//! Failure taxonomy and its mapping onto status codes.
//!
//! Every collaborator boundary converts its raw error into a [`Failure`]
//! variant before it reaches a handler's return value. [`classify`] is then
//! a closed match: the same variant always yields the same status and tag.
//!
//! | Variant | Status | `msg` | `detail` |
//! |---|---|---|---|
//! | `Validation` | 400 | parameter error | the validation description |
//! | `Store` | 500 | service busy | `STORE` |
//! | `Queue` | 500 | service busy | `QUEUE` |
//! | `Generic` | 500 | service busy | `GENERIC` |
//! | `Transport` | 504 | service busy | `REQUEST` |
//! | `MalformedResponse` | 502 | service busy | `RESPONSE` |
//! | `Unclassified` | 500 | service busy | none |
//!
//! Classify once, where the response is written. Log before returning the
//! failure; the classifier itself has no side effects.

use crate::envelope::{Envelope, PARAMETER_ERROR};
use crate::response::{IntoResponse, Response};
use crate::status::Status;

/// Boxed error carried by infrastructure variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A request-level failure, classified by variant.
#[derive(Debug, thiserror::Error)]
pub enum Failure {
    /// Client input did not pass validation.
    #[error("{0}")]
    Validation(String),

    /// The cache/store backend rejected the command.
    #[error("store: {0}")]
    Store(#[source] BoxError),

    /// The message queue rejected the command.
    #[error("queue: {0}")]
    Queue(#[source] BoxError),

    /// A plain error message with no further structure.
    #[error("{0}")]
    Generic(String),

    /// An outbound network call failed.
    #[error("request: {0}")]
    Transport(#[source] BoxError),

    /// An upstream answered with a body we could not decode.
    #[error("response: {0}")]
    MalformedResponse(#[source] BoxError),

    #[error("{0}")]
    Unclassified(#[source] BoxError),
}

impl Failure {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store(err: impl Into<BoxError>) -> Self {
        Self::Store(err.into())
    }

    pub fn queue(err: impl Into<BoxError>) -> Self {
        Self::Queue(err.into())
    }

    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    pub fn transport(err: impl Into<BoxError>) -> Self {
        Self::Transport(err.into())
    }

    pub fn malformed_response(err: impl Into<BoxError>) -> Self {
        Self::MalformedResponse(err.into())
    }

    pub fn unclassified(err: impl Into<BoxError>) -> Self {
        Self::Unclassified(err.into())
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Validation(_) => Status::InvalidParam,
            Self::Transport(_) => Status::GatewayTimeout,
            Self::MalformedResponse(_) => Status::WrongResponse,
            Self::Store(_) | Self::Queue(_) | Self::Generic(_) | Self::Unclassified(_) => {
                Status::ServerError
            }
        }
    }

    /// Diagnostic tag sent to the client; `None` for validation and
    /// unclassified failures.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Self::Store(_) => Some("STORE"),
            Self::Queue(_) => Some("QUEUE"),
            Self::Generic(_) => Some("GENERIC"),
            Self::Transport(_) => Some("REQUEST"),
            Self::MalformedResponse(_) => Some("RESPONSE"),
            Self::Validation(_) | Self::Unclassified(_) => None,
        }
    }
}

/// Maps a failure to the status and envelope the client receives.
pub fn classify(failure: &Failure) -> (Status, Envelope) {
    let envelope = match failure {
        Failure::Validation(description) => {
            Envelope::new(PARAMETER_ERROR).with_detail(description.clone())
        }
        other => Envelope::service_busy(other.tag()),
    };
    (failure.status(), envelope)
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let (status, envelope) = classify(&self);
        Response::envelope(status, &envelope)
    }
}

// ── Boundary conversions ──────────────────────────────────────────────────────

impl From<validator::ValidationErrors> for Failure {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<reqwest::Error> for Failure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::MalformedResponse(Box::new(e))
        } else {
            Self::Transport(Box::new(e))
        }
    }
}

impl From<serde_json::Error> for Failure {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedResponse(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn io(msg: &str) -> std::io::Error {
        std::io::Error::other(msg.to_owned())
    }

    #[test]
    fn validation_failure_is_400_with_description() {
        let (status, env) = classify(&Failure::validation("name: too short"));
        assert_eq!(status, Status::InvalidParam);
        assert_eq!(env.msg, "parameter error");
        assert_eq!(env.detail.as_deref(), Some("name: too short"));
    }

    #[test]
    fn infrastructure_failures_carry_their_tag() {
        let cases = [
            (Failure::store(io("conn reset")), Status::ServerError, "STORE"),
            (Failure::queue(io("E_BAD_TOPIC")), Status::ServerError, "QUEUE"),
            (Failure::generic("boom"), Status::ServerError, "GENERIC"),
            (Failure::transport(io("timed out")), Status::GatewayTimeout, "REQUEST"),
            (Failure::malformed_response(io("eof")), Status::WrongResponse, "RESPONSE"),
        ];
        for (failure, status, tag) in cases {
            let (got_status, env) = classify(&failure);
            assert_eq!(got_status, status, "{failure}");
            assert_eq!(env.msg, "service busy");
            assert_eq!(env.detail.as_deref(), Some(tag));
        }
    }

    #[test]
    fn unclassified_failure_is_generic_500() {
        let (status, env) = classify(&Failure::unclassified(io("???")));
        assert_eq!(status, Status::ServerError);
        assert_eq!(env, Envelope::new("service busy"));
    }

    #[test]
    fn classification_is_stable_across_calls() {
        let failure = Failure::transport(io("refused"));
        assert_eq!(classify(&failure), classify(&failure));
    }

    #[test]
    fn internal_message_never_reaches_the_envelope() {
        let (_, env) = classify(&Failure::store(io("password=hunter2")));
        assert!(!env.to_vec().windows(7).any(|w| w == b"hunter2"));
    }

    #[test]
    fn serde_json_error_maps_to_wrong_response() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(Failure::from(err).status(), Status::WrongResponse);
    }

    #[derive(Validate)]
    struct Signup {
        #[validate(length(min = 3))]
        name: String,
    }

    #[test]
    fn validator_errors_map_to_invalid_param() {
        let errors = Signup { name: "al".into() }.validate().unwrap_err();
        let failure = Failure::from(errors);
        assert_eq!(failure.status(), Status::InvalidParam);
        assert!(classify(&failure).1.detail.unwrap().contains("name"));
    }
}
