//! The uniform payload of every non-2xx response the gateway produces.
//!
//! ```json
//! {"msg": "service busy", "detail": "RECOVER"}
//! ```
//!
//! `msg` is always present. `detail` is either a coarse diagnostic tag
//! (`STORE`, `REQUEST`, ...) or, for parameter errors, the validation
//! description. Internal error strings never end up here.

use serde::{Deserialize, Serialize};

/// Message used for every server-side failure.
pub const SERVICE_BUSY: &str = "service busy";

/// Message used for rejected client input.
pub const PARAMETER_ERROR: &str = "parameter error";

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Envelope {
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Envelope {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into(), detail: None }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// `{"msg":"service busy"}` with an optional tag.
    pub fn service_busy(tag: Option<&str>) -> Self {
        Self { msg: SERVICE_BUSY.to_owned(), detail: tag.map(str::to_owned) }
    }

    /// Serialises to JSON bytes.
    ///
    /// The struct holds two strings, so serialisation cannot fail in practice;
    /// the fallback keeps the signature infallible for the response path.
    pub fn to_vec(&self) -> Vec<u8> {
        serde_json::to_vec(self)
            .unwrap_or_else(|_| format!(r#"{{"msg":"{SERVICE_BUSY}"}}"#).into_bytes())
    }
}
