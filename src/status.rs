//! The gateway's status-code vocabulary.
//!
//! Every status this layer emits has a symbolic name here. Handlers and
//! middleware speak in these names; the numeric codes live in one table.
//!
//! ```rust
//! use gatehouse::{Response, Status};
//!
//! // status-only, no body
//! Response::status(Status::NoContent);
//!
//! // envelope body: {"msg":"user not found"}
//! Response::error(Status::NotFound, "user not found");
//! ```

/// Symbolic HTTP status codes used across the gateway.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Status {
    Ok,                 // 200
    NoContent,          // 204  (CORS preflight)
    InvalidParam,       // 400
    Unauthorized,       // 401  credential missing or expired
    Forbidden,          // 403
    NotFound,           // 404
    Conflict,           // 409  already exists
    OverSize,           // 413
    UnsupportedType,    // 415
    Unprocessable,      // 422  malformed or stale payload
    Locked,             // 423
    RateLimit,          // 429
    ServerError,        // 500
    WrongResponse,      // 502  upstream answered garbage
    ServiceUnavailable, // 503
    GatewayTimeout,     // 504  upstream call failed
}

impl Status {
    /// Numeric code.
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok                 => 200,
            Self::NoContent          => 204,
            Self::InvalidParam       => 400,
            Self::Unauthorized       => 401,
            Self::Forbidden          => 403,
            Self::NotFound           => 404,
            Self::Conflict           => 409,
            Self::OverSize           => 413,
            Self::UnsupportedType    => 415,
            Self::Unprocessable      => 422,
            Self::Locked             => 423,
            Self::RateLimit          => 429,
            Self::ServerError        => 500,
            Self::WrongResponse      => 502,
            Self::ServiceUnavailable => 503,
            Self::GatewayTimeout     => 504,
        }
    }

    pub fn is_success(self) -> bool {
        self.code() < 300
    }
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        s.code()
    }
}

impl From<Status> for http::StatusCode {
    fn from(s: Status) -> http::StatusCode {
        // Every code in the table is a valid status.
        http::StatusCode::from_u16(s.code()).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_matches_standard_codes() {
        let table = [
            (Status::Ok, 200),
            (Status::NoContent, 204),
            (Status::InvalidParam, 400),
            (Status::Unauthorized, 401),
            (Status::Forbidden, 403),
            (Status::NotFound, 404),
            (Status::Conflict, 409),
            (Status::OverSize, 413),
            (Status::UnsupportedType, 415),
            (Status::Unprocessable, 422),
            (Status::Locked, 423),
            (Status::RateLimit, 429),
            (Status::ServerError, 500),
            (Status::WrongResponse, 502),
            (Status::ServiceUnavailable, 503),
            (Status::GatewayTimeout, 504),
        ];
        for (status, code) in table {
            assert_eq!(u16::from(status), code);
            assert_eq!(http::StatusCode::from(status).as_u16(), code);
        }
    }

    #[test]
    fn only_2xx_is_success() {
        assert!(Status::Ok.is_success());
        assert!(Status::NoContent.is_success());
        assert!(!Status::Unauthorized.is_success());
        assert!(!Status::GatewayTimeout.is_success());
    }
}
