//! Domain error kinds
//!
//! A single closed set of error kinds travels on every [`ProviderReply`] and
//! internal result. Translation to transport status codes happens only at the
//! HTTP router; everything below it speaks this enum.
//!
//! [`ProviderReply`]: crate::consensus::reply::ProviderReply

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The closed set of failure categories surfaced as `error_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Request validation failed: missing fields, out-of-range values.
    InvalidRequest,
    /// Authorization header missing or malformed.
    Unauthorized,
    /// Bearer token not in the configured set.
    Forbidden,
    /// Token bucket exhausted for this token and route class.
    RateLimited,
    /// A single adapter exceeded its deadline slice.
    ProviderTimeout,
    /// The provider answered with a non-success HTTP status, or the
    /// connection failed outright.
    ProviderHttpError,
    /// The provider payload could not be interpreted.
    ProviderParseError,
    /// The caller went away; in-flight work was abandoned cooperatively.
    Canceled,
    /// The request-wide budget elapsed before a result could be assembled.
    DeadlineExceeded,
    /// Fewer than `min_success` providers produced a usable reply.
    ConsensusFailed,
    /// The process-wide inflight cap was reached.
    Overloaded,
    /// Anything unexpected.
    Internal,
}

impl ErrorKind {
    /// Wire identifier used in the error envelope and analytics rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ProviderTimeout => "provider_timeout",
            ErrorKind::ProviderHttpError => "provider_http_error",
            ErrorKind::ProviderParseError => "provider_parse_error",
            ErrorKind::Canceled => "canceled",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::ConsensusFailed => "consensus_failed",
            ErrorKind::Overloaded => "overloaded",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "invalid_request" => ErrorKind::InvalidRequest,
            "unauthorized" => ErrorKind::Unauthorized,
            "forbidden" => ErrorKind::Forbidden,
            "rate_limited" => ErrorKind::RateLimited,
            "provider_timeout" => ErrorKind::ProviderTimeout,
            "provider_http_error" => ErrorKind::ProviderHttpError,
            "provider_parse_error" => ErrorKind::ProviderParseError,
            "canceled" => ErrorKind::Canceled,
            "deadline_exceeded" => ErrorKind::DeadlineExceeded,
            "consensus_failed" => ErrorKind::ConsensusFailed,
            "overloaded" => ErrorKind::Overloaded,
            "internal_error" => ErrorKind::Internal,
            other => return Err(format!("unknown error kind: {other}")),
        })
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_identifiers_roundtrip() {
        let kinds = [
            ErrorKind::InvalidRequest,
            ErrorKind::Unauthorized,
            ErrorKind::Forbidden,
            ErrorKind::RateLimited,
            ErrorKind::ProviderTimeout,
            ErrorKind::ProviderHttpError,
            ErrorKind::ProviderParseError,
            ErrorKind::Canceled,
            ErrorKind::DeadlineExceeded,
            ErrorKind::ConsensusFailed,
            ErrorKind::Overloaded,
            ErrorKind::Internal,
        ];
        for kind in kinds {
            let parsed: ErrorKind = kind.as_str().parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&ErrorKind::ConsensusFailed).unwrap();
        assert_eq!(json, "\"consensus_failed\"");
    }

    #[test]
    fn internal_uses_internal_error_identifier() {
        assert_eq!(ErrorKind::Internal.as_str(), "internal_error");
    }
}
