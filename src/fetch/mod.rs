//! Request lifecycle: transport, supersession, coalescing and caching.

use serde::Serialize;
use std::fmt;

mod coordinator;
pub mod retry;
pub mod transport;

pub use coordinator::{Begin, FetchCoordinator, Ticket};
pub use transport::{HttpTransport, MemoryTransport, Transport};

/// What went wrong, for display only. Callers branch on `FetchState`, never
/// on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Http,
    /// Connect failures and timeouts.
    Network,
    /// The request itself could not be sent (bad URL, redirect loop).
    Request,
    Decode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub status: Option<u16>,
    pub msg: String,
}

impl FetchError {
    pub fn http(status: u16) -> Self {
        Self {
            kind: FetchErrorKind::Http,
            status: Some(status),
            msg: format!("request failed with status {}", status),
        }
    }

    pub fn network(msg: &str) -> Self {
        Self { kind: FetchErrorKind::Network, status: None, msg: msg.to_string() }
    }

    pub fn request(msg: &str) -> Self {
        Self { kind: FetchErrorKind::Request, status: None, msg: msg.to_string() }
    }

    pub fn decode(msg: &str) -> Self {
        Self { kind: FetchErrorKind::Decode, status: None, msg: msg.to_string() }
    }

    /// Worth another attempt at the transport layer.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            FetchErrorKind::Http => self.status.map(retry::is_retryable_http_error).unwrap_or(false),
            FetchErrorKind::Network => true,
            FetchErrorKind::Request | FetchErrorKind::Decode => false,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetch failed: {}", self.msg)
    }
}

impl std::error::Error for FetchError {}

/// `Idle → Loading → Success | Failed`, back to `Loading` when the key changes.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchState<T> {
    Idle,
    Loading,
    Success(T),
    Failed(FetchError),
}

impl<T> FetchState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            FetchState::Success(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            FetchState::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Decode a successful payload; a decode error turns into `Failed`.
    pub fn and_then_decode<U, F>(self, decode: F) -> FetchState<U>
    where
        F: FnOnce(T) -> Result<U, FetchError>,
    {
        match self {
            FetchState::Idle => FetchState::Idle,
            FetchState::Loading => FetchState::Loading,
            FetchState::Success(v) => match decode(v) {
                Ok(u) => FetchState::Success(u),
                Err(e) => FetchState::Failed(e),
            },
            FetchState::Failed(e) => FetchState::Failed(e),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FetchState::Idle => "idle",
            FetchState::Loading => "loading",
            FetchState::Success(_) => "success",
            FetchState::Failed(_) => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_failure_becomes_failed() {
        let s: FetchState<i32> = FetchState::Success(3);
        let out: FetchState<u8> = s.and_then_decode(|_| Err(FetchError::decode("bad shape")));
        assert_eq!(out.error().unwrap().kind, FetchErrorKind::Decode);
    }

    #[test]
    fn test_decode_passes_through_other_states() {
        let s: FetchState<i32> = FetchState::Loading;
        assert!(s.and_then_decode(|v| Ok(v * 2)).is_loading());
        let s: FetchState<i32> = FetchState::Success(2);
        assert_eq!(s.and_then_decode(|v| Ok(v * 2)).data(), Some(&4));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::http(503).is_retryable());
        assert!(FetchError::http(429).is_retryable());
        assert!(!FetchError::http(404).is_retryable());
        assert!(FetchError::network("reset").is_retryable());
        assert!(!FetchError::decode("x").is_retryable());
    }

    #[test]
    fn test_display_is_generic() {
        assert_eq!(FetchError::http(500).to_string(), "fetch failed: request failed with status 500");
    }
}
