use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Which signal source observed an expiry episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum ExpirySource {
    /// A swallowed expiry alert.
    #[display("alert")]
    Alert,
    /// An inspected XHR-style exchange.
    #[display("xhr")]
    Xhr,
    /// An inspected fetch-style exchange.
    #[display("fetch")]
    Fetch,
    /// The post-load DOM scan.
    #[display("dom")]
    Dom,
}

/// Login credentials, read-only to this crate; the external configuration
/// store owns them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Manual Debug: the password must not leak into logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A request captured at the moment its response showed an expired session:
/// method, URL, and body exactly as the page sent them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub url: String,
    pub method: String,
    pub body: Option<String>,
}

impl CapturedRequest {
    #[must_use]
    pub fn new(url: impl Into<String>, method: impl Into<String>, body: Option<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            body,
        }
    }
}

/// Expiry notification, interception layer / DOM detector → state machine.
///
/// Wire shape: `{ "type": "SESSION_EXPIRED", "source": ..., "requestData": ... }`.
/// `request_data` stays untyped JSON at this boundary: a malformed payload
/// (the page once managed to send a bare `true`) must survive transport so
/// the state machine can reject it by validation instead of the channel
/// silently dropping the whole notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename = "SESSION_EXPIRED", rename_all = "camelCase")]
pub struct ExpiryNotice {
    pub source: ExpirySource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_data: Option<serde_json::Value>,
}

impl ExpiryNotice {
    /// A notice with no captured request context.
    #[must_use]
    pub fn bare(source: ExpirySource) -> Self {
        Self {
            source,
            request_data: None,
        }
    }

    /// A notice carrying the captured request that triggered the episode.
    #[must_use]
    pub fn with_request(source: ExpirySource, request: &CapturedRequest) -> Self {
        Self {
            source,
            request_data: serde_json::to_value(request).ok(),
        }
    }
}

/// The persisted method/url/body of the request that triggered an expiry
/// episode, to be reissued after reauthentication.
///
/// Well-formed by construction: holding a `ReplayDescriptor` proves `url` is
/// non-empty. Any other shape (including a bare boolean) is rejected at the
/// boundary rather than persisted, because a corrupt descriptor breaks the
/// replay step after reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub struct ReplayDescriptor {
    url: String,
    method: String,
    body: Option<String>,
}

impl ReplayDescriptor {
    /// # Errors
    ///
    /// Returns [`Error::InvalidReplay`] if `url` is empty.
    pub fn new(
        url: impl Into<String>,
        method: impl Into<String>,
        body: Option<String>,
    ) -> Result<Self, Error> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(Error::InvalidReplay("empty url".into()));
        }
        let method = method.into();
        Ok(Self {
            // The legacy client submits queries as POST; a missing method
            // means the capture came from that path.
            method: if method.is_empty() {
                "POST".into()
            } else {
                method
            },
            url,
            body,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

impl TryFrom<serde_json::Value> for ReplayDescriptor {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let serde_json::Value::Object(map) = value else {
            return Err(Error::InvalidReplay(format!("not an object: {value}")));
        };
        let url = map
            .get("url")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let method = map
            .get("method")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let body = map
            .get("body")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        Self::new(url, method, body)
    }
}

impl From<ReplayDescriptor> for CapturedRequest {
    fn from(descriptor: ReplayDescriptor) -> Self {
        Self {
            url: descriptor.url,
            method: descriptor.method,
            body: descriptor.body,
        }
    }
}

/// Replay command, state machine → interception layer.
///
/// Wire shape: `{ "type": "DO_REPLAY", "payload": ... }`. The payload is a
/// validated [`ReplayDescriptor`], so a command that deserialized at all
/// already satisfies the replay invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename = "DO_REPLAY")]
pub struct ReplayCommand {
    pub payload: ReplayDescriptor,
}

impl ReplayCommand {
    #[must_use]
    pub fn new(payload: ReplayDescriptor) -> Self {
        Self { payload }
    }
}

/// Result of one reauthentication attempt. Transient: consumed synchronously
/// by the requester, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub success: bool,
    pub message: String,
}

impl SessionOutcome {
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
