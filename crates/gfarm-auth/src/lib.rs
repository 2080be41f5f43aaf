//! Credential resolution for the Gfarm HTTP gateway
//!
//! This crate provides:
//! - Parsing of `Authorization` header values into a normalized [`Identity`]
//! - Basic credential decoding (base64 `user:password`, first-colon split)
//! - Unverified JWT subject extraction for bearer tokens
//!
//! Resolution is a pure function of the header value. Whether an anonymous
//! identity is acceptable is a policy question that belongs to the caller,
//! not to this crate.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use thiserror::Error;

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    /// Header present but not parsable into a supported credential
    #[error("malformed credential: {0}")]
    MalformedCredential(String),
}

/// Result type for credential resolution
pub type Result<T> = std::result::Result<T, AuthError>;

/// Caller identity derived from an `Authorization` header.
///
/// This is a closed set: supporting a new scheme means adding a variant,
/// which makes every match site a compile-time-visible change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// No credentials presented
    Anonymous,
    /// `Basic` scheme credentials
    Basic {
        /// Username (text before the first `:` of the decoded pair)
        username: String,
        /// Password (may itself contain `:`)
        password: String,
    },
    /// `Bearer` scheme access token, used verbatim
    Bearer {
        /// Raw token text
        token: String,
    },
}

impl Identity {
    /// True when no credentials were presented
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }
}

/// Parse a raw `Authorization` header value into an [`Identity`].
///
/// A missing or empty header resolves to [`Identity::Anonymous`]. A
/// non-empty header must consist of a scheme token and a credential token
/// separated by whitespace; anything else fails with
/// [`AuthError::MalformedCredential`] before any external work happens.
pub fn parse_authorization(header: Option<&str>) -> Result<Identity> {
    let raw = match header {
        None => return Ok(Identity::Anonymous),
        Some(raw) if raw.is_empty() => return Ok(Identity::Anonymous),
        Some(raw) => raw,
    };

    let mut tokens = raw.split_whitespace();
    let (scheme, credential) = match (tokens.next(), tokens.next()) {
        (Some(scheme), Some(credential)) => (scheme, credential),
        _ => {
            return Err(AuthError::MalformedCredential(
                "expected '<scheme> <credential>'".to_string(),
            ))
        }
    };

    match scheme {
        "Basic" => {
            let decoded = STANDARD.decode(credential).map_err(|_| {
                AuthError::MalformedCredential("invalid base64 in Basic credential".to_string())
            })?;
            let pair = String::from_utf8(decoded).map_err(|_| {
                AuthError::MalformedCredential("Basic credential is not UTF-8".to_string())
            })?;
            // Only the first ':' separates user from password; the password
            // may contain further ':' characters.
            let (username, password) = pair.split_once(':').ok_or_else(|| {
                AuthError::MalformedCredential("missing ':' in Basic credential".to_string())
            })?;
            Ok(Identity::Basic {
                username: username.to_string(),
                password: password.to_string(),
            })
        }
        "Bearer" => Ok(Identity::Bearer {
            token: credential.to_string(),
        }),
        other => Err(AuthError::MalformedCredential(format!(
            "unsupported scheme '{other}'"
        ))),
    }
}

/// Extract the unverified `sub` claim from a JWT access token.
///
/// Returns `None` for opaque tokens or tokens whose payload segment does not
/// decode to a JSON object with a string `sub`. Signature verification is
/// the external toolset's concern; the gateway only parameterizes it.
pub fn bearer_subject(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("sub")?.as_str().map(str::to_owned)
}
