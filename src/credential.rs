//! Local decoding of the connect credential.
//!
//! The credential is a short-lived JWT issued by the authentication service.
//! Only its `sub` claim is read, locally and without signature verification,
//! so the client knows its own player id before the first `STATE` frame
//! arrives. The relay is the party that verifies the token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::Deserialize;

use crate::error::{Result, RoomSyncError};
use crate::protocol::PlayerId;

#[derive(Deserialize)]
struct Claims {
    sub: Option<String>,
}

/// Extract the subject claim from a JWT-shaped credential.
///
/// # Errors
///
/// Returns [`RoomSyncError::InvalidCredential`] if the token does not have
/// three dot-separated segments, the payload is not base64url JSON, or the
/// `sub` claim is missing or empty.
pub fn subject(credential: &str) -> Result<PlayerId> {
    let mut segments = credential.trim().split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_header), Some(payload), Some(_signature), None) => payload,
        _ => {
            return Err(RoomSyncError::InvalidCredential(
                "expected three dot-separated segments".into(),
            ))
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| RoomSyncError::InvalidCredential(format!("payload is not base64url: {e}")))?;

    let claims: Claims = serde_json::from_slice(&bytes)
        .map_err(|e| RoomSyncError::InvalidCredential(format!("payload is not JSON: {e}")))?;

    match claims.sub {
        Some(sub) if !sub.trim().is_empty() => Ok(sub),
        _ => Err(RoomSyncError::InvalidCredential(
            "missing subject claim".into(),
        )),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn token(payload: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload);
        format!("{header}.{body}.c2lnbmF0dXJl")
    }

    #[test]
    fn reads_subject_claim() {
        let id = subject(&token(r#"{"sub":"user_2abc","exp":1700000000}"#)).unwrap();
        assert_eq!(id, "user_2abc");
    }

    #[test]
    fn tolerates_padded_payload() {
        let header = URL_SAFE_NO_PAD.encode("{}");
        let body = base64::engine::general_purpose::URL_SAFE.encode(r#"{"sub":"p1"}"#);
        let id = subject(&format!("{header}.{body}.sig")).unwrap();
        assert_eq!(id, "p1");
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(matches!(
            subject("abc.def"),
            Err(RoomSyncError::InvalidCredential(_))
        ));
        assert!(matches!(
            subject("a.b.c.d"),
            Err(RoomSyncError::InvalidCredential(_))
        ));
    }

    #[test]
    fn rejects_non_json_payload() {
        let body = URL_SAFE_NO_PAD.encode("not json");
        assert!(matches!(
            subject(&format!("h.{body}.s")),
            Err(RoomSyncError::InvalidCredential(_))
        ));
    }

    #[test]
    fn rejects_missing_or_blank_subject() {
        assert!(subject(&token(r#"{"exp":1}"#)).is_err());
        assert!(subject(&token(r#"{"sub":"  "}"#)).is_err());
    }
}
