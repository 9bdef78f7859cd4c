//! Translation of license-server error responses into semantic errors.

use crate::error::{LicenseError, ServerError};
use serde::Deserialize;

/// Code synthesized when an error body is not in the server's error shape.
pub const UNKNOWN_CODE: &str = "UNKNOWN";

const EXPIRED_MESSAGE: &str = "license expired";

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Decodes a non-success response body into a [`ServerError`].
///
/// Bodies that are not `{"error": {"code": ..., "message": ...}}` become
/// code `UNKNOWN` with the raw body as the message.
#[must_use]
pub fn parse_error_response(status: u16, body: &[u8]) -> ServerError {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => ServerError {
            status,
            code: envelope.error.code,
            message: envelope.error.message,
        },
        Err(_) => ServerError {
            status,
            code: UNKNOWN_CODE.to_string(),
            message: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

/// Maps a server error to its semantic [`LicenseError`].
///
/// The original response stays attached and is reachable through
/// [`LicenseError::server_error`].
#[must_use]
pub fn map_server_error(err: ServerError) -> LicenseError {
    match err.code.as_str() {
        "NOT_FOUND" => LicenseError::NotFound(err),
        "FORBIDDEN" if err.message == EXPIRED_MESSAGE => LicenseError::Expired {
            server: Some(err),
            license: None,
        },
        "FORBIDDEN" => LicenseError::Inactive(err),
        "ACTIVATION_LIMIT" => LicenseError::ActivationLimit(err),
        _ => LicenseError::Server(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn server_error(status: u16, code: &str, message: &str) -> ServerError {
        ServerError {
            status,
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn mapping_table() {
        let cases = [
            (404, "NOT_FOUND", "no such key", ErrorKind::LicenseNotFound),
            (403, "FORBIDDEN", "license expired", ErrorKind::LicenseExpired),
            (403, "FORBIDDEN", "license suspended", ErrorKind::LicenseInactive),
            (409, "ACTIVATION_LIMIT", "no slots", ErrorKind::ActivationLimit),
            (500, "INTERNAL", "boom", ErrorKind::Server),
        ];
        for (status, code, message, kind) in cases {
            let err = map_server_error(server_error(status, code, message));
            assert_eq!(err.kind(), kind, "{code} / {message}");
            let se = err.server_error().expect("server error attached");
            assert_eq!(se.status, status);
            assert_eq!(se.code, code);
        }
    }

    #[test]
    fn expired_match_is_exact() {
        let err = map_server_error(server_error(403, "FORBIDDEN", "License Expired"));
        assert_eq!(err.kind(), ErrorKind::LicenseInactive);
    }

    #[test]
    fn parses_error_envelope() {
        let se = parse_error_response(
            404,
            br#"{"error":{"code":"NOT_FOUND","message":"license not found"}}"#,
        );
        assert_eq!(se, server_error(404, "NOT_FOUND", "license not found"));
    }

    #[test]
    fn unparseable_body_becomes_unknown() {
        let se = parse_error_response(502, b"<html>bad gateway</html>");
        assert_eq!(se, server_error(502, UNKNOWN_CODE, "<html>bad gateway</html>"));
    }

    #[test]
    fn json_without_error_field_becomes_unknown() {
        let se = parse_error_response(500, br#"{"detail":"oops"}"#);
        assert_eq!(se.code, UNKNOWN_CODE);
        assert_eq!(se.message, r#"{"detail":"oops"}"#);
    }
}
