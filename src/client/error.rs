//! Remote client failures.

use http::{HeaderMap, StatusCode};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Azure error code for a create on an existing path.
pub const RESOURCE_ALREADY_EXISTS: &str = "ResourceAlreadyExists";

/// A failed call against the remote share.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The service answered with a non-success status.
    #[error("Azure {operation}: HTTP {status} {code} - {message}")]
    Service {
        operation: &'static str,
        status: StatusCode,
        /// `x-ms-error-code`, or the `<Code>` element of the error body.
        code: String,
        message: String,
    },

    /// The request never produced a response.
    #[error("Azure {operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The request could not be built or signed.
    #[error("Azure {operation} request invalid: {message}")]
    InvalidRequest {
        operation: &'static str,
        message: String,
    },
}

impl RemoteError {
    pub fn service(
        operation: &'static str,
        status: StatusCode,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        RemoteError::Service {
            operation,
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn invalid(operation: &'static str, message: impl Into<String>) -> Self {
        RemoteError::InvalidRequest {
            operation,
            message: message.into(),
        }
    }

    /// HTTP status of the failure, if the service answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RemoteError::Service { status, .. } => Some(*status),
            RemoteError::Transport { source, .. } => source.status(),
            RemoteError::InvalidRequest { .. } => None,
        }
    }

    /// Azure error code, if the service answered.
    pub fn code(&self) -> Option<&str> {
        match self {
            RemoteError::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Remote 404.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    /// Remote 409 because the path already exists.  A 409 for a directory
    /// that is still being deleted is not included.
    pub fn is_already_exists(&self) -> bool {
        self.status() == Some(StatusCode::CONFLICT) && self.code() == Some(RESOURCE_ALREADY_EXISTS)
    }
}

/// Build a [`RemoteError`] from a failed response.
///
/// HEAD responses carry no body, so the `x-ms-error-code` header is
/// preferred and the XML `<Error>` body is the fallback.
pub fn parse_error(
    operation: &'static str,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> RemoteError {
    let (body_code, message) = parse_error_body(body);
    let code = headers
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(body_code)
        .unwrap_or_default();

    RemoteError::service(operation, status, code, message.unwrap_or_default())
}

/// Extract `<Code>` and `<Message>` from an Azure error document.
fn parse_error_body(body: &str) -> (Option<String>, Option<String>) {
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut code = None;
    let mut message = None;
    let mut current: Option<Vec<u8>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => current = Some(e.name().as_ref().to_vec()),
            Ok(Event::Text(t)) => {
                let text = match t.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => continue,
                };
                match current.as_deref() {
                    Some(b"Code") => code = Some(text),
                    Some(b"Message") => message = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    (code, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_parse_error_body() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<Error>
  <Code>ParentNotFound</Code>
  <Message>The specified parent path does not exist.
RequestId:abc</Message>
</Error>"#;
        let err = parse_error("create_file", StatusCode::NOT_FOUND, &HeaderMap::new(), body);
        assert_eq!(err.code(), Some("ParentNotFound"));
        assert!(err.is_not_found());
        assert!(err.to_string().contains("The specified parent path does not exist."));
    }

    #[test]
    fn test_header_code_wins_for_head_requests() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ms-error-code", HeaderValue::from_static("ResourceNotFound"));
        let err = parse_error("get_file_properties", StatusCode::NOT_FOUND, &headers, "");
        assert_eq!(err.code(), Some("ResourceNotFound"));
    }

    #[test]
    fn test_already_exists_needs_code() {
        let exists = RemoteError::service(
            "create_directory",
            StatusCode::CONFLICT,
            RESOURCE_ALREADY_EXISTS,
            "",
        );
        assert!(exists.is_already_exists());

        let being_deleted = RemoteError::service(
            "create_directory",
            StatusCode::CONFLICT,
            "DeletePending",
            "",
        );
        assert!(!being_deleted.is_already_exists());
    }

    #[test]
    fn test_invalid_request_has_no_status() {
        let err = RemoteError::invalid("sign", "bad key");
        assert_eq!(err.status(), None);
        assert!(!err.is_not_found());
    }
}
