//! The gateway response shape.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::UploadError;

/// Response envelope handed back to the gateway.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Response {
    #[serde(rename = "isBase64Encoded")]
    pub is_base64_encoded: bool,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    /// JSON-encoded body.
    pub body: String,
}

fn cors_headers() -> BTreeMap<String, String> {
    BTreeMap::from([("Access-Control-Allow-Origin".to_string(), "*".to_string())])
}

impl Response {
    /// A response with a JSON body.
    pub fn json(status_code: u16, body: &impl Serialize) -> Self {
        let body = match serde_json::to_string(body) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response body");
                return Response::message(500, "Internal server error");
            }
        };
        Response {
            is_base64_encoded: false,
            status_code,
            headers: cors_headers(),
            body,
        }
    }

    /// A `{"message": ...}` response.
    pub fn message(status_code: u16, message: &str) -> Self {
        Response {
            is_base64_encoded: false,
            status_code,
            headers: cors_headers(),
            body: serde_json::json!({ "message": message }).to_string(),
        }
    }
}

impl From<UploadError> for Response {
    fn from(err: UploadError) -> Self {
        Response::message(err.status(), &err.public_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_shape() {
        let response = Response::message(123, "lol");
        assert!(!response.is_base64_encoded);
        assert_eq!(response.status_code, 123);
        assert_eq!(
            response.headers.get("Access-Control-Allow-Origin"),
            Some(&"*".to_string())
        );
        assert_eq!(response.body, r#"{"message":"lol"}"#);
    }

    #[test]
    fn upload_error_maps_to_response() {
        let response: Response = UploadError::DatasetNotFound("ds1".into()).into();
        assert_eq!(response.status_code, 404);
        assert_eq!(response.body, r#"{"message":"Dataset ds1 does not exist"}"#);
    }
}
