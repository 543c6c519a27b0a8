//! Response helpers shared by the compile and status services.
//!
//! Every response built here carries an explicit `Content-Length`. JSON
//! responses of the compile service also carry the CORS headers the browser
//! front-end relies on.

use http::{header, HeaderValue, Response, StatusCode};
use serde::Serialize;

/// Standard content types
pub mod content_type {
    pub const TEXT_PLAIN: &str = "text/plain";
    pub const TEXT_HTML: &str = "text/html";
    pub const TEXT_CSS: &str = "text/css";
    pub const APPLICATION_JAVASCRIPT: &str = "application/javascript";
    pub const APPLICATION_JSON: &str = "application/json";
}

/// Cross-origin policy: any origin may call the API.
pub mod cors {
    pub const ALLOW_ORIGIN: &str = "*";
    pub const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
    pub const ALLOW_HEADERS: &str = "Content-Type";
}

pub struct ResponseBuilder;

impl ResponseBuilder {
    /// Build a 200 response with an optional content type
    pub fn success_http(body: Vec<u8>, content_type: Option<&str>) -> Response<Vec<u8>> {
        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, body.len());

        if let Some(ct) = content_type {
            match HeaderValue::from_str(ct) {
                Ok(header_value) => {
                    builder = builder.header(header::CONTENT_TYPE, header_value);
                }
                Err(e) => {
                    log::error!("Invalid content type '{}': {}", ct, e);
                }
            }
        }

        builder.body(body).unwrap_or_else(|e| {
            log::error!("Failed to build success response: {}", e);
            Self::error_http(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        })
    }

    /// Build a plain-text error response
    pub fn error_http(status: StatusCode, message: &str) -> Response<Vec<u8>> {
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, content_type::TEXT_PLAIN)
            .header(header::CONTENT_LENGTH, message.len())
            .body(message.as_bytes().to_vec())
            .unwrap_or_else(|e| {
                log::error!("Failed to build error response: {}", e);
                let mut response = Response::new(b"Internal Server Error".to_vec());
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response
            })
    }

    /// Build a JSON response with the given status
    pub fn json<T: Serialize>(status: StatusCode, data: &T) -> Response<Vec<u8>> {
        let body = serde_json::to_vec(data).unwrap_or_else(|e| {
            log::error!("Failed to serialize JSON response: {e}");
            b"{}".to_vec()
        });

        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, content_type::APPLICATION_JSON)
            .header(header::CONTENT_LENGTH, body.len())
            .body(body)
            .unwrap_or_else(|e| {
                log::error!("Failed to build JSON response: {e}");
                Self::error_http(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            })
    }

    /// Build a 200 JSON response carrying the CORS headers
    pub fn cors_json<T: Serialize>(data: &T) -> Response<Vec<u8>> {
        let mut response = Self::json(StatusCode::OK, data);
        add_cors_headers(&mut response);
        response
    }

    /// Answer a CORS preflight: headers only, no body
    pub fn preflight() -> Response<Vec<u8>> {
        let mut response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, 0)
            .body(Vec::new())
            .unwrap_or_else(|e| {
                log::error!("Failed to build preflight response: {e}");
                Response::new(Vec::new())
            });
        add_cors_headers(&mut response);
        response
    }
}

fn add_cors_headers(response: &mut Response<Vec<u8>>) {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(cors::ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(cors::ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(cors::ALLOW_HEADERS),
    );
}

/// Common error response helpers
pub struct CommonErrors;

impl CommonErrors {
    pub fn not_found(message: &str) -> Response<Vec<u8>> {
        ResponseBuilder::error_http(StatusCode::NOT_FOUND, message)
    }

    pub fn method_not_allowed() -> Response<Vec<u8>> {
        ResponseBuilder::error_http(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    }

    pub fn internal_server_error(message: &str) -> Response<Vec<u8>> {
        ResponseBuilder::error_http(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}
