use http::{header, HeaderMap};
use pingora::protocols::http::ServerSession;

use crate::{
    compile::CompileRequest,
    core::error::{CompileError, CompileResult},
    request_error,
};

/// Declared body length. A request without a usable `Content-Length` is rejected.
pub fn content_length(headers: &HeaderMap) -> CompileResult<usize> {
    let value = headers
        .get(header::CONTENT_LENGTH)
        .ok_or_else(|| request_error!("missing Content-Length header"))?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .ok_or_else(|| request_error!("invalid Content-Length header: {:?}", value))
}

/// Rejects a body of `len` bytes when it is over `limit`.
pub fn check_body_len(len: usize, limit: usize) -> CompileResult<()> {
    if len > limit {
        return Err(request_error!("request body exceeds {limit} bytes"));
    }
    Ok(())
}

/// Appends one body chunk, keeping the running total within `limit`.
pub fn append_chunk(body: &mut Vec<u8>, chunk: &[u8], limit: usize) -> CompileResult<()> {
    check_body_len(body.len().saturating_add(chunk.len()), limit)?;
    body.extend_from_slice(chunk);
    Ok(())
}

/// Reads the whole request body, refusing anything larger than `limit` bytes.
///
/// The declared `Content-Length` is checked up front and the bytes actually
/// received are checked as they arrive.
pub async fn read_request_body(
    http_session: &mut ServerSession,
    limit: usize,
) -> CompileResult<Vec<u8>> {
    let declared = content_length(&http_session.req_header().headers)?;
    check_body_len(declared, limit)?;

    let mut body_data = Vec::with_capacity(declared);
    while let Some(bytes) = http_session
        .read_request_body()
        .await
        .map_err(|e| request_error!("failed to read request body: {e}"))?
    {
        append_chunk(&mut body_data, &bytes, limit)?;
    }
    Ok(body_data)
}

/// Decodes a `/compile` body.
///
/// Syntax errors map to [`CompileError::InvalidJson`]; anything else that is
/// not an object with string `code`/`action` fields is a request error.
pub fn decode_compile_request(body: &[u8]) -> CompileResult<CompileRequest> {
    let text = std::str::from_utf8(body)
        .map_err(|e| request_error!("request body is not valid UTF-8: {e}"))?;

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(CompileError::InvalidJson)?;
    if !value.is_object() {
        return Err(request_error!("request body must be a JSON object"));
    }

    serde_json::from_value(value).map_err(|e| request_error!("invalid compile request: {e}"))
}
