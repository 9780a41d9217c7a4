//! HTTP response building module
//!
//! Every response shares one boxed body type so that JSON replies and
//! streamed files can come out of the same handler.

use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, ALLOW, CONTENT_LENGTH, CONTENT_TYPE, SERVER,
};
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use tokio_util::io::ReaderStream;

use crate::error::RelayError;
use crate::relay::ResolvedFile;

/// Response body used throughout the server
pub type RelayBody = http_body_util::combinators::UnsyncBoxBody<Bytes, std::io::Error>;

pub const ALLOWED_METHODS: &str = "GET, HEAD, POST, OPTIONS";

/// In-memory body
pub fn full(data: impl Into<Bytes>) -> RelayBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn empty() -> RelayBody {
    full(Bytes::new())
}

/// Build JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<RelayBody> {
    match serde_json::to_vec(body) {
        Ok(json) => build(status, "application/json; charset=utf-8", json),
        Err(e) => {
            log_build_error("JSON", &e);
            build(
                StatusCode::INTERNAL_SERVER_ERROR,
                "application/json; charset=utf-8",
                r#"{"error":"Internal server error"}"#,
            )
        }
    }
}

/// `{"error": message}` with the status the error maps to
pub fn error_response(err: &RelayError) -> Response<RelayBody> {
    json_response(err.status_code(), &json!({ "error": err.to_string() }))
}

/// 404 for paths that match no route
pub fn build_404_response() -> Response<RelayBody> {
    json_response(StatusCode::NOT_FOUND, &json!({ "error": "Not Found" }))
}

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<RelayBody> {
    let mut resp = json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &json!({ "error": "Method Not Allowed" }),
    );
    resp.headers_mut()
        .insert(ALLOW, hyper::header::HeaderValue::from_static(ALLOWED_METHODS));
    resp
}

/// Build 413 Payload Too Large response
pub fn build_413_response() -> Response<RelayBody> {
    json_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        &json!({ "error": "Payload Too Large" }),
    )
}

/// Build OPTIONS response (preflight request)
pub fn build_options_response(enable_cors: bool) -> Response<RelayBody> {
    let mut builder = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(ALLOW, ALLOWED_METHODS);

    if enable_cors {
        builder = builder
            .header(ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS)
            .header(ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type")
            .header(ACCESS_CONTROL_MAX_AGE, "86400");
    }

    builder.body(empty()).unwrap_or_else(|e| {
        log_build_error("OPTIONS", &e);
        Response::new(empty())
    })
}

pub fn build_health_response() -> Response<RelayBody> {
    build(StatusCode::OK, "text/plain", "ok")
}

/// Build generic HTML response
pub fn build_html_response(content: impl Into<Bytes>, is_head: bool) -> Response<RelayBody> {
    let content = content.into();
    let content_length = content.len();
    let body = if is_head { empty() } else { full(content) };

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .header(CONTENT_LENGTH, content_length)
        .body(body)
        .unwrap_or_else(|e| {
            log_build_error("HTML", &e);
            Response::new(empty())
        })
}

/// Stream a resolved file as the whole response body
pub fn build_file_response(resolved: ResolvedFile, is_head: bool) -> Response<RelayBody> {
    let content_type = mime_guess::from_path(&resolved.stored_name).first_or_octet_stream();
    let body = if is_head {
        empty()
    } else {
        StreamBody::new(ReaderStream::new(resolved.file).map_ok(Frame::data)).boxed_unsync()
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type.as_ref())
        .header(CONTENT_LENGTH, resolved.len)
        .body(body)
        .unwrap_or_else(|e| {
            log_build_error("file", &e);
            Response::new(empty())
        })
}

/// Stamp headers shared by every response
pub fn finalize(resp: &mut Response<RelayBody>, server_name: &str, enable_cors: bool) {
    let headers = resp.headers_mut();
    if let Ok(value) = server_name.parse() {
        headers.insert(SERVER, value);
    }
    if enable_cors {
        headers.insert(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            hyper::header::HeaderValue::from_static("*"),
        );
    }
}

fn build(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<RelayBody> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .body(full(body))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            Response::new(empty())
        })
}

/// Log response build error
fn log_build_error(what: &str, error: &impl std::fmt::Display) {
    crate::logger::log_error(&format!("Failed to build {what} response: {error}"));
}
