//! Request routing dispatch module
//!
//! Entry point for HTTP request processing, responsible for method
//! validation, route matching, and dispatching to the relay.

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response, StatusCode};
use multer::Multipart;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::AppState;
use crate::error::RelayError;
use crate::handler::static_files;
use crate::http::{self, response, RelayBody};
use crate::logger::{self, RequestLine};
use crate::relay::ingest::NO_FILE_UPLOADED;
use crate::relay::Ingested;

const HEALTH_PATH: &str = "/healthz";
const REMOTE_INGEST_PATH: &str = "/upload";
const UPLOAD_INGEST_PATH: &str = "/uploadfile";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Request context encapsulating information needed for request processing
pub struct RequestContext<'a> {
    pub path: &'a str,
    pub is_head: bool,
}

/// Successful ingestion reply
#[derive(Debug, Serialize)]
struct IngestReply<'a> {
    status: &'static str,
    short: &'a str,
    stream: String,
}

/// Main entry point for HTTP request handling
///
/// Request-level failures become `{"error": ...}` responses. A corrupted
/// mapping store is returned as `Err`, which makes the connection drop the
/// request without a response.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: Option<SocketAddr>,
) -> Result<Response<RelayBody>, RelayError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let access_line = state.config.logging.access_log.then(|| {
        RequestLine::capture(peer_addr, req.method(), req.uri(), req.version(), req.headers())
    });

    let (parts, body) = req.into_parts();
    let mut resp = match dispatch(&parts, body, &state).await {
        Ok(resp) => resp,
        Err(err) if err.is_fatal() => {
            logger::log_error(&format!("Aborting {} {}: {err}", parts.method, parts.uri.path()));
            return Err(err);
        }
        Err(err) => {
            logger::log_request_failed(parts.uri.path(), &err.to_string());
            http::error_response(&err)
        }
    };

    response::finalize(
        &mut resp,
        &state.config.http.server_name,
        state.config.http.enable_cors,
    );

    if let Some(line) = access_line {
        let body_bytes = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let entry = line.finish(resp.status().as_u16(), body_bytes);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(resp)
}

async fn dispatch<B>(
    parts: &Parts,
    body: B,
    state: &Arc<AppState>,
) -> Result<Response<RelayBody>, RelayError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    // 1. Check HTTP method
    if let Some(resp) = check_http_method(&parts.method, state.config.http.enable_cors) {
        return Ok(resp);
    }

    // 2. Check body size
    if let Some(resp) = check_body_size(parts, state.config.http.max_body_size) {
        return Ok(resp);
    }

    let path = parts.uri.path();
    let ctx = RequestContext {
        path,
        is_head: parts.method == Method::HEAD,
    };
    let is_read = matches!(parts.method, Method::GET | Method::HEAD);

    // 3. Route
    match (&parts.method, path) {
        (_, "/") if is_read => {
            Ok(static_files::serve_landing_page(&ctx, &state.config.storage.public_dir).await)
        }
        (_, HEALTH_PATH) if is_read => Ok(http::build_health_response()),
        (&Method::GET, REMOTE_INGEST_PATH) => {
            let url = query_param(parts, "url");
            let ingested = state.relay.ingest_remote(url.as_deref()).await?;
            Ok(ingest_reply(parts, state, &ingested))
        }
        (&Method::POST, UPLOAD_INGEST_PATH) => {
            let multipart = multipart_body(parts, body)?;
            let ingested = state.relay.ingest_upload(multipart).await?;
            Ok(ingest_reply(parts, state, &ingested))
        }
        _ if is_read => match link_segment(path, &state.config.link.prefix) {
            Some(segment) => serve_short_link(&ctx, segment, state).await,
            None => Ok(http::build_404_response()),
        },
        _ => Ok(http::build_404_response()),
    }
}

async fn serve_short_link(
    ctx: &RequestContext<'_>,
    segment: &str,
    state: &Arc<AppState>,
) -> Result<Response<RelayBody>, RelayError> {
    match state.relay.resolve(segment).await {
        Ok(resolved) => {
            logger::log_served(&resolved.token, &resolved.stored_name, resolved.len);
            Ok(http::build_file_response(resolved, ctx.is_head))
        }
        Err(RelayError::NotFound(reason)) => {
            logger::log_resolve_miss(segment, reason);
            Err(RelayError::NotFound(reason))
        }
        Err(err) => Err(err),
    }
}

/// Check HTTP method and answer preflight or disallowed methods directly
fn check_http_method(method: &Method, enable_cors: bool) -> Option<Response<RelayBody>> {
    match *method {
        Method::GET | Method::HEAD | Method::POST => None,
        Method::OPTIONS => Some(http::build_options_response(enable_cors)),
        _ => {
            logger::log_warning(&format!("Method not allowed: {method}"));
            Some(http::build_405_response())
        }
    }
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size(parts: &Parts, max_body_size: u64) -> Option<Response<RelayBody>> {
    let size = parts
        .headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()?;
    if size > max_body_size {
        logger::log_warning(&format!(
            "Request body too large: {size} bytes (max: {max_body_size})"
        ));
        return Some(http::build_413_response());
    }
    None
}

fn query_param(parts: &Parts, name: &str) -> Option<String> {
    let query = parts.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// A request that is not `multipart/form-data` carries no file
fn multipart_body<B>(parts: &Parts, body: B) -> Result<Multipart<'static>, RelayError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let boundary = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| multer::parse_boundary(ct).ok())
        .ok_or_else(|| RelayError::validation(NO_FILE_UPLOADED))?;
    Ok(Multipart::new(body.into_data_stream(), boundary))
}

/// `<token>.<ext>` from `/<prefix>/<token>.<ext>`
fn link_segment<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path
        .strip_prefix('/')?
        .strip_prefix(prefix.trim_matches('/'))?
        .strip_prefix('/')?;
    (!rest.is_empty() && !rest.contains('/')).then_some(rest)
}

fn ingest_reply(parts: &Parts, state: &AppState, ingested: &Ingested) -> Response<RelayBody> {
    let reply = IngestReply {
        status: "success",
        short: &ingested.token,
        stream: short_link(parts, state, &ingested.token),
    };
    http::json_response(StatusCode::OK, &reply)
}

/// `{scheme}://{host}/{prefix}/{token}.{ext}` as seen by the client
fn short_link(parts: &Parts, state: &AppState, token: &str) -> String {
    let scheme = parts
        .headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map_or("http", str::trim);
    let host = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
        .or_else(|| parts.uri.authority().map(ToString::to_string))
        .unwrap_or_else(|| {
            format!("{}:{}", state.config.server.host, state.config.server.port)
        });
    let link = &state.config.link;
    format!(
        "{scheme}://{host}/{}/{token}.{}",
        link.prefix.trim_matches('/'),
        link.extension
    )
}
