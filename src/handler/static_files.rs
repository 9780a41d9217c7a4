//! Landing page
//!
//! Serves `<public_dir>/index.html` when the operator provides one, and a
//! built-in page with both ingestion forms otherwise.

use std::path::Path;
use tokio::fs;

use crate::handler::router::RequestContext;
use crate::http::{self, RelayBody};
use hyper::Response;

const INDEX_FILE: &str = "index.html";

pub async fn serve_landing_page(ctx: &RequestContext<'_>, public_dir: &Path) -> Response<RelayBody> {
    let page = match fs::read(public_dir.join(INDEX_FILE)).await {
        Ok(content) => content,
        Err(_) => get_default_landing_page().into_bytes(),
    };
    http::build_html_response(page, ctx.is_head)
}

/// Built-in landing page
pub fn get_default_landing_page() -> String {
    String::from(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Short link relay</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Arial, sans-serif;
            max-width: 640px;
            margin: 60px auto;
            padding: 0 20px;
            line-height: 1.6;
        }
        form {
            margin: 24px 0;
            padding: 16px;
            border: 1px solid #ddd;
            border-radius: 8px;
        }
        input[type=url] { width: 70%; }
        pre { background: #f4f4f4; padding: 12px; border-radius: 6px; }
    </style>
</head>
<body>
    <h1>Short link relay</h1>
    <p>Store a file and get a short streaming link back.</p>

    <form action="/uploadfile" method="post" enctype="multipart/form-data">
        <h3>Upload a file</h3>
        <input type="file" name="file" required>
        <button type="submit">Upload</button>
    </form>

    <form action="/upload" method="get">
        <h3>Fetch from a URL</h3>
        <input type="url" name="url" placeholder="https://example.com/video.mp4" required>
        <button type="submit">Fetch</button>
    </form>

    <pre>{"status":"success","short":"AbCd","stream":"http://host/mahabub/AbCd.mp4"}</pre>
</body>
</html>"#,
    )
}
