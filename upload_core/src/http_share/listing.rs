//! Browsable view of the upload folder
//!
//! Directories get an index (HTML, plain text or JSON depending on the
//! `Accept` header); files are handed to tower-http's `ServeFile`, which
//! takes care of content type, conditional and range requests.

use super::landing::escape_html;
use super::server::ShareState;
use crate::error::{PathRejection, RequestError};
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{Html, IntoResponse, Response};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::SystemTime;
use tower::ServiceExt;
use tower_http::services::ServeFile;

/// One row of a directory index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
    /// Size in bytes, files only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// HTTP date of the last modification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

/// Representation chosen from the `Accept` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingFormat {
    Html,
    Text,
    Json,
}

impl ListingFormat {
    /// Pick the best supported format; HTML wins ties and wildcards
    pub fn negotiate(headers: &HeaderMap) -> Self {
        let Some(accept) = headers
            .get(header::ACCEPT)
            .and_then(|value| value.to_str().ok())
        else {
            return ListingFormat::Html;
        };

        let mut best: Option<(f32, usize, ListingFormat)> = None;
        for item in accept.split(',') {
            let mut parts = item.split(';');
            let media = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
            let quality = parts
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            if quality <= 0.0 {
                continue;
            }

            let candidates: &[ListingFormat] = match media.as_str() {
                "text/html" | "application/xhtml+xml" => &[ListingFormat::Html],
                "text/plain" => &[ListingFormat::Text],
                "application/json" => &[ListingFormat::Json],
                "text/*" | "*/*" => &[ListingFormat::Html],
                _ => &[],
            };
            for &format in candidates {
                let rank = format.preference();
                let better = match best {
                    None => true,
                    Some((q, r, _)) => quality > q || (quality == q && rank < r),
                };
                if better {
                    best = Some((quality, rank, format));
                }
            }
        }

        best.map(|(_, _, format)| format).unwrap_or(ListingFormat::Html)
    }

    fn preference(self) -> usize {
        match self {
            ListingFormat::Html => 0,
            ListingFormat::Text => 1,
            ListingFormat::Json => 2,
        }
    }
}

/// Read a directory, skipping hidden entries. Directories come first.
pub async fn read_listing(dir: &std::path::Path) -> std::io::Result<Vec<ListingEntry>> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        // Entries can vanish between read_dir and metadata
        let Ok(metadata) = tokio::fs::metadata(entry.path()).await else {
            continue;
        };

        let is_dir = metadata.is_dir();
        entries.push(ListingEntry {
            name,
            is_dir,
            size: (!is_dir).then(|| metadata.len()),
            modified: metadata.modified().ok().map(format_time),
        });
    }

    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    });
    Ok(entries)
}

fn format_time(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

/// Handler for `GET /<folder>` and `GET /<folder>/`
pub async fn browse_root_handler(State(state): State<Arc<ShareState>>, req: Request) -> Response {
    browse(&state, "", req).await
}

/// Handler for `GET /<folder>/<path..>`
pub async fn browse_handler(
    State(state): State<Arc<ShareState>>,
    Path(rel_path): Path<String>,
    req: Request,
) -> Response {
    browse(&state, &rel_path, req).await
}

async fn browse(state: &ShareState, rel_path: &str, req: Request) -> Response {
    match serve_path(state, rel_path, req).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn serve_path(
    state: &ShareState,
    rel_path: &str,
    req: Request,
) -> Result<Response, RequestError> {
    let rejected = |reason| RequestError::PathRejected {
        name: rel_path.to_string(),
        reason,
    };

    let target = state
        .root
        .resolve_request(rel_path)
        .map_err(rejected)?
        .ok_or(RequestError::NotFound)?;

    let metadata = match tokio::fs::metadata(&target).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(RequestError::NotFound),
        Err(e) => return Err(e.into()),
    };

    // Symlinks inside the folder may still point elsewhere
    if !state.root.contains_canonical(&target).await? {
        return Err(rejected(PathRejection::OutsideRoot));
    }

    if !metadata.is_dir() {
        return Ok(serve_file(&target, req).await);
    }

    let entries = read_listing(&target).await?;
    let segments: Vec<&str> = rel_path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    let response = match ListingFormat::negotiate(req.headers()) {
        ListingFormat::Html => {
            Html(render_html(&state.route_name, &segments, &entries)).into_response()
        }
        ListingFormat::Text => (
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )],
            render_text(&entries),
        )
            .into_response(),
        ListingFormat::Json => axum::Json(entries).into_response(),
    };
    Ok(response)
}

async fn serve_file(path: &std::path::Path, req: Request) -> Response {
    match ServeFile::new(path).oneshot(req).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

fn render_text(entries: &[ListingEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            if e.is_dir {
                format!("{}/\n", e.name)
            } else {
                format!("{}\n", e.name)
            }
        })
        .collect()
}

fn encode_href(route_name: &str, segments: &[&str], name: Option<&str>) -> String {
    let mut href = format!("/{}", urlencoding::encode(route_name));
    for segment in segments.iter().copied().chain(name) {
        href.push('/');
        href.push_str(&urlencoding::encode(segment));
    }
    href
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for u in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = u;
    }
    format!("{:.1} {}", value, unit)
}

/// HTML index page for one directory
pub fn render_html(route_name: &str, segments: &[&str], entries: &[ListingEntry]) -> String {
    let mut title = format!("/{}", route_name);
    for segment in segments {
        title.push('/');
        title.push_str(segment);
    }
    let title = escape_html(&title);

    let mut rows = String::new();
    if let Some((_, parent)) = segments.split_last() {
        rows.push_str(&format!(
            "<tr><td><a href=\"{}\">..</a></td><td></td><td></td></tr>\n",
            escape_html(&encode_href(route_name, parent, None))
        ));
    }
    for entry in entries {
        let href = encode_href(route_name, segments, Some(&entry.name));
        let (label, size) = if entry.is_dir {
            (format!("{}/", entry.name), "-".to_string())
        } else {
            (entry.name.clone(), format_size(entry.size.unwrap_or(0)))
        };
        rows.push_str(&format!(
            "<tr><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&href),
            escape_html(&label),
            size,
            escape_html(entry.modified.as_deref().unwrap_or("")),
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Index of {title}</title>
<style>
body {{ font-family: system-ui, sans-serif; margin: 2rem; color: #222; }}
table {{ border-collapse: collapse; }}
td {{ padding: 0.25rem 1.25rem 0.25rem 0; }}
td:nth-child(2) {{ text-align: right; }}
</style>
</head>
<body>
<h1>Index of {title}</h1>
<table>
{rows}</table>
<p><a href="/">Upload more files</a></p>
</body>
</html>
"#
    )
}
