//! Landing page with the upload form

use super::server::ShareState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use std::sync::Arc;

/// Static HTML content for the landing page
const INDEX_HTML: &str = include_str!("static/index.html");

/// Static HTML content for the 404 page
const NOT_FOUND_HTML: &str = include_str!("static/404.html");

/// Placeholder replaced with the listing route name
const FOLDER_PLACEHOLDER: &str = "%default_folder%";

/// Placeholder replaced with the percent-encoded listing URL
const LISTING_PLACEHOLDER: &str = "%listing_path%";

/// Fill the folder name and its listing URL into the landing page template
pub fn render_landing_page(folder: &str, listing_path: &str) -> String {
    INDEX_HTML
        .replace(LISTING_PLACEHOLDER, &escape_html(listing_path))
        .replace(FOLDER_PLACEHOLDER, &escape_html(folder))
}

/// Minimal HTML escaping for text and attribute values
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Handler for `GET /`
pub async fn index_handler(State(state): State<Arc<ShareState>>) -> Html<String> {
    Html(state.landing_page.clone())
}

/// Handler for invalid routes - serves 404 page
pub async fn not_found_handler() -> (StatusCode, Html<&'static str>) {
    (StatusCode::NOT_FOUND, Html(NOT_FOUND_HTML))
}
