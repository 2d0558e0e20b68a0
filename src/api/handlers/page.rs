//! Chat page

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};

const INDEX_HTML: &str = include_str!("../../../assets/index.html");

/// Serve the chat page
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Any method other than GET on the page
pub async fn method_not_allowed() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// Any path without a route
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}
