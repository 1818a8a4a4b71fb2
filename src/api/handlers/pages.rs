use axum::response::Html;

/// Minimal upload page for manual testing.
pub async fn upload_page() -> Html<&'static str> {
    Html(include_str!("../../../templates/upload.html"))
}
