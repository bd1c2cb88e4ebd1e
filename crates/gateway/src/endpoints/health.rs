//! # GET /

/// GET / — 死活確認。
pub async fn handle_health() -> &'static str {
    "Hello World!"
}
