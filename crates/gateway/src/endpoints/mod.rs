//! # Gatewayエンドポイント

pub mod authorize;
pub mod drive_list;
pub mod drive_read;
pub mod drive_write;
pub mod edit_markdown;
pub mod health;
pub mod oauth_callback;


pub use authorize::handle_authorize;
pub use drive_list::handle_list;
pub use drive_read::handle_read;
pub use drive_write::handle_write;
pub use edit_markdown::handle_edit_markdown;
pub use health::handle_health;
pub use oauth_callback::handle_oauth_callback;

use crate::error::GatewayError;

/// 必須かつ空でない文字列フィールドを取り出す。
pub(crate) fn require_non_empty(value: Option<String>, field: &str) -> Result<String, GatewayError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(GatewayError::BadRequest(format!("{field} は必須です"))),
    }
}

/// 必須フィールドを取り出す（空文字列は許可）。
pub(crate) fn require_present(value: Option<String>, field: &str) -> Result<String, GatewayError> {
    value.ok_or_else(|| GatewayError::BadRequest(format!("{field} は必須です")))
}
