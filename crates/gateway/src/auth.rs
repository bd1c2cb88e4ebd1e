//! # APIキー認証
//!
//! `/drive/*` に適用するミドルウェア。ハンドラより前で拒否するため、
//! 認証に失敗したリクエストはストレージにも認証情報にも到達しない。
//! - ヘッダーなし・Bearer形式でない → 401
//! - キー不一致 → 403

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use crate::config::GatewayState;
use crate::error::GatewayError;

/// `Authorization: Bearer <token>` からトークン部分を取り出す。
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str, GatewayError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| GatewayError::Unauthorized("Authorizationヘッダーがありません".to_string()))?
        .to_str()
        .map_err(|_| GatewayError::Unauthorized("Authorizationヘッダーが不正です".to_string()))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| GatewayError::Unauthorized("Bearer形式で指定してください".to_string()))?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(GatewayError::Unauthorized(
            "Bearer形式で指定してください".to_string(),
        ));
    }
    Ok(token.trim())
}

/// 定数時間でキーを比較する。
fn keys_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// APIキーを検証するミドルウェア。キー未設定時は素通しする。
pub async fn require_api_key(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let Some(expected) = state.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let presented = bearer_token(request.headers())?;
    if !keys_match(presented, expected) {
        tracing::warn!(path = %request.uri().path(), "APIキーが一致しません");
        return Err(GatewayError::Forbidden("APIキーが一致しません".to_string()));
    }

    Ok(next.run(request).await)
}
