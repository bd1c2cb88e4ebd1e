//! # POST /drive/read
//!
//! ワークスペースフォルダ内のファイルをテキストとして読み取る。

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use docgate_types::{ReadRequest, ReadResponse};

use super::require_non_empty;
use crate::config::GatewayState;
use crate::documents::read_text;
use crate::error::GatewayError;

/// POST /drive/read — ファイル名で検索し、内容をUTF-8テキストで返す。
///
/// ネイティブドキュメントはエクスポートして返す。
/// 見つからなければ404、テキストとして読めなければ415。
pub async fn handle_read(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<ReadRequest>, JsonRejection>,
) -> Result<Json<ReadResponse>, GatewayError> {
    let Json(body) = payload?;
    let filename = require_non_empty(body.filename, "filename")?;

    let token = state.ambient.access_token().await?;
    let file = state
        .store
        .find_by_name(&token, &filename, Some(&state.folder_id))
        .await?
        .ok_or_else(|| GatewayError::NotFound(filename.clone()))?;

    let content = read_text(state.store.as_ref(), &token, &file).await?;
    tracing::info!(filename = %filename, file_id = %file.id, "ファイルを読み取り");

    Ok(Json(ReadResponse { filename, content }))
}
