//! # POST /drive/write
//!
//! ワークスペースフォルダへのupsert。

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use docgate_types::{WriteRequest, WriteResponse};

use super::{require_non_empty, require_present};
use crate::config::GatewayState;
use crate::documents::upsert_text;
use crate::error::GatewayError;

/// POST /drive/write — 同名ファイルがあれば内容を置換し、なければ作成する。
pub async fn handle_write(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<WriteRequest>, JsonRejection>,
) -> Result<Json<WriteResponse>, GatewayError> {
    let Json(body) = payload?;
    let filename = require_non_empty(body.filename, "filename")?;
    let content = require_present(body.content, "content")?;

    let token = state.ambient.access_token().await?;
    let (status, file) = upsert_text(
        state.store.as_ref(),
        &state.locks,
        &token,
        &filename,
        Some(&state.folder_id),
        content,
    )
    .await?;

    tracing::info!(filename = %filename, file_id = %file.id, ?status, "ファイルを書き込み");

    Ok(Json(WriteResponse {
        status,
        file_id: file.id,
    }))
}
