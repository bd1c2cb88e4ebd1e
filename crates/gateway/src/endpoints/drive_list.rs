//! # GET /drive/list
//!
//! ワークスペースフォルダ内のファイル一覧。

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use docgate_types::ListResponse;

use crate::config::GatewayState;
use crate::error::GatewayError;

/// GET /drive/list — ゴミ箱外のファイルを最終更新日時の降順で返す。
pub async fn handle_list(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<ListResponse>, GatewayError> {
    let token = state.ambient.access_token().await?;
    let files = state
        .store
        .list_folder(&token, &state.folder_id, state.list_page_size)
        .await?;

    tracing::info!(count = files.len(), "ワークスペースのファイル一覧を取得");

    let files: Vec<_> = files.iter().map(|f| f.summary()).collect();
    Ok(Json(ListResponse {
        count: files.len(),
        files,
    }))
}
