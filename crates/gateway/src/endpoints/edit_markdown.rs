//! # POST /edit-markdown
//!
//! 保存済みOAuthトークンで利用者のDriveにあるMarkdownファイルを上書きする。
//! ワークスペースフォルダには限定しない。

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use docgate_types::{EditMarkdownRequest, EditMarkdownResponse, WriteStatus};

use super::{require_non_empty, require_present};
use crate::config::GatewayState;
use crate::documents::upsert_text;
use crate::error::GatewayError;

/// 拡張子 `.md` がなければ付与する。
pub(crate) fn markdown_file_name(name: &str) -> String {
    if name.to_ascii_lowercase().ends_with(".md") {
        name.to_string()
    } else {
        format!("{name}.md")
    }
}

/// POST /edit-markdown — 名前が完全一致するファイルを上書き、なければルートに作成する。
///
/// 認証確認を入力検証より先に行う。
pub async fn handle_edit_markdown(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<EditMarkdownRequest>, JsonRejection>,
) -> Result<Json<EditMarkdownResponse>, GatewayError> {
    let token = state.oauth.current_token().await?;

    let Json(body) = payload?;
    let file_name = markdown_file_name(&require_non_empty(body.file_name, "fileName")?);
    let content = require_present(body.content, "content")?;

    let (status, file) = upsert_text(
        state.store.as_ref(),
        &state.locks,
        &token.access_token,
        &file_name,
        None,
        content,
    )
    .await?;

    tracing::info!(file_name = %file_name, file_id = %file.id, ?status, "Markdownファイルを編集");

    let message = match status {
        WriteStatus::Created => format!("{file_name} を作成しました"),
        WriteStatus::Updated => format!("{file_name} を更新しました"),
    };
    Ok(Json(EditMarkdownResponse {
        success: true,
        message,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_file_name() {
        assert_eq!(markdown_file_name("todo"), "todo.md");
        assert_eq!(markdown_file_name("todo.md"), "todo.md");
        assert_eq!(markdown_file_name("README.MD"), "README.MD");
        assert_eq!(markdown_file_name("notes.txt"), "notes.txt.md");
    }
}
