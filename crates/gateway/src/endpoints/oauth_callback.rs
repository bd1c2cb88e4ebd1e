//! # GET /oauth2callback
//!
//! 認可コードをトークンに交換し、シークレットストアに保存する。

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Html;
use serde::Deserialize;

use crate::config::GatewayState;
use crate::error::GatewayError;

/// プロバイダから渡されるクエリパラメータ。
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// 利用者が同意を拒否した場合等に設定される
    #[serde(default)]
    pub error: Option<String>,
}

const SUCCESS_PAGE: &str = "<!DOCTYPE html>\
<html><head><meta charset=\"utf-8\"><title>docgate</title></head>\
<body><h1>認証が完了しました</h1><p>このウィンドウを閉じてください。</p></body></html>";

/// GET /oauth2callback — 認可コードの交換と保存。
pub async fn handle_oauth_callback(
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Html<&'static str>, GatewayError> {
    if let Some(error) = params.error {
        return Err(GatewayError::BadRequest(format!(
            "認可が拒否されました: {error}"
        )));
    }
    let oauth_state = params
        .state
        .ok_or_else(|| GatewayError::BadRequest("state がありません".to_string()))?;
    let code = params
        .code
        .ok_or_else(|| GatewayError::BadRequest("code がありません".to_string()))?;

    state
        .oauth
        .complete_authorization(&code, &oauth_state)
        .await?;
    tracing::info!("OAuthトークンを保存");

    Ok(Html(SUCCESS_PAGE))
}
