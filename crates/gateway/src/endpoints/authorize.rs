//! # GET /authorize

use std::sync::Arc;

use axum::extract::State;
use axum::response::Redirect;

use crate::config::GatewayState;
use crate::error::GatewayError;

/// GET /authorize — プロバイダの同意画面へリダイレクトする（303）。
pub async fn handle_authorize(
    State(state): State<Arc<GatewayState>>,
) -> Result<Redirect, GatewayError> {
    let url = state.oauth.begin_authorization()?;
    tracing::info!("OAuth同意画面へリダイレクト");
    Ok(Redirect::to(&url))
}
