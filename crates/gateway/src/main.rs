//! # docgate Gateway
//!
//! Google Driveのワークスペースフォルダを、エージェントから扱える
//! 単純なファイル読み書きAPIとして公開するGateway。
//!
//! ## 役割
//! - ワークスペースフォルダ内のファイル一覧・読み取り・upsert（アンビエント認証情報）
//! - 利用者のOAuth同意とトークンのシークレットストアへの保存
//! - 保存済みトークンによるMarkdownファイルの編集
//! - `/drive/*` のAPIキー認証
//!
//! ## API エンドポイント
//! - `GET /` — 死活確認
//! - `GET /drive/list` — ファイル一覧
//! - `POST /drive/read` — ファイル読み取り
//! - `POST /drive/write` — ファイルのupsert
//! - `GET /authorize` — OAuth同意画面へのリダイレクト
//! - `GET /oauth2callback` — 認可コードの交換と保存
//! - `POST /edit-markdown` — 利用者Driveのmarkdown編集

mod auth;
mod config;
mod credentials;
mod documents;
mod endpoints;
mod error;
mod locks;
mod mime;
mod oauth;
mod secrets;
mod storage;
#[cfg(test)]
mod test_helpers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use auth::require_api_key;
use config::{GatewayConfig, GatewayState, LIST_PAGE_SIZE};
use credentials::TokenProvider;
use endpoints::*;
use locks::NameLocks;
use oauth::{OAuthClient, OAuthSession};
use secrets::{MemorySecretStore, SecretStore};
use storage::{DocumentStore, MemoryStore};

/// ルーターを構築する。`/drive/*` のみAPIキー認証の対象。
pub(crate) fn build_router(state: Arc<GatewayState>) -> Router {
    let drive = Router::new()
        .route("/drive/list", get(handle_list))
        .route("/drive/read", post(handle_read))
        .route("/drive/write", post(handle_write))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/", get(handle_health))
        .route("/authorize", get(handle_authorize))
        .route("/oauth2callback", get(handle_oauth_callback))
        .route("/edit-markdown", post(handle_edit_markdown))
        .merge(drive)
        .with_state(state)
}

/// 設定から共有状態を組み立てる。
async fn build_state(config: &GatewayConfig) -> anyhow::Result<GatewayState> {
    let http = reqwest::Client::new();

    let (store, ambient, secrets): (
        Arc<dyn DocumentStore>,
        Arc<dyn TokenProvider>,
        Arc<dyn SecretStore>,
    ) = if config.mock_mode {
        tracing::warn!("MOCK_MODE: インメモリのストレージとシークレットストアで起動します");
        (
            Arc::new(MemoryStore::new()),
            Arc::new(credentials::StaticToken("mock-token".to_string())),
            Arc::new(MemorySecretStore::new()),
        )
    } else {
        build_google_backends(config, http.clone()).await?
    };

    let oauth_client = match &config.oauth {
        Some(oauth_config) => Some(OAuthClient::new(http, oauth_config.clone())),
        None => {
            tracing::warn!(
                "GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET が未設定です。/authorize は利用できません"
            );
            None
        }
    };

    Ok(GatewayState {
        folder_id: config.folder_id.clone(),
        api_key: config.api_key.clone(),
        store,
        ambient,
        oauth: OAuthSession::new(oauth_client, secrets),
        locks: NameLocks::new(),
        list_page_size: LIST_PAGE_SIZE,
    })
}

#[cfg(feature = "vendor-google")]
async fn build_google_backends(
    config: &GatewayConfig,
    http: reqwest::Client,
) -> anyhow::Result<(
    Arc<dyn DocumentStore>,
    Arc<dyn TokenProvider>,
    Arc<dyn SecretStore>,
)> {
    use credentials::{MetadataServerCredentials, ServiceAccountCredentials};
    use secrets::SecretManagerStore;
    use storage::DriveClient;

    let ambient: Arc<dyn TokenProvider> = match &config.credentials_path {
        Some(path) => {
            let creds = ServiceAccountCredentials::from_file(http.clone(), path).await?;
            tracing::info!(client_email = %creds.client_email(), "サービスアカウント鍵を使用します");
            Arc::new(creds)
        }
        None => {
            tracing::info!("メタデータサーバーの認証情報を使用します");
            Arc::new(MetadataServerCredentials::new(http.clone()))
        }
    };

    let secrets: Arc<dyn SecretStore> = match &config.project_id {
        Some(project_id) => Arc::new(SecretManagerStore::new(
            http.clone(),
            ambient.clone(),
            project_id,
            &config.token_secret_id,
        )),
        None => {
            tracing::warn!(
                "GCP_PROJECT_IDが未設定です。OAuthトークンはプロセス内にのみ保持されます"
            );
            Arc::new(MemorySecretStore::new())
        }
    };

    Ok((Arc::new(DriveClient::new(http)), ambient, secrets))
}

#[cfg(not(feature = "vendor-google"))]
async fn build_google_backends(
    _config: &GatewayConfig,
    _http: reqwest::Client,
) -> anyhow::Result<(
    Arc<dyn DocumentStore>,
    Arc<dyn TokenProvider>,
    Arc<dyn SecretStore>,
)> {
    anyhow::bail!("vendor-google featureなしでビルドされています。MOCK_MODE=true で起動してください")
}

// ---------------------------------------------------------------------------
// エントリポイント
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env()?;
    if config.api_key.is_none() {
        tracing::warn!("API_KEYが未設定です。/drive/* は認証なしで公開されます");
    }

    let state = Arc::new(build_state(&config).await?);
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(folder_id = %config.folder_id, "Gatewayを {} で起動します", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
