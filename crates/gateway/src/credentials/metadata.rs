//! # メタデータサーバー認証
//!
//! GCE / Cloud Run 上では、インスタンスに紐づくサービスアカウントの
//! アクセストークンをメタデータサーバーから取得できる。

use super::{AccessTokenResponse, TokenCache, TokenProvider, AMBIENT_SCOPES};
use crate::error::GatewayError;

/// メタデータサーバーのトークンエンドポイント
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// メタデータサーバーから取得するアンビエント認証情報。
pub struct MetadataServerCredentials {
    http: reqwest::Client,
    token_url: String,
    cache: TokenCache,
}

impl MetadataServerCredentials {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_token_url(http, METADATA_TOKEN_URL)
    }

    /// トークンエンドポイントを差し替えて構築する。
    pub fn with_token_url(http: reqwest::Client, token_url: &str) -> Self {
        Self {
            http,
            token_url: token_url.to_string(),
            cache: TokenCache::default(),
        }
    }
}

#[async_trait::async_trait]
impl TokenProvider for MetadataServerCredentials {
    async fn access_token(&self) -> Result<String, GatewayError> {
        if let Some(token) = self.cache.get().await {
            return Ok(token);
        }

        let scopes = AMBIENT_SCOPES.join(",");
        let response = self
            .http
            .get(&self.token_url)
            .header("Metadata-Flavor", "Google")
            .query(&[("scopes", scopes.as_str())])
            .send()
            .await
            .map_err(|e| GatewayError::Credentials(format!("メタデータサーバーへの接続失敗: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Credentials(format!(
                "メタデータサーバーがエラーを返しました: HTTP {status} - {body}"
            )));
        }

        let token: AccessTokenResponse = response.json().await.map_err(|e| {
            GatewayError::Credentials(format!("トークンレスポンスのパースに失敗: {e}"))
        })?;

        tracing::debug!(expires_in = token.expires_in, "アンビエントトークンを取得");
        self.cache
            .put(token.access_token.clone(), token.expires_in)
            .await;
        Ok(token.access_token)
    }
}
