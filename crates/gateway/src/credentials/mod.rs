//! # アンビエント認証情報
//!
//! 実行環境（プロセスのサービスアカウント）からDrive・Secret Manager用の
//! アクセストークンを取得する。
//! - `metadata`: GCE/Cloud Run メタデータサーバー
//! - `service_account`: サービスアカウントJSON鍵による署名付きJWT交換
//!
//! OAuthユーザートークンのライフサイクルは `crate::oauth` を参照。

#[cfg(feature = "vendor-google")]
pub mod metadata;
#[cfg(feature = "vendor-google")]
pub mod service_account;

#[cfg(feature = "vendor-google")]
pub use metadata::MetadataServerCredentials;
#[cfg(feature = "vendor-google")]
pub use service_account::ServiceAccountCredentials;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::error::GatewayError;

/// アンビエント認証で要求するスコープ
pub const AMBIENT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/cloud-platform",
];

/// 有効期限の何秒前からトークンを再取得するか
const REFRESH_MARGIN_SECS: i64 = 60;

/// アクセストークン供給元。
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    /// 有効なアクセストークンを返す。
    async fn access_token(&self) -> Result<String, GatewayError>;
}

/// 固定トークン（`MOCK_MODE` 用）。
pub struct StaticToken(pub String);

#[async_trait::async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, GatewayError> {
        Ok(self.0.clone())
    }
}

/// 取得済みトークンと有効期限。
#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// 有効期限付きトークンのキャッシュ。
#[derive(Default)]
pub(crate) struct TokenCache {
    slot: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    /// 期限に余裕のあるトークンがあれば返す。
    pub(crate) async fn get(&self) -> Option<String> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|t| t.expires_at > Utc::now() + Duration::seconds(REFRESH_MARGIN_SECS))
            .map(|t| t.token.clone())
    }

    pub(crate) async fn put(&self, token: String, expires_in_secs: i64) {
        *self.slot.write().await = Some(CachedToken {
            token,
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        });
    }
}

/// トークンエンドポイント・メタデータサーバーの共通レスポンス。
#[derive(Debug, serde::Deserialize)]
pub(crate) struct AccessTokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_respects_margin() {
        let cache = TokenCache::default();
        assert!(cache.get().await.is_none());

        cache.put("fresh".to_string(), 3600).await;
        assert_eq!(cache.get().await.as_deref(), Some("fresh"));

        // 残り30秒は再取得対象
        cache.put("stale".to_string(), 30).await;
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn test_static_token() {
        let provider = StaticToken("abc".to_string());
        assert_eq!(provider.access_token().await.unwrap(), "abc");
    }
}
