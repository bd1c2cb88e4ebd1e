//! # シークレットストア
//!
//! OAuthトークンを1つの名前付きシークレットのバージョンとして永続化する。
//! 有効（ENABLED）なバージョンのうち最新のものを現在値として扱う。
//! - `secret_manager`: Google Secret Manager実装
//! - `memory`: ローカル開発・テスト用実装

pub mod memory;
#[cfg(feature = "vendor-google")]
pub mod secret_manager;

pub use memory::MemorySecretStore;
#[cfg(feature = "vendor-google")]
pub use secret_manager::SecretManagerStore;

use crate::error::GatewayError;

/// 単一シークレットのバージョン操作。
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    /// 最新の有効バージョンのペイロード。有効バージョンがなければ `None`。
    async fn latest_enabled(&self) -> Result<Option<Vec<u8>>, GatewayError>;

    /// 有効なバージョン名の一覧。
    async fn enabled_versions(&self) -> Result<Vec<String>, GatewayError>;

    /// 指定バージョンを無効化する。
    async fn disable_version(&self, version: &str) -> Result<(), GatewayError>;

    /// 新しいバージョンを追加し、そのバージョン名を返す。
    async fn add_version(&self, payload: &[u8]) -> Result<String, GatewayError>;
}

/// 既存の有効バージョンをすべて無効化してから新しいバージョンを追加する。
///
/// 無効化の失敗は警告ログのみで処理を続行する。一覧取得の失敗も同様。
/// 同時に実行された場合の原子性はない。
pub async fn replace_current(
    store: &dyn SecretStore,
    payload: &[u8],
) -> Result<String, GatewayError> {
    match store.enabled_versions().await {
        Ok(versions) => {
            for version in versions {
                if let Err(e) = store.disable_version(&version).await {
                    tracing::warn!(version = %version, error = %e, "旧バージョンの無効化に失敗");
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "有効バージョンの一覧取得に失敗"),
    }

    let version = store.add_version(payload).await?;
    tracing::info!(version = %version, "シークレットの新しいバージョンを保存");
    Ok(version)
}
