//! # インメモリ シークレットストア

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use super::SecretStore;
use crate::error::GatewayError;

struct Version {
    number: u64,
    enabled: bool,
    payload: Vec<u8>,
}

/// バージョン番号を1から払い出すインメモリ実装。
#[derive(Default)]
pub struct MemorySecretStore {
    versions: RwLock<Vec<Version>>,
    fail_disable: AtomicBool,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以降の `disable_version` を失敗させる。
    #[cfg(test)]
    pub fn set_fail_disable(&self, fail: bool) {
        self.fail_disable.store(fail, Ordering::SeqCst);
    }

    fn parse_number(version: &str) -> Result<u64, GatewayError> {
        version
            .parse()
            .map_err(|_| GatewayError::SecretStore(format!("不正なバージョン名: {version}")))
    }
}

#[async_trait::async_trait]
impl SecretStore for MemorySecretStore {
    async fn latest_enabled(&self) -> Result<Option<Vec<u8>>, GatewayError> {
        let versions = self.versions.read().await;
        Ok(versions
            .iter()
            .filter(|v| v.enabled)
            .max_by_key(|v| v.number)
            .map(|v| v.payload.clone()))
    }

    async fn enabled_versions(&self) -> Result<Vec<String>, GatewayError> {
        let versions = self.versions.read().await;
        Ok(versions
            .iter()
            .filter(|v| v.enabled)
            .map(|v| v.number.to_string())
            .collect())
    }

    async fn disable_version(&self, version: &str) -> Result<(), GatewayError> {
        if self.fail_disable.load(Ordering::SeqCst) {
            return Err(GatewayError::SecretStore(format!(
                "バージョン {version} の無効化に失敗"
            )));
        }
        let number = Self::parse_number(version)?;
        let mut versions = self.versions.write().await;
        let target = versions
            .iter_mut()
            .find(|v| v.number == number)
            .ok_or_else(|| GatewayError::SecretStore(format!("バージョン {version} は存在しません")))?;
        target.enabled = false;
        Ok(())
    }

    async fn add_version(&self, payload: &[u8]) -> Result<String, GatewayError> {
        let mut versions = self.versions.write().await;
        let number = versions.last().map_or(1, |v| v.number + 1);
        versions.push(Version {
            number,
            enabled: true,
            payload: payload.to_vec(),
        });
        Ok(number.to_string())
    }
}
