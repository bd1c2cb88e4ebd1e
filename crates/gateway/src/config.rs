//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//! 環境変数は起動時に一度だけ読み込む。

use std::sync::Arc;

use anyhow::Context;

use crate::credentials::TokenProvider;
use crate::locks::NameLocks;
use crate::oauth::{OAuthConfig, OAuthSession, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL};
use crate::storage::DocumentStore;

/// `/drive/list` の最大件数
pub const LIST_PAGE_SIZE: u32 = 100;
/// OAuthトークンを保存するシークレットIDの既定値
pub const DEFAULT_TOKEN_SECRET_ID: &str = "drive-oauth-token";
/// `MOCK_MODE` 時のワークスペースフォルダID
const MOCK_FOLDER_ID: &str = "mock-folder";

/// 環境変数から読み込んだ設定。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// 待ち受けポート（`PORT`）
    pub port: u16,
    /// ワークスペースフォルダID（`DRIVE_FOLDER_ID`）
    pub folder_id: String,
    /// `/drive/*` のAPIキー（`API_KEY`）。未設定ならゲートなし。
    pub api_key: Option<String>,
    /// OAuthクライアント（`GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`）
    pub oauth: Option<OAuthConfig>,
    /// Secret ManagerのプロジェクトID（`GCP_PROJECT_ID`）
    pub project_id: Option<String>,
    /// トークン保存先シークレットID（`OAUTH_TOKEN_SECRET_ID`）
    pub token_secret_id: String,
    /// サービスアカウント鍵のパス（`GOOGLE_APPLICATION_CREDENTIALS`）
    pub credentials_path: Option<String>,
    /// インメモリのストア・シークレットで起動する（`MOCK_MODE=true`）
    pub mock_mode: bool,
}

impl GatewayConfig {
    /// 環境変数から構築する。
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意の取得関数から構築する（空文字列は未設定として扱う）。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(p) => p
                .parse()
                .with_context(|| format!("PORTが不正です: {p}"))?,
            None => 8080,
        };

        let mock_mode = get("MOCK_MODE").is_some_and(|v| v == "true");

        let folder_id = match get("DRIVE_FOLDER_ID") {
            Some(id) => id,
            None if mock_mode => MOCK_FOLDER_ID.to_string(),
            None => anyhow::bail!("DRIVE_FOLDER_IDが設定されていません"),
        };

        let oauth = match (get("GOOGLE_CLIENT_ID"), get("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(OAuthConfig {
                client_id,
                client_secret,
                redirect_uri: get("OAUTH_REDIRECT_URI")
                    .unwrap_or_else(|| format!("http://localhost:{port}/oauth2callback")),
                auth_url: GOOGLE_AUTH_URL.to_string(),
                token_url: GOOGLE_TOKEN_URL.to_string(),
            }),
            _ => None,
        };

        Ok(Self {
            port,
            folder_id,
            api_key: get("API_KEY"),
            oauth,
            project_id: get("GCP_PROJECT_ID"),
            token_secret_id: get("OAUTH_TOKEN_SECRET_ID")
                .unwrap_or_else(|| DEFAULT_TOKEN_SECRET_ID.to_string()),
            credentials_path: get("GOOGLE_APPLICATION_CREDENTIALS"),
            mock_mode,
        })
    }
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// ワークスペースフォルダID
    pub folder_id: String,
    /// `/drive/*` のAPIキー
    pub api_key: Option<String>,
    /// ドキュメントストレージ（Drive等、トレイトで抽象化）
    pub store: Arc<dyn DocumentStore>,
    /// アンビエント認証情報（ワークスペース操作用）
    pub ambient: Arc<dyn TokenProvider>,
    /// OAuthトークン管理（`/edit-markdown` 用）
    pub oauth: OAuthSession,
    /// ファイル名単位の書き込みロック
    pub locks: NameLocks,
    /// `/drive/list` の最大件数
    pub list_page_size: u32,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[("DRIVE_FOLDER_ID", "folder1")])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.folder_id, "folder1");
        assert!(config.api_key.is_none());
        assert!(config.oauth.is_none());
        assert_eq!(config.token_secret_id, DEFAULT_TOKEN_SECRET_ID);
        assert!(!config.mock_mode);
    }

    #[test]
    fn test_folder_required_unless_mock() {
        assert!(GatewayConfig::from_lookup(lookup(&[])).is_err());
        let config = GatewayConfig::from_lookup(lookup(&[("MOCK_MODE", "true")])).unwrap();
        assert_eq!(config.folder_id, MOCK_FOLDER_ID);
    }

    #[test]
    fn test_oauth_and_redirect_default() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("DRIVE_FOLDER_ID", "f"),
            ("PORT", "9000"),
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("API_KEY", ""),
        ]))
        .unwrap();
        let oauth = config.oauth.unwrap();
        assert_eq!(oauth.redirect_uri, "http://localhost:9000/oauth2callback");
        // 空文字列は未設定扱い
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_invalid_port() {
        let result = GatewayConfig::from_lookup(lookup(&[
            ("DRIVE_FOLDER_ID", "f"),
            ("PORT", "http"),
        ]));
        assert!(result.is_err());
    }
}
