//! # Google Secret Manager 実装
//!
//! Secret Manager v1 REST API を reqwest で直接呼び出す。
//! 認証にはアンビエント認証情報を使用する。

use std::sync::Arc;

use base64::Engine;
use reqwest::StatusCode;
use serde::Deserialize;

use super::SecretStore;
use crate::credentials::TokenProvider;
use crate::error::GatewayError;

/// Secret Manager API ベースURL
const SECRET_MANAGER_BASE: &str = "https://secretmanager.googleapis.com/v1";

/// Base64エンジン（Standard）
fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

#[derive(Debug, Deserialize)]
struct SecretVersion {
    /// `projects/{p}/secrets/{s}/versions/{n}`
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListVersionsResponse {
    #[serde(default)]
    versions: Vec<SecretVersion>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    payload: Payload,
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    data: String,
}

/// バージョンリソース名の末尾の番号。
fn version_number(name: &str) -> u64 {
    name.rsplit('/')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// 1つのシークレットを操作するSecret Managerクライアント。
pub struct SecretManagerStore {
    http: reqwest::Client,
    credentials: Arc<dyn TokenProvider>,
    base_url: String,
    project_id: String,
    secret_id: String,
}

impl SecretManagerStore {
    pub fn new(
        http: reqwest::Client,
        credentials: Arc<dyn TokenProvider>,
        project_id: &str,
        secret_id: &str,
    ) -> Self {
        Self::with_base_url(http, credentials, SECRET_MANAGER_BASE, project_id, secret_id)
    }

    /// エンドポイントを差し替えて構築する（テストのモックサーバー用）。
    pub fn with_base_url(
        http: reqwest::Client,
        credentials: Arc<dyn TokenProvider>,
        base_url: &str,
        project_id: &str,
        secret_id: &str,
    ) -> Self {
        Self {
            http,
            credentials,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            secret_id: secret_id.to_string(),
        }
    }

    fn secret_path(&self) -> String {
        format!("projects/{}/secrets/{}", self.project_id, self.secret_id)
    }

    /// 有効バージョンを新しい順に返す。シークレット自体が存在しなければ空。
    async fn list_enabled(&self) -> Result<Vec<SecretVersion>, GatewayError> {
        let token = self.credentials.access_token().await?;
        let url = format!("{}/{}/versions", self.base_url, self.secret_path());
        let mut versions = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .query(&[("filter", "state:ENABLED")]);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| GatewayError::SecretStore(format!("versions.list送信失敗: {e}")))?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(Vec::new());
            }
            let page: ListVersionsResponse = json_or_error(response, "versions.list").await?;
            versions.extend(page.versions);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        versions.sort_by_key(|v| std::cmp::Reverse(version_number(&v.name)));
        Ok(versions)
    }

    /// シークレットを自動レプリケーションで作成する。
    async fn create_secret(&self, token: &str) -> Result<(), GatewayError> {
        let response = self
            .http
            .post(format!(
                "{}/projects/{}/secrets",
                self.base_url, self.project_id
            ))
            .bearer_auth(token)
            .query(&[("secretId", self.secret_id.as_str())])
            .json(&serde_json::json!({"replication": {"automatic": {}}}))
            .send()
            .await
            .map_err(|e| GatewayError::SecretStore(format!("secrets.create送信失敗: {e}")))?;

        // 他プロセスが先に作成した場合
        if response.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        let _: serde_json::Value = json_or_error(response, "secrets.create").await?;
        tracing::info!(secret = %self.secret_path(), "シークレットを作成");
        Ok(())
    }

    async fn send_add_version(
        &self,
        token: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, GatewayError> {
        self.http
            .post(format!("{}/{}:addVersion", self.base_url, self.secret_path()))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::SecretStore(format!("addVersion送信失敗: {e}")))
    }
}

async fn json_or_error<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation: &str,
) -> Result<T, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::SecretStore(format!(
            "{operation}がエラーを返しました: HTTP {status} - {body}"
        )));
    }
    response
        .json()
        .await
        .map_err(|e| GatewayError::SecretStore(format!("{operation}レスポンスのパースに失敗: {e}")))
}

#[async_trait::async_trait]
impl SecretStore for SecretManagerStore {
    async fn latest_enabled(&self) -> Result<Option<Vec<u8>>, GatewayError> {
        let Some(latest) = self.list_enabled().await?.into_iter().next() else {
            return Ok(None);
        };

        let token = self.credentials.access_token().await?;
        let response = self
            .http
            .get(format!("{}/{}:access", self.base_url, latest.name))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| GatewayError::SecretStore(format!("versions.access送信失敗: {e}")))?;
        let access: AccessResponse = json_or_error(response, "versions.access").await?;

        let data = b64().decode(access.payload.data.as_bytes()).map_err(|e| {
            GatewayError::SecretStore(format!("ペイロードのBase64デコードに失敗: {e}"))
        })?;
        Ok(Some(data))
    }

    async fn enabled_versions(&self) -> Result<Vec<String>, GatewayError> {
        Ok(self
            .list_enabled()
            .await?
            .into_iter()
            .map(|v| v.name)
            .collect())
    }

    async fn disable_version(&self, version: &str) -> Result<(), GatewayError> {
        let token = self.credentials.access_token().await?;
        let response = self
            .http
            .post(format!("{}/{}:disable", self.base_url, version))
            .bearer_auth(&token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| GatewayError::SecretStore(format!("versions.disable送信失敗: {e}")))?;
        let _: serde_json::Value = json_or_error(response, "versions.disable").await?;
        Ok(())
    }

    async fn add_version(&self, payload: &[u8]) -> Result<String, GatewayError> {
        let token = self.credentials.access_token().await?;
        let body = serde_json::json!({"payload": {"data": b64().encode(payload)}});

        let mut response = self.send_add_version(&token, &body).await?;
        if response.status() == StatusCode::NOT_FOUND {
            self.create_secret(&token).await?;
            response = self.send_add_version(&token, &body).await?;
        }

        let version: SecretVersion = json_or_error(response, "addVersion").await?;
        Ok(version.name)
    }
}
