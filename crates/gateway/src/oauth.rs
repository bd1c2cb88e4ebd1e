//! # OAuthトークンのライフサイクル
//!
//! 1. `/authorize`: 同意画面URLを発行（`state` を記録）
//! 2. `/oauth2callback`: 認可コードをトークンに交換し、シークレットストアへ保存
//! 3. 保護されたリクエストごとに最新の有効バージョンを読み出し、
//!    期限切れならリフレッシュして再保存する
//!
//! 保存・リフレッシュは他プロセスとの排他を行わない。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::secrets::{replace_current, SecretStore};

/// Google OAuth2 認可エンドポイント
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Google OAuth2 トークンエンドポイント
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// 要求するスコープ
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// 有効期限の何分前から期限切れとみなすか
const EXPIRY_SKEW_MINUTES: i64 = 5;
/// 発行した `state` の有効期間
const STATE_TTL_MINUTES: i64 = 10;

/// OAuthクライアント設定。
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
}

/// シークレットストアに保存するトークン。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// `None` は期限なしとして扱う
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// 期限切れ（または期限の直前）かどうか。
    pub fn is_expired(&self) -> bool {
        self.expiry
            .is_some_and(|expiry| expiry <= Utc::now() + Duration::minutes(EXPIRY_SKEW_MINUTES))
    }
}

/// トークンエンドポイントのレスポンス。
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

/// 認可URLの発行とトークンエンドポイントとのやり取り。
pub struct OAuthClient {
    http: reqwest::Client,
    config: OAuthConfig,
}

impl OAuthClient {
    pub fn new(http: reqwest::Client, config: OAuthConfig) -> Self {
        Self { http, config }
    }

    /// 同意画面のURLを構築する。
    pub fn authorization_url(&self, state: &str) -> Result<String, GatewayError> {
        let url = url::Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", DRIVE_SCOPE),
                ("access_type", "offline"),
                ("include_granted_scopes", "true"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .map_err(|e| GatewayError::Internal(format!("認可URLの構築に失敗: {e}")))?;
        Ok(url.to_string())
    }

    /// 認可コードをトークンに交換する。
    pub async fn exchange_code(&self, code: &str) -> Result<StoredToken, GatewayError> {
        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .await?;
        Ok(self.to_stored(response, None))
    }

    /// リフレッシュトークンで新しいアクセストークンを取得する。
    /// レスポンスにリフレッシュトークンが含まれなければ既存のものを引き継ぐ。
    pub async fn refresh(&self, token: &StoredToken) -> Result<StoredToken, GatewayError> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or(GatewayError::NotAuthenticated)?;
        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;
        let mut refreshed = self.to_stored(response, token.refresh_token.clone());
        if refreshed.scopes.is_empty() {
            refreshed.scopes = token.scopes.clone();
        }
        Ok(refreshed)
    }

    async fn request_token(
        &self,
        params: &[(&str, &str)],
    ) -> Result<TokenEndpointResponse, GatewayError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        form.extend_from_slice(params);

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::OAuth(format!("トークンエンドポイントへの送信失敗: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::OAuth(format!(
                "トークンエンドポイントがエラーを返しました: HTTP {status} - {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::OAuth(format!("トークンレスポンスのパースに失敗: {e}")))
    }

    fn to_stored(
        &self,
        response: TokenEndpointResponse,
        previous_refresh: Option<String>,
    ) -> StoredToken {
        StoredToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            token_uri: self.config.token_url.clone(),
            client_id: self.config.client_id.clone(),
            scopes: response
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            expiry: response
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }
}

/// シークレットストアと組み合わせたトークン管理。
pub struct OAuthSession {
    /// 未設定の場合、認可フローは内部エラーとなる
    client: Option<OAuthClient>,
    secrets: Arc<dyn SecretStore>,
    pending_states: DashMap<String, DateTime<Utc>>,
}

impl OAuthSession {
    pub fn new(client: Option<OAuthClient>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            client,
            secrets,
            pending_states: DashMap::new(),
        }
    }

    fn client(&self) -> Result<&OAuthClient, GatewayError> {
        self.client.as_ref().ok_or_else(|| {
            GatewayError::Internal(
                "GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET が設定されていません".to_string(),
            )
        })
    }

    /// `state` を発行・記録し、同意画面のURLを返す。
    pub fn begin_authorization(&self) -> Result<String, GatewayError> {
        let client = self.client()?;

        let now = Utc::now();
        self.pending_states
            .retain(|_, issued| *issued + Duration::minutes(STATE_TTL_MINUTES) > now);

        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let state = hex::encode(bytes);

        let url = client.authorization_url(&state)?;
        self.pending_states.insert(state, now);
        Ok(url)
    }

    /// `state` を検証し、認可コードを交換して保存する。
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
    ) -> Result<StoredToken, GatewayError> {
        let client = self.client()?;

        let issued = self
            .pending_states
            .remove(state)
            .map(|(_, issued)| issued)
            .ok_or_else(|| GatewayError::BadRequest("不明なstateです".to_string()))?;
        if issued + Duration::minutes(STATE_TTL_MINUTES) <= Utc::now() {
            return Err(GatewayError::BadRequest("stateの有効期限が切れています".to_string()));
        }

        let token = client.exchange_code(code).await?;
        self.save(&token).await?;
        Ok(token)
    }

    /// トークンを新しいシークレットバージョンとして保存する。
    pub async fn save(&self, token: &StoredToken) -> Result<(), GatewayError> {
        let payload = serde_json::to_vec(token)
            .map_err(|e| GatewayError::Internal(format!("トークンのシリアライズに失敗: {e}")))?;
        replace_current(self.secrets.as_ref(), &payload).await?;
        Ok(())
    }

    /// 保存済みトークンを読み出す。保存されていなければ `None`。
    pub async fn load(&self) -> Result<Option<StoredToken>, GatewayError> {
        let Some(payload) = self.secrets.latest_enabled().await? else {
            return Ok(None);
        };
        let token = serde_json::from_slice(&payload).map_err(|e| {
            GatewayError::SecretStore(format!("保存済みトークンのパースに失敗: {e}"))
        })?;
        Ok(Some(token))
    }

    /// 保護されたリクエストで使用する有効なトークンを返す。
    ///
    /// - 未保存 → `NotAuthenticated`
    /// - 期限切れでリフレッシュトークンあり → リフレッシュして再保存
    /// - 期限切れでリフレッシュトークンなし → `NotAuthenticated`
    pub async fn current_token(&self) -> Result<StoredToken, GatewayError> {
        let token = self.load().await?.ok_or(GatewayError::NotAuthenticated)?;
        if !token.is_expired() {
            return Ok(token);
        }
        if token.refresh_token.is_none() {
            tracing::warn!("保存済みトークンが期限切れで、リフレッシュトークンがありません");
            return Err(GatewayError::NotAuthenticated);
        }

        tracing::info!("期限切れのOAuthトークンをリフレッシュ");
        let refreshed = self.client()?.refresh(&token).await?;
        self.save(&refreshed).await?;
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::routing::post;
    use axum::{Form, Json};

    use super::*;
    use crate::secrets::MemorySecretStore;
    use crate::test_helpers::spawn_mock_server;

    fn test_config(token_url: &str) -> OAuthConfig {
        OAuthConfig {
            client_id: "client-1".to_string(),
            client_secret: "secret-1".to_string(),
            redirect_uri: "http://localhost:8080/oauth2callback".to_string(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: token_url.to_string(),
        }
    }

    /// モックトークンエンドポイント。grant_typeごとに異なるトークンを返す。
    async fn mock_token_endpoint(hits: Arc<AtomicUsize>) -> String {
        let app = axum::Router::new().route(
            "/token",
            post(move |Form(form): Form<HashMap<String, String>>| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(form.get("client_id").unwrap(), "client-1");
                    assert_eq!(form.get("client_secret").unwrap(), "secret-1");
                    match form.get("grant_type").unwrap().as_str() {
                        "authorization_code" => {
                            assert_eq!(form.get("code").unwrap(), "code-123");
                            Json(serde_json::json!({
                                "access_token": "access-1",
                                "refresh_token": "refresh-1",
                                "expires_in": 3599,
                                "scope": DRIVE_SCOPE,
                                "token_type": "Bearer"
                            }))
                        }
                        "refresh_token" => {
                            assert_eq!(form.get("refresh_token").unwrap(), "refresh-1");
                            Json(serde_json::json!({
                                "access_token": "access-2",
                                "expires_in": 3599,
                                "token_type": "Bearer"
                            }))
                        }
                        other => panic!("unexpected grant_type {other}"),
                    }
                }
            }),
        );
        let base = spawn_mock_server(app).await;
        format!("{base}/token")
    }

    fn expired_token(token_url: &str, refresh: Option<&str>) -> StoredToken {
        StoredToken {
            access_token: "old".to_string(),
            refresh_token: refresh.map(str::to_string),
            token_uri: token_url.to_string(),
            client_id: "client-1".to_string(),
            scopes: vec![DRIVE_SCOPE.to_string()],
            expiry: Some(Utc::now() - Duration::hours(1)),
        }
    }

    #[test]
    fn test_expiry_uses_skew() {
        let mut token = expired_token("t", None);
        assert!(token.is_expired());
        token.expiry = Some(Utc::now() + Duration::minutes(4));
        assert!(token.is_expired());
        token.expiry = Some(Utc::now() + Duration::hours(1));
        assert!(!token.is_expired());
        token.expiry = None;
        assert!(!token.is_expired());
    }

    #[test]
    fn test_authorization_url_parameters() {
        let client = OAuthClient::new(reqwest::Client::new(), test_config(GOOGLE_TOKEN_URL));
        let url = url::Url::parse(&client.authorization_url("abc").unwrap()).unwrap();
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(params["client_id"], "client-1");
        assert_eq!(params["scope"], DRIVE_SCOPE);
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert_eq!(params["state"], "abc");
        assert_eq!(params["redirect_uri"], "http://localhost:8080/oauth2callback");
    }

    /// 認可フロー完了でトークンがシークレットストアに保存されることを確認
    #[tokio::test]
    async fn test_complete_authorization_persists_token() {
        let hits = Arc::new(AtomicUsize::new(0));
        let token_url = mock_token_endpoint(hits.clone()).await;
        let secrets = Arc::new(MemorySecretStore::new());
        let session = OAuthSession::new(
            Some(OAuthClient::new(reqwest::Client::new(), test_config(&token_url))),
            secrets.clone(),
        );

        let url = url::Url::parse(&session.begin_authorization().unwrap()).unwrap();
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let token = session.complete_authorization("code-123", &state).await.unwrap();
        assert_eq!(token.access_token, "access-1");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));

        let stored = session.load().await.unwrap().unwrap();
        assert_eq!(stored, token);

        // stateは1回限り
        let err = session
            .complete_authorization("code-123", &state)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_state_is_rejected_before_exchange() {
        let hits = Arc::new(AtomicUsize::new(0));
        let token_url = mock_token_endpoint(hits.clone()).await;
        let session = OAuthSession::new(
            Some(OAuthClient::new(reqwest::Client::new(), test_config(&token_url))),
            Arc::new(MemorySecretStore::new()),
        );

        let err = session
            .complete_authorization("code-123", "forged")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_current_token_without_saved_token() {
        let session = OAuthSession::new(None, Arc::new(MemorySecretStore::new()));
        let err = session.current_token().await.unwrap_err();
        assert!(matches!(err, GatewayError::NotAuthenticated));
    }

    /// 期限切れトークンがリフレッシュされ、新しいバージョンとして保存されることを確認
    #[tokio::test]
    async fn test_current_token_refreshes_and_persists() {
        let hits = Arc::new(AtomicUsize::new(0));
        let token_url = mock_token_endpoint(hits.clone()).await;
        let secrets = Arc::new(MemorySecretStore::new());
        let session = OAuthSession::new(
            Some(OAuthClient::new(reqwest::Client::new(), test_config(&token_url))),
            secrets.clone(),
        );
        session
            .save(&expired_token(&token_url, Some("refresh-1")))
            .await
            .unwrap();

        let token = session.current_token().await.unwrap();
        assert_eq!(token.access_token, "access-2");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(token.scopes, vec![DRIVE_SCOPE.to_string()]);
        assert!(!token.is_expired());

        // 再保存済み・旧バージョンは無効化済み
        assert_eq!(secrets.enabled_versions().await.unwrap().len(), 1);
        assert_eq!(session.load().await.unwrap().unwrap().access_token, "access-2");

        // 2回目はリフレッシュしない
        session.current_token().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_is_not_authenticated() {
        let session = OAuthSession::new(None, Arc::new(MemorySecretStore::new()));
        session
            .save(&expired_token("http://unused/token", None))
            .await
            .unwrap();
        let err = session.current_token().await.unwrap_err();
        assert!(matches!(err, GatewayError::NotAuthenticated));
    }
}
