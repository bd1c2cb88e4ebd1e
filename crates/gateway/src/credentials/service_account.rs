//! # サービスアカウント鍵による認証
//!
//! `GOOGLE_APPLICATION_CREDENTIALS` が指すJSON鍵でRS256署名したJWTを
//! トークンエンドポイントに提示し、アクセストークンと交換する。

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use super::{AccessTokenResponse, TokenCache, TokenProvider, AMBIENT_SCOPES};
use crate::error::GatewayError;

/// JWTの有効期間（秒）。Googleの上限は1時間。
const ASSERTION_LIFETIME_SECS: u64 = 3600;

/// サービスアカウントJSON鍵のうち使用するフィールド。
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

/// JWT bearer grant のクレーム。
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

/// サービスアカウント鍵から取得するアンビエント認証情報。
pub struct ServiceAccountCredentials {
    http: reqwest::Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    cache: TokenCache,
}

impl std::fmt::Debug for ServiceAccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountCredentials")
            .field("client_email", &self.key.client_email)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountCredentials {
    /// JSON鍵の内容から構築する。秘密鍵のPEMはここで検証される。
    pub fn from_json(http: reqwest::Client, json: &str) -> Result<Self, GatewayError> {
        let key: ServiceAccountKey = serde_json::from_str(json).map_err(|e| {
            GatewayError::Credentials(format!("サービスアカウント鍵のパースに失敗: {e}"))
        })?;
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            GatewayError::Credentials(format!("サービスアカウント秘密鍵の読み込みに失敗: {e}"))
        })?;

        Ok(Self {
            http,
            key,
            encoding_key,
            cache: TokenCache::default(),
        })
    }

    /// JSON鍵ファイルから構築する。
    pub async fn from_file(http: reqwest::Client, path: &str) -> Result<Self, GatewayError> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::Credentials(format!("サービスアカウント鍵 {path} の読み込みに失敗: {e}"))
        })?;
        Self::from_json(http, &json)
    }

    /// サービスアカウントのメールアドレス。
    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    fn sign_assertion(&self) -> Result<String, GatewayError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| GatewayError::Internal(format!("時刻取得失敗: {e}")))?
            .as_secs();

        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: AMBIENT_SCOPES.join(" "),
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| GatewayError::Credentials(format!("JWT署名に失敗: {e}")))
    }
}

#[async_trait::async_trait]
impl TokenProvider for ServiceAccountCredentials {
    async fn access_token(&self) -> Result<String, GatewayError> {
        if let Some(token) = self.cache.get().await {
            return Ok(token);
        }

        let assertion = self.sign_assertion()?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Credentials(format!("トークン交換の送信失敗: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Credentials(format!(
                "トークン交換に失敗: HTTP {status} - {body}"
            )));
        }

        let token: AccessTokenResponse = response.json().await.map_err(|e| {
            GatewayError::Credentials(format!("トークンレスポンスのパースに失敗: {e}"))
        })?;

        self.cache
            .put(token.access_token.clone(), token.expires_in)
            .await;
        Ok(token.access_token)
    }
}
