//! # Google Drive v3 ドキュメントストレージ実装
//!
//! Drive REST API（`files.list` / `files.get` / `files.export` /
//! `files.create` / `files.update`）を reqwest で直接呼び出す。

use reqwest::header;

use super::{DocumentStore, DriveFile};
use crate::error::GatewayError;

/// Drive API ベースURL
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Drive アップロードAPI ベースURL
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// 1ファイル分のレスポンスで要求するフィールド
const FILE_FIELDS: &str = "id,name,mimeType,modifiedTime,size,parents,trashed";
/// 一覧レスポンスで要求するフィールド
const LIST_FIELDS: &str = "files(id,name,mimeType,modifiedTime,size,parents,trashed)";

#[derive(Debug, serde::Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// Drive検索クエリの文字列リテラルをエスケープする。
/// バックスラッシュとシングルクォートのみが特別扱いされる。
pub(crate) fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// 名前検索用のDriveクエリを構築する。
pub(crate) fn name_query(name: &str, parent_id: Option<&str>) -> String {
    let mut query = format!("name = '{}' and trashed = false", escape_query_literal(name));
    if let Some(parent) = parent_id {
        query.push_str(&format!(" and '{}' in parents", escape_query_literal(parent)));
    }
    query
}

/// Google Drive v3 クライアント。
pub struct DriveClient {
    http: reqwest::Client,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    /// 本番エンドポイントでクライアントを構築する。
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_urls(http, DRIVE_API_BASE, DRIVE_UPLOAD_BASE)
    }

    /// エンドポイントを差し替えて構築する（テストのモックサーバー用）。
    pub fn with_base_urls(http: reqwest::Client, api_base: &str, upload_base: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
        }
    }

    async fn list(
        &self,
        token: &str,
        query: &str,
        page_size: u32,
    ) -> Result<Vec<DriveFile>, GatewayError> {
        let page_size = page_size.to_string();
        let response = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[
                ("q", query),
                ("orderBy", "modifiedTime desc"),
                ("pageSize", page_size.as_str()),
                ("fields", LIST_FIELDS),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("files.list送信失敗: {e}")))?;

        let list: FileListResponse = json_or_error(response, "files.list").await?;
        Ok(list.files)
    }

    async fn fetch_bytes(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<Vec<u8>, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("{operation}送信失敗: {e}")))?;

        let response = error_for_status(response, operation).await?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| GatewayError::Storage(format!("{operation}レスポンス読み取り失敗: {e}")))
    }
}

/// 失敗ステータスをレスポンス本文付きの `Storage` エラーに変換する。
async fn error_for_status(
    response: reqwest::Response,
    operation: &str,
) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Storage(format!(
        "{operation}がエラーを返しました: HTTP {status} - {body}"
    )))
}

async fn json_or_error<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation: &str,
) -> Result<T, GatewayError> {
    error_for_status(response, operation)
        .await?
        .json()
        .await
        .map_err(|e| GatewayError::Storage(format!("{operation}レスポンスのパースに失敗: {e}")))
}

/// `multipart/related` 形式のアップロード本文を組み立てる。
fn multipart_body(metadata: &serde_json::Value, mime_type: &str, data: &[u8]) -> (String, Vec<u8>) {
    let boundary = format!("docgate-{}", uuid::Uuid::new_v4().simple());
    let mut body = Vec::with_capacity(data.len() + 512);

    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{boundary}--").as_bytes());

    (boundary, body)
}

#[async_trait::async_trait]
impl DocumentStore for DriveClient {
    async fn find_by_name(
        &self,
        token: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<DriveFile>, GatewayError> {
        let query = name_query(name, parent_id);
        Ok(self.list(token, &query, 1).await?.into_iter().next())
    }

    async fn list_folder(
        &self,
        token: &str,
        folder_id: &str,
        page_size: u32,
    ) -> Result<Vec<DriveFile>, GatewayError> {
        let query = format!(
            "'{}' in parents and trashed = false",
            escape_query_literal(folder_id)
        );
        self.list(token, &query, page_size).await
    }

    async fn download(&self, token: &str, file_id: &str) -> Result<Vec<u8>, GatewayError> {
        let request = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(token)
            .query(&[("alt", "media")]);
        self.fetch_bytes(request, "files.get").await
    }

    async fn export(
        &self,
        token: &str,
        file_id: &str,
        mime_type: &str,
    ) -> Result<Vec<u8>, GatewayError> {
        let request = self
            .http
            .get(format!("{}/files/{}/export", self.api_base, file_id))
            .bearer_auth(token)
            .query(&[("mimeType", mime_type)]);
        self.fetch_bytes(request, "files.export").await
    }

    async fn create(
        &self,
        token: &str,
        name: &str,
        parent_id: Option<&str>,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<DriveFile, GatewayError> {
        let mut metadata = serde_json::json!({
            "name": name,
            "mimeType": mime_type,
        });
        if let Some(parent) = parent_id {
            metadata["parents"] = serde_json::json!([parent]);
        }

        let (boundary, body) = multipart_body(&metadata, mime_type, &data);

        let response = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(token)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("files.create送信失敗: {e}")))?;

        json_or_error(response, "files.create").await
    }

    async fn update_content(
        &self,
        token: &str,
        file_id: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<DriveFile, GatewayError> {
        let response = self
            .http
            .patch(format!("{}/files/{}", self.upload_base, file_id))
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, mime_type)
            .query(&[("uploadType", "media"), ("fields", FILE_FIELDS)])
            .body(data)
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("files.update送信失敗: {e}")))?;

        json_or_error(response, "files.update").await
    }
}
