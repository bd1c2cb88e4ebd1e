//! # docgate 共有型定義
//!
//! Gatewayの各エンドポイントが受け渡すJSON構造をRust構造体として提供する。
//!
//! ## 命名規則
//! - `/drive/*` 系: snake_case（`filename`, `file_id`）
//! - Drive API由来のファイル情報: camelCase（`modifiedTime`, `mimeType`）
//! - `/edit-markdown`: camelCase（`fileName`）

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /drive/read
// ---------------------------------------------------------------------------

/// /drive/read リクエスト。
///
/// 必須項目の欠落をハンドラ側で400として扱うため、全フィールドを `Option` で受ける。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadRequest {
    /// ワークスペースフォルダ内のファイル名
    #[serde(default)]
    pub filename: Option<String>,
}

/// /drive/read レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResponse {
    /// 読み取ったファイル名
    pub filename: String,
    /// UTF-8テキストとしての内容
    pub content: String,
}

// ---------------------------------------------------------------------------
// /drive/write
// ---------------------------------------------------------------------------

/// /drive/write リクエスト。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteRequest {
    /// 書き込み先ファイル名
    #[serde(default)]
    pub filename: Option<String>,
    /// 書き込む内容（空文字列は可、欠落は不可）
    #[serde(default)]
    pub content: Option<String>,
}

/// upsertの結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteStatus {
    /// 新規作成
    Created,
    /// 既存ファイルの内容を置換
    Updated,
}

/// /drive/write レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResponse {
    pub status: WriteStatus,
    /// Driveが割り当てたファイルID
    pub file_id: String,
}

// ---------------------------------------------------------------------------
// /drive/list
// ---------------------------------------------------------------------------

/// 一覧の1エントリ。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub id: String,
    pub name: String,
    /// 最終更新日時（RFC 3339）
    pub modified_time: Option<String>,
    /// サイズ（バイト、10進文字列）。ネイティブドキュメントには存在しない。
    pub size: Option<String>,
    pub mime_type: String,
}

/// /drive/list レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub count: usize,
    /// 最終更新日時の降順
    pub files: Vec<FileSummary>,
}

// ---------------------------------------------------------------------------
// /edit-markdown
// ---------------------------------------------------------------------------

/// /edit-markdown リクエスト。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMarkdownRequest {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// /edit-markdown レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditMarkdownResponse {
    pub success: bool,
    pub message: String,
}

// ---------------------------------------------------------------------------
// エラー
// ---------------------------------------------------------------------------

/// 全エンドポイント共通のエラーレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// エラー種別（snake_case）
    #[serde(rename = "type")]
    pub kind: String,
    /// 人間向けのメッセージ
    pub message: String,
}
