//! # ドキュメントストレージ
//!
//! Gatewayが中継する外部ドキュメントストレージの抽象インターフェース。
//! Google Drive実装は `drive` サブモジュール、ローカル開発・テスト用の
//! インメモリ実装は `memory` サブモジュールを参照。
//!
//! 認証情報はストア自身が保持せず、呼び出しごとにアクセストークンを受け取る。
//! ワークスペース操作（アンビエント認証）と `/edit-markdown`（OAuth）で
//! 同じストアを異なるトークンで使い分けるため。

#[cfg(feature = "vendor-google")]
pub mod drive;
pub mod memory;

#[cfg(feature = "vendor-google")]
pub use drive::DriveClient;
pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use docgate_types::FileSummary;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// ストレージ上のファイルメタデータ（Drive v3 `File` リソースのサブセット）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
    /// バイト数の10進文字列。ネイティブドキュメントでは省略される。
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub trashed: bool,
}

impl DriveFile {
    /// /drive/list 用の要約に変換する。
    pub fn summary(&self) -> FileSummary {
        FileSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            modified_time: self.modified_time.map(|t| t.to_rfc3339()),
            size: self.size.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// ドキュメントストレージの抽象インターフェース。
///
/// 全メソッドは外部APIへの1回の呼び出しに対応し、リトライは行わない。
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// 名前が完全一致するゴミ箱外のファイルのうち、最も新しく更新されたものを返す。
    ///
    /// `parent_id` が `None` の場合はフォルダを問わず検索する。
    async fn find_by_name(
        &self,
        token: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<DriveFile>, GatewayError>;

    /// フォルダ直下のゴミ箱外ファイルを最終更新日時の降順で最大 `page_size` 件返す。
    async fn list_folder(
        &self,
        token: &str,
        folder_id: &str,
        page_size: u32,
    ) -> Result<Vec<DriveFile>, GatewayError>;

    /// ファイル本体をそのままダウンロードする。
    async fn download(&self, token: &str, file_id: &str) -> Result<Vec<u8>, GatewayError>;

    /// ネイティブドキュメントを指定MIMEタイプにエクスポートする。
    async fn export(
        &self,
        token: &str,
        file_id: &str,
        mime_type: &str,
    ) -> Result<Vec<u8>, GatewayError>;

    /// 新規ファイルを作成する。`parent_id` が `None` ならルートに作成する。
    async fn create(
        &self,
        token: &str,
        name: &str,
        parent_id: Option<&str>,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<DriveFile, GatewayError>;

    /// 既存ファイルの本体を置き換える。メタデータは変更しない。
    async fn update_content(
        &self,
        token: &str,
        file_id: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<DriveFile, GatewayError>;
}
