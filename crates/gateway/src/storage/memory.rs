//! # インメモリ ドキュメントストレージ
//!
//! `MOCK_MODE=true` でのローカル起動とテストで使用する。
//! Drive APIと同じく名前の一意性は保証せず、検索は最終更新日時の降順で行う。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use super::{DocumentStore, DriveFile};
use crate::error::GatewayError;
use crate::mime::{export_type_for, is_native_document};

struct StoredFile {
    meta: DriveFile,
    data: Vec<u8>,
}

#[derive(Default)]
struct Inner {
    files: HashMap<String, StoredFile>,
    /// 直前に払い出した更新日時。同一時刻の衝突を避けるため単調増加させる。
    last_modified: Option<DateTime<Utc>>,
}

impl Inner {
    fn next_modified_time(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_modified {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_modified = Some(next);
        next
    }
}

/// インメモリ実装。
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// これまでに受けたストア操作の回数。
    #[cfg(test)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 保持しているファイル数（ゴミ箱内を含む）。
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.files.len()
    }

    /// 任意のMIMEタイプでファイルを直接配置する（ネイティブドキュメントの再現用）。
    /// ネイティブドキュメントの `data` はエクスポート結果として扱われる。
    pub async fn seed(
        &self,
        name: &str,
        parent_id: Option<&str>,
        mime_type: &str,
        data: Vec<u8>,
    ) -> DriveFile {
        let mut inner = self.inner.write().await;
        let modified = inner.next_modified_time();
        let meta = DriveFile {
            id: uuid::Uuid::new_v4().simple().to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            modified_time: Some(modified),
            size: (!is_native_document(mime_type)).then(|| data.len().to_string()),
            parents: parent_id.map(|p| vec![p.to_string()]).unwrap_or_default(),
            trashed: false,
        };
        inner.files.insert(
            meta.id.clone(),
            StoredFile {
                meta: meta.clone(),
                data,
            },
        );
        meta
    }

    /// ファイルをゴミ箱に移動する。
    #[cfg(test)]
    pub async fn trash(&self, file_id: &str) {
        if let Some(file) = self.inner.write().await.files.get_mut(file_id) {
            file.meta.trashed = true;
        }
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn not_found(file_id: &str) -> GatewayError {
        GatewayError::Storage(format!("ファイルID {file_id} は存在しません"))
    }
}

/// 最終更新日時の降順に並べる。
fn newest_first(files: &mut [DriveFile]) {
    files.sort_by(|a, b| b.modified_time.cmp(&a.modified_time));
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn find_by_name(
        &self,
        _token: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<DriveFile>, GatewayError> {
        self.record_call();
        let inner = self.inner.read().await;
        let mut matches: Vec<DriveFile> = inner
            .files
            .values()
            .map(|f| &f.meta)
            .filter(|m| !m.trashed && m.name == name)
            .filter(|m| parent_id.map_or(true, |p| m.parents.iter().any(|x| x == p)))
            .cloned()
            .collect();
        newest_first(&mut matches);
        Ok(matches.into_iter().next())
    }

    async fn list_folder(
        &self,
        _token: &str,
        folder_id: &str,
        page_size: u32,
    ) -> Result<Vec<DriveFile>, GatewayError> {
        self.record_call();
        let inner = self.inner.read().await;
        let mut files: Vec<DriveFile> = inner
            .files
            .values()
            .map(|f| &f.meta)
            .filter(|m| !m.trashed && m.parents.iter().any(|p| p == folder_id))
            .cloned()
            .collect();
        newest_first(&mut files);
        files.truncate(page_size as usize);
        Ok(files)
    }

    async fn download(&self, _token: &str, file_id: &str) -> Result<Vec<u8>, GatewayError> {
        self.record_call();
        let inner = self.inner.read().await;
        let file = inner
            .files
            .get(file_id)
            .ok_or_else(|| Self::not_found(file_id))?;
        if is_native_document(&file.meta.mime_type) {
            return Err(GatewayError::Storage(
                "Only files with binary content can be downloaded. Use Export with Docs Editors files."
                    .to_string(),
            ));
        }
        Ok(file.data.clone())
    }

    async fn export(
        &self,
        _token: &str,
        file_id: &str,
        mime_type: &str,
    ) -> Result<Vec<u8>, GatewayError> {
        self.record_call();
        let inner = self.inner.read().await;
        let file = inner
            .files
            .get(file_id)
            .ok_or_else(|| Self::not_found(file_id))?;
        // エクスポート表にない変換先はDriveと同様に拒否する
        if export_type_for(&file.meta.mime_type) != Some(mime_type) {
            return Err(GatewayError::Storage(format!(
                "Export to {mime_type} is not supported for {}",
                file.meta.mime_type
            )));
        }
        Ok(file.data.clone())
    }

    async fn create(
        &self,
        _token: &str,
        name: &str,
        parent_id: Option<&str>,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<DriveFile, GatewayError> {
        self.record_call();
        Ok(self.seed(name, parent_id, mime_type, data).await)
    }

    async fn update_content(
        &self,
        _token: &str,
        file_id: &str,
        _mime_type: &str,
        data: Vec<u8>,
    ) -> Result<DriveFile, GatewayError> {
        self.record_call();
        let mut inner = self.inner.write().await;
        let modified = inner.next_modified_time();
        let file = inner
            .files
            .get_mut(file_id)
            .ok_or_else(|| Self::not_found(file_id))?;
        file.meta.modified_time = Some(modified);
        file.meta.size = Some(data.len().to_string());
        file.data = data;
        Ok(file.meta.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_prefers_newest_and_skips_trashed() {
        let store = MemoryStore::new();
        let old = store.seed("a.md", Some("f"), "text/markdown", b"old".to_vec()).await;
        let new = store.seed("a.md", Some("f"), "text/markdown", b"new".to_vec()).await;

        let found = store.find_by_name("t", "a.md", Some("f")).await.unwrap().unwrap();
        assert_eq!(found.id, new.id);

        store.trash(&new.id).await;
        let found = store.find_by_name("t", "a.md", Some("f")).await.unwrap().unwrap();
        assert_eq!(found.id, old.id);

        assert!(store.find_by_name("t", "a.md", Some("other")).await.unwrap().is_none());
        assert!(store.find_by_name("t", "a.md", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_folder_orders_and_caps() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .seed(&format!("{i}.txt"), Some("f"), "text/plain", vec![])
                .await;
        }
        store.seed("elsewhere.txt", Some("g"), "text/plain", vec![]).await;

        let files = store.list_folder("t", "f", 3).await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["4.txt", "3.txt", "2.txt"]);
    }

    #[tokio::test]
    async fn test_native_document_cannot_be_downloaded() {
        let store = MemoryStore::new();
        let doc = store
            .seed(
                "Plan",
                Some("f"),
                "application/vnd.google-apps.document",
                b"exported".to_vec(),
            )
            .await;
        assert!(doc.size.is_none());
        assert!(store.download("t", &doc.id).await.is_err());
        assert_eq!(
            store.export("t", &doc.id, "text/plain").await.unwrap(),
            b"exported"
        );
    }

    #[tokio::test]
    async fn test_export_requires_table_mime_type() {
        let store = MemoryStore::new();
        let sheet = store
            .seed(
                "Budget",
                Some("f"),
                "application/vnd.google-apps.spreadsheet",
                b"a,b".to_vec(),
            )
            .await;
        assert!(store.export("t", &sheet.id, "text/plain").await.is_err());
        assert_eq!(store.export("t", &sheet.id, "text/csv").await.unwrap(), b"a,b");

        let text = store.seed("a.txt", Some("f"), "text/plain", b"x".to_vec()).await;
        assert!(store.export("t", &text.id, "text/plain").await.is_err());
    }
}
