//! # ドキュメント操作
//!
//! `/drive/*` と `/edit-markdown` が共有する読み取り・upsert処理。
//! ストア呼び出しの組み立てとMIMEタイプの解決のみを行い、認証には関与しない。

use docgate_types::WriteStatus;

use crate::error::GatewayError;
use crate::locks::NameLocks;
use crate::mime::{export_type_for, is_native_document, upload_type_for};
use crate::storage::{DocumentStore, DriveFile};

/// ファイルの内容をUTF-8テキストとして取得する。
///
/// ネイティブドキュメントはエクスポート表に従って変換し、
/// 表にないネイティブ形式とUTF-8として不正な内容は `UnsupportedFormat` とする。
pub async fn read_text(
    store: &dyn DocumentStore,
    token: &str,
    file: &DriveFile,
) -> Result<String, GatewayError> {
    let bytes = if is_native_document(&file.mime_type) {
        let export_type = export_type_for(&file.mime_type).ok_or_else(|| {
            GatewayError::UnsupportedFormat(format!(
                "{} ({}) はテキストとしてエクスポートできません",
                file.name, file.mime_type
            ))
        })?;
        store.export(token, &file.id, export_type).await?
    } else {
        store.download(token, &file.id).await?
    };

    String::from_utf8(bytes).map_err(|e| {
        GatewayError::UnsupportedFormat(format!(
            "{} はUTF-8テキストではありません: {e}",
            file.name
        ))
    })
}

/// 名前で検索し、存在すれば内容を置換、なければ新規作成する。
///
/// `parent_id` が `None` の場合はフォルダを問わず検索し、ルートに作成する。
pub async fn upsert_text(
    store: &dyn DocumentStore,
    locks: &NameLocks,
    token: &str,
    name: &str,
    parent_id: Option<&str>,
    content: String,
) -> Result<(WriteStatus, DriveFile), GatewayError> {
    let _guard = locks.lock(name).await;
    let mime_type = upload_type_for(name);

    match store.find_by_name(token, name, parent_id).await? {
        Some(existing) => {
            let updated = store
                .update_content(token, &existing.id, mime_type, content.into_bytes())
                .await?;
            Ok((WriteStatus::Updated, updated))
        }
        None => {
            let created = store
                .create(token, name, parent_id, mime_type, content.into_bytes())
                .await?;
            Ok((WriteStatus::Created, created))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_upsert_creates_then_updates_same_id() {
        let store = MemoryStore::new();
        let locks = NameLocks::new();

        let (status, first) = upsert_text(&store, &locks, "t", "a.md", Some("f"), "one".into())
            .await
            .unwrap();
        assert_eq!(status, WriteStatus::Created);
        assert_eq!(first.mime_type, "text/markdown");

        let (status, second) = upsert_text(&store, &locks, "t", "a.md", Some("f"), "two".into())
            .await
            .unwrap();
        assert_eq!(status, WriteStatus::Updated);
        assert_eq!(second.id, first.id);
        assert_eq!(store.len().await, 1);
        assert_eq!(read_text(&store, "t", &second).await.unwrap(), "two");
    }

    /// 同名の同時書き込みでもファイルが1つしか作られないことを確認
    #[tokio::test]
    async fn test_concurrent_upserts_create_one_file() {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(NameLocks::new());

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            let locks = locks.clone();
            handles.push(tokio::spawn(async move {
                upsert_text(
                    store.as_ref(),
                    &locks,
                    "t",
                    "race.txt",
                    Some("f"),
                    format!("v{i}"),
                )
                .await
                .unwrap()
                .0
            }));
        }

        let mut created = 0;
        for h in handles {
            if h.await.unwrap() == WriteStatus::Created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.len().await, 1);
    }

    /// フォルダ指定の有無にかかわらず同名の書き込みが同じロックを待つことを確認
    #[tokio::test]
    async fn test_folder_and_root_writes_share_lock() {
        let store = MemoryStore::new();
        let locks = NameLocks::new();
        let held = locks.lock("plan.md").await;

        for parent in [Some("f"), None] {
            let pending = tokio::time::timeout(
                std::time::Duration::from_millis(100),
                upsert_text(&store, &locks, "t", "plan.md", parent, "x".into()),
            )
            .await;
            assert!(pending.is_err());
        }
        assert_eq!(store.calls(), 0);

        drop(held);
        let (status, _) = upsert_text(&store, &locks, "t", "plan.md", None, "x".into())
            .await
            .unwrap();
        assert_eq!(status, WriteStatus::Created);
    }

    #[tokio::test]
    async fn test_read_text_exports_native_documents() {
        let store = MemoryStore::new();
        let sheet = store
            .seed(
                "Budget",
                Some("f"),
                "application/vnd.google-apps.spreadsheet",
                b"a,b\n1,2".to_vec(),
            )
            .await;
        assert_eq!(read_text(&store, "t", &sheet).await.unwrap(), "a,b\n1,2");

        // ストアは表にない変換先を拒否するため、文書とスライドはtext/plainで要求されている
        for native in [
            "application/vnd.google-apps.document",
            "application/vnd.google-apps.presentation",
        ] {
            let file = store.seed("Doc", Some("f"), native, b"body".to_vec()).await;
            assert_eq!(read_text(&store, "t", &file).await.unwrap(), "body");
        }

        let form = store
            .seed("Survey", Some("f"), "application/vnd.google-apps.form", vec![])
            .await;
        let err = read_text(&store, "t", &form).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_read_text_rejects_invalid_utf8() {
        let store = MemoryStore::new();
        let blob = store
            .seed("image.bin", Some("f"), "application/octet-stream", vec![0xff, 0xfe, 0x00])
            .await;
        let err = read_text(&store, "t", &blob).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedFormat(_)));
    }
}
