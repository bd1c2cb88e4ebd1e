//! # ファイル名単位の書き込みロック
//!
//! 「検索してから作成/更新」は外部APIに対してトランザクションにならないため、
//! 同一プロセス内ではファイル名ごとに書き込みを直列化する。
//! `/edit-markdown` はフォルダを問わず名前で検索するため、フォルダはキーに含めない。
//! 複数プロセス間の競合は防げない。

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// ファイル名をキーとする非同期ロック表。
#[derive(Default)]
pub struct NameLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// ロック保持中のガード。破棄時に待機者がいなければ表から取り除く。
pub struct NameGuard<'a> {
    owner: &'a NameLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定ファイル名のロックを取得するまで待機する。
    pub async fn lock(&self, name: &str) -> NameGuard<'_> {
        let key = name.to_string();
        // DashMapのシャードロックをawaitまで持ち越さない
        let mutex = self.locks.entry(key.clone()).or_default().value().clone();
        let guard = mutex.lock_owned().await;
        NameGuard {
            owner: self,
            key,
            guard: Some(guard),
        }
    }

    /// 表に残っているキーの数。
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.owner
            .locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
