//! # キー一覧キャッシュ
//!
//! 直近のオブジェクトキー列挙を保持するTTL付きの単一スロット。
//! 更新は常にスロット全体の置き換えで、部分的な変更は行わない。
//! アップロード成功時に明示的に無効化される。

use tokio::sync::RwLock;

use crate::config::now_unix;

/// キャッシュのTTL（1時間）。
pub const KEY_CACHE_TTL_SECONDS: u64 = 60 * 60;

/// キャッシュされたキー列挙のスナップショット。
#[derive(Debug, Clone)]
pub struct KeyCachePayload {
    /// 保存済みオブジェクトキーの一覧
    pub keys: Vec<String>,
    /// 取得時刻（UNIX秒）
    pub refreshed_at: u64,
    /// 有効期限（UNIX秒）
    pub expires_at: u64,
}

/// キー一覧キャッシュ。共有状態に埋め込み、テストでは独立に構築できる。
#[derive(Debug, Default)]
pub struct KeyCache {
    slot: RwLock<Option<KeyCachePayload>>,
}

impl KeyCache {
    /// 空のキャッシュを構築する。
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// 失効前のエントリがあればそのクローンを返す。
    pub async fn get(&self) -> Option<KeyCachePayload> {
        let guard = self.slot.read().await;
        guard
            .as_ref()
            .filter(|entry| now_unix() < entry.expires_at)
            .cloned()
    }

    /// キャッシュを新しいキー列挙で置き換え、格納したスナップショットを返す。
    pub async fn set(&self, keys: Vec<String>) -> KeyCachePayload {
        let refreshed_at = now_unix();
        let payload = KeyCachePayload {
            keys,
            refreshed_at,
            expires_at: refreshed_at + KEY_CACHE_TTL_SECONDS,
        };
        let mut guard = self.slot.write().await;
        *guard = Some(payload.clone());
        payload
    }

    /// キャッシュを破棄する。
    pub async fn invalidate(&self) {
        let mut guard = self.slot.write().await;
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// set/get/invalidateの基本動作を確認
    #[tokio::test]
    async fn test_set_get_invalidate() {
        let cache = KeyCache::new();
        assert!(cache.get().await.is_none());

        let stored = cache.set(vec!["a.png".to_string()]).await;
        assert_eq!(stored.keys, vec!["a.png"]);
        assert!(stored.expires_at > stored.refreshed_at);

        let fetched = cache.get().await.expect("キャッシュが返らない");
        assert_eq!(fetched.keys, vec!["a.png"]);

        cache.invalidate().await;
        assert!(cache.get().await.is_none());
    }

    /// 失効済みエントリは返されないことを確認
    #[tokio::test]
    async fn test_expired_entry_not_served() {
        let cache = KeyCache::new();
        {
            let mut guard = cache.slot.write().await;
            *guard = Some(KeyCachePayload {
                keys: vec!["old.png".to_string()],
                refreshed_at: 0,
                expires_at: 1,
            });
        }
        assert!(cache.get().await.is_none());
    }
}
