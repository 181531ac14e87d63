//! # Gatewayエンドポイント
//!
//! ルートごとのハンドラと、CORS・共有状態まわりの共通ヘルパー。

pub mod keys;
pub mod upload;

#[cfg(test)]
pub mod test_helpers;

pub use keys::{handle_keys, handle_keys_preflight, handle_mime};
pub use upload::{handle_upload, handle_upload_preflight};

use std::sync::Arc;

use crate::config::AppState;
use crate::error::ApiError;
use crate::storage::ObjectStore;

/// アップロードAPIのCORSヘッダー。
pub(crate) const UPLOAD_CORS: [(&str, &str); 3] = [
    ("access-control-allow-origin", "*"),
    ("access-control-allow-methods", "POST,OPTIONS"),
    ("access-control-allow-headers", "authorization,content-type"),
];

/// キー一覧APIのCORSヘッダー。
pub(crate) const KEYS_CORS: [(&str, &str); 3] = [
    ("access-control-allow-origin", "*"),
    ("access-control-allow-methods", "GET,OPTIONS"),
    ("access-control-allow-headers", "content-type"),
];

/// オブジェクトストアの取得。未設定なら503。
pub(crate) fn require_store(state: &AppState) -> Result<&Arc<dyn ObjectStore>, ApiError> {
    state
        .store
        .as_ref()
        .ok_or_else(|| ApiError::Configuration("Asset sync bucket is not configured".to_string()))
}
