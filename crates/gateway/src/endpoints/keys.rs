//! # GET /asset-sync/keys — キー一覧
//!
//! バケット内の全オブジェクトキーをページング取得して返す。
//! 結果はプロセス内でTTL付きにキャッシュされ、アップロード成功時に破棄される。

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use asset_sync_types::KeyListingResponse;

use super::{require_store, KEYS_CORS};
use crate::cache::KeyCachePayload;
use crate::config::AppState;
use crate::error::ApiError;
use crate::mime::SAFE_MIME_BY_EXTENSION;

/// 一覧取得の1ページあたりのキー数。
const LIST_PAGE_SIZE: usize = 1000;

/// GET /asset-sync/keys — キャッシュ優先でキー一覧を返す。
pub async fn handle_keys(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let store = require_store(&state)?;

    if let Some(payload) = state.key_cache.get().await {
        tracing::debug!(total = payload.keys.len(), "キャッシュからキー一覧を返却");
        return Ok(listing_response(payload, true));
    }

    let mut keys = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = store.list_page(cursor, LIST_PAGE_SIZE).await?;
        keys.extend(page.keys);
        match page.cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    keys.sort();

    let payload = state.key_cache.set(keys).await;

    tracing::info!(total = payload.keys.len(), "キー一覧を再取得");
    Ok(listing_response(payload, false))
}

/// OPTIONS /asset-sync/keys — CORSプリフライト。
pub async fn handle_keys_preflight() -> impl IntoResponse {
    (StatusCode::NO_CONTENT, KEYS_CORS)
}

/// GET /asset-sync/mime — 拡張子とMIMEタイプの対応表を返す。
pub async fn handle_mime() -> impl IntoResponse {
    let table: serde_json::Map<String, serde_json::Value> = SAFE_MIME_BY_EXTENSION
        .iter()
        .map(|(ext, mime)| ((*ext).to_string(), serde_json::Value::from(*mime)))
        .collect();
    (StatusCode::OK, KEYS_CORS, Json(serde_json::Value::Object(table)))
}

fn listing_response(payload: KeyCachePayload, cached: bool) -> Response {
    let total = payload.keys.len();
    (
        StatusCode::OK,
        KEYS_CORS,
        [("cache-control", "public, max-age=3600")],
        Json(KeyListingResponse {
            keys: payload.keys,
            total,
            refreshed_at: payload.refreshed_at,
            cache_expires_at: payload.expires_at,
            cached,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// テスト
// ---------------------------------------------------------------------------
