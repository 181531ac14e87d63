//! エンドポイントテスト用の共有ヘルパー。
//! インメモリのオブジェクトストアとモックIDプロバイダを提供する。

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use axum::response::IntoResponse;
use axum::response::Response;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;

use crate::auth::IdentityVerifier;
use crate::cache::KeyCache;
use crate::config::{AppState, SIGNED_URL_TTL_SECONDS};
use crate::error::ApiError;
use crate::policy;
use crate::storage::{KeyPage, ObjectMeta, ObjectStore, PutMetadata};
use crate::token::TokenSigner;

/// MemoryStoreに保存されたオブジェクト。
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
    pub cache_control: String,
    pub custom: Vec<(String, String)>,
}

/// テスト用のインメモリオブジェクトストア。
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    /// 保存済みオブジェクトを取得する（検証用）。
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, ApiError> {
        Ok(self.objects.lock().await.get(key).map(|o| ObjectMeta {
            size: o.data.len() as u64,
        }))
    }

    async fn put_stream(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        meta: &PutMetadata,
    ) -> Result<u64, ApiError> {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .await
            .map_err(|e| ApiError::Storage(e.to_string()))?;
        let size = data.len() as u64;
        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: meta.content_type.clone(),
                cache_control: meta.cache_control.clone(),
                custom: meta.custom.clone(),
            },
        );
        Ok(size)
    }

    async fn list_page(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<KeyPage, ApiError> {
        let objects = self.objects.lock().await;
        let keys: Vec<String> = match &cursor {
            Some(after) => objects
                .range::<String, _>((
                    std::ops::Bound::Excluded(after.clone()),
                    std::ops::Bound::Unbounded,
                ))
                .map(|(k, _)| k.clone())
                .take(limit)
                .collect(),
            None => objects.keys().take(limit).cloned().collect(),
        };
        let cursor = if keys.len() == limit {
            keys.last().cloned()
        } else {
            None
        };
        Ok(KeyPage { keys, cursor })
    }

    async fn delete(&self, key: &str) -> Result<(), ApiError> {
        self.objects.lock().await.remove(key);
        Ok(())
    }
}

/// モックIDプロバイダを起動し、ポート番号を返す。
/// Authorizationヘッダーを持つリクエストに固定のIdentityを返す。
pub async fn start_mock_identity(id: &str, email: &str) -> u16 {
    let id = id.to_string();
    let email = email.to_string();
    let app = axum::Router::new().route(
        "/auth/v1/user",
        axum::routing::get(move |headers: axum::http::HeaderMap| {
            let id = id.clone();
            let email = email.clone();
            async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.starts_with("Bearer "))
                    .unwrap_or(false);
                if authorized {
                    axum::Json(serde_json::json!({
                        "id": id,
                        "email": email,
                        "aud": "authenticated"
                    }))
                    .into_response()
                } else {
                    axum::http::StatusCode::UNAUTHORIZED.into_response()
                }
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    port
}

/// テスト用の共有状態を構築する。
pub fn test_state(store: Arc<MemoryStore>, identity_port: u16, max_upload_bytes: u64) -> Arc<AppState> {
    let allowed: HashSet<String> = policy::resolve_allowed(&[]);
    let signer = TokenSigner::new("test-secret").unwrap();
    Arc::new(AppState {
        store: Some(store),
        signer: Some(signer),
        identity: IdentityVerifier::new(
            reqwest::Client::new(),
            format!("http://127.0.0.1:{identity_port}"),
            "anon-key".to_string(),
        ),
        allowed_extensions: allowed,
        key_cache: KeyCache::new(),
        public_base_url: "http://localhost:3000".to_string(),
        max_upload_bytes,
        token_ttl_seconds: SIGNED_URL_TTL_SECONDS,
    })
}

/// レスポンスのJSONボディをパースする。
pub async fn response_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
