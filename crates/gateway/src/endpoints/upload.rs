//! # POST /asset-sync/upload — 二段階アップロード
//!
//! 署名付きケーパビリティトークンによるアップロードプロトコル。
//!
//! - 準備フェーズ（クエリに `token` なし）: 認証・入力検証・重複確認を行い、
//!   短命トークンを埋め込んだアップロードURLを発行する。
//! - 実行フェーズ（クエリに `token` あり）: トークンとユーザーを再検証し、
//!   生のボディをバイト上限付きでストレージへストリーミングする。
//!
//! どちらのフェーズでも、検証ゲートで失敗した場合はストレージを変更しない。
//! 存在確認とputの間の競合は排除されない（意図的に狭めるだけ）。

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::TryStreamExt;
use tokio_util::io::StreamReader;

use asset_sync_types::{
    AssetDescriptor, UploadCompleteResponse, UploadIntentFields, UploadIntentRequest,
    UploadIntentResponse,
};

use super::{require_store, UPLOAD_CORS};
use crate::auth;
use crate::config::{AppState, CACHE_CONTROL_IMMUTABLE};
use crate::error::ApiError;
use crate::limit::ByteCeiling;
use crate::mime;
use crate::policy;
use crate::storage::PutMetadata;
use crate::token::TokenSigner;

/// 準備フェーズのJSONボディの上限。
const INTENT_BODY_LIMIT: usize = 64 * 1024;

/// サイズ乖離を警告する閾値（バイト）。
const SIZE_MISMATCH_TOLERANCE: u64 = 1024;

// ---------------------------------------------------------------------------
// フェーズ判別
// ---------------------------------------------------------------------------

/// リクエストのフェーズ。クエリ文字列から一度だけデコードする。
#[derive(Debug, PartialEq, Eq)]
enum UploadPhase {
    /// トークン発行（準備）
    Intent,
    /// トークン引き換え（実行）
    Execution {
        token: String,
        expires: String,
        signature: String,
    },
}

impl UploadPhase {
    /// クエリ文字列からフェーズを判別する。`token` の有無のみで分岐し、
    /// `expires`/`signature` の欠落はトークン検証の失敗として扱われる。
    fn from_query(query: Option<&str>) -> Self {
        let mut token = None;
        let mut expires = None;
        let mut signature = None;
        if let Some(query) = query {
            for pair in query.split('&') {
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                match name {
                    "token" => token = Some(value.to_string()),
                    "expires" => expires = Some(value.to_string()),
                    "signature" => signature = Some(value.to_string()),
                    _ => {}
                }
            }
        }
        match token {
            Some(token) => UploadPhase::Execution {
                token,
                expires: expires.unwrap_or_default(),
                signature: signature.unwrap_or_default(),
            },
            None => UploadPhase::Intent,
        }
    }
}

// ---------------------------------------------------------------------------
// ハンドラ
// ---------------------------------------------------------------------------

/// POST /asset-sync/upload — フェーズを判別して処理を振り分ける。
pub async fn handle_upload(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, ApiError> {
    match UploadPhase::from_query(request.uri().query()) {
        UploadPhase::Intent => handle_intent(state, request).await,
        UploadPhase::Execution {
            token,
            expires,
            signature,
        } => handle_execution(state, request, token, expires, signature).await,
    }
}

/// OPTIONS /asset-sync/upload — CORSプリフライト。
pub async fn handle_upload_preflight() -> impl IntoResponse {
    (StatusCode::NO_CONTENT, UPLOAD_CORS)
}

/// 準備フェーズ: 検証を通過した内容を記述子に束ね、トークンを発行する。
async fn handle_intent(state: Arc<AppState>, request: Request) -> Result<Response, ApiError> {
    let store = require_store(&state)?;
    let signer = require_signer(&state)?;

    let content_type = header_str(&request, "content-type")
        .unwrap_or("")
        .to_ascii_lowercase();
    if !content_type.contains("application/json") {
        return Err(ApiError::Policy("Unsupported media type".to_string()));
    }

    let bearer = auth::extract_bearer(header_str(&request, "authorization"))
        .ok_or_else(|| ApiError::Auth("Missing Authorization bearer token".to_string()))?;
    let identity = state.identity.introspect(&bearer).await?;

    let bytes = axum::body::to_bytes(request.into_body(), INTENT_BODY_LIMIT)
        .await
        .map_err(|_| ApiError::Validation("Invalid JSON body".to_string()))?;
    let body: UploadIntentRequest = serde_json::from_slice(&bytes)
        .map_err(|_| ApiError::Validation("Invalid JSON body".to_string()))?;

    let key = sanitize_key(&body.key)
        .ok_or_else(|| ApiError::Validation("Invalid or empty key".to_string()))?;
    let relative_path = sanitize_key(&body.relative_path)
        .ok_or_else(|| ApiError::Validation("Invalid relative_path".to_string()))?;

    let declared_size = parse_size(&body.file_size)
        .ok_or_else(|| ApiError::Validation("Invalid file size".to_string()))?;
    if declared_size == 0 {
        return Err(ApiError::Validation(
            "file_size must be greater than zero".to_string(),
        ));
    }
    if declared_size > state.max_upload_bytes {
        return Err(ApiError::TooLarge(
            "Declared file size exceeds allowed size".to_string(),
        ));
    }

    let file_name = body.file_name.as_deref().and_then(sanitize_file_name);
    let finder_tag = body
        .finder_tag
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let content_type = body
        .content_type
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();

    if policy::violates(
        &[file_name.as_deref(), Some(&key), Some(&relative_path)],
        &state.allowed_extensions,
    ) {
        return Err(ApiError::Policy(
            "This file type is not allowed for upload".to_string(),
        ));
    }

    if store.head(&key).await?.is_some() {
        return Err(ApiError::Conflict("Asset already exists".to_string()));
    }

    let descriptor = AssetDescriptor {
        key: key.clone(),
        relative_path: relative_path.clone(),
        finder_tag,
        declared_size,
        content_type: content_type.clone(),
        user_id: identity.id,
        uploader_email: identity.email,
        file_name: file_name.clone(),
    };
    let issued = signer.create(&descriptor, state.token_ttl_seconds)?;

    let upload_url = format!(
        "{}/asset-sync/upload?token={}&expires={}&signature={}",
        state.public_base_url.trim_end_matches('/'),
        issued.token,
        issued.expires,
        issued.signature,
    );

    tracing::info!(
        key = %key,
        user_id = %descriptor.user_id,
        declared_size,
        "アップロードトークンを発行"
    );

    Ok((
        StatusCode::OK,
        UPLOAD_CORS,
        Json(UploadIntentResponse {
            upload_url,
            expires_at: issued.expires,
            fields: UploadIntentFields {
                key,
                relative_path,
                declared_size,
                file_name,
                content_type,
            },
        }),
    )
        .into_response())
}

/// 実行フェーズ: トークンとユーザーを再検証し、ボディを上限付きで
/// ストレージへストリーミングする。成功時にキー一覧キャッシュを破棄する。
async fn handle_execution(
    state: Arc<AppState>,
    request: Request,
    token: String,
    expires: String,
    signature: String,
) -> Result<Response, ApiError> {
    let store = require_store(&state)?;
    let signer = require_signer(&state)?;

    let descriptor: AssetDescriptor = signer
        .verify(&token, &expires, &signature)
        .ok_or_else(|| ApiError::Forbidden("Invalid or expired upload token".to_string()))?;

    // 漏洩したトークンを別アカウントが引き換えるのを防ぐ。
    let bearer = auth::extract_bearer(header_str(&request, "authorization"))
        .ok_or_else(|| ApiError::Forbidden("Missing Authorization bearer token".to_string()))?;
    let identity = state
        .identity
        .introspect(&bearer)
        .await
        .map_err(|_| ApiError::Forbidden("Invalid or expired session".to_string()))?;
    if identity.id != descriptor.user_id {
        tracing::warn!(
            key = %descriptor.key,
            "トークン発行時と異なるユーザーによる引き換えを拒否"
        );
        return Err(ApiError::Forbidden(
            "Upload token was issued to a different user".to_string(),
        ));
    }

    let content_type = header_str(&request, "content-type")
        .unwrap_or("")
        .to_ascii_lowercase();
    if content_type.contains("multipart/form-data") {
        return Err(ApiError::Policy(
            "Multipart uploads are not supported".to_string(),
        ));
    }

    if let Some(raw) = header_str(&request, "content-length") {
        let length: u64 = raw
            .trim()
            .parse()
            .map_err(|_| ApiError::Validation("Invalid Content-Length header".to_string()))?;
        if length == 0 {
            return Err(ApiError::Validation("Upload payload is missing".to_string()));
        }
        if length > state.max_upload_bytes {
            return Err(ApiError::TooLarge(
                "Uploaded payload exceeds allowed size".to_string(),
            ));
        }
    }

    // 発行時と同じポリシー判定を記述子自身にもう一度適用する。
    if policy::violates(
        &[
            descriptor.file_name.as_deref(),
            Some(&descriptor.key),
            Some(&descriptor.relative_path),
        ],
        &state.allowed_extensions,
    ) {
        return Err(ApiError::Policy(
            "This file type is not allowed for upload".to_string(),
        ));
    }

    if store.head(&descriptor.key).await?.is_some() {
        return Err(ApiError::Conflict("Asset already exists".to_string()));
    }

    let stored_content_type = mime::resolve_content_type(
        &[descriptor.file_name.as_deref(), Some(&descriptor.key)],
        &descriptor.content_type,
    );

    let mut custom = vec![
        ("relative_path".to_string(), descriptor.relative_path.clone()),
        ("uploaded_by".to_string(), descriptor.user_id.clone()),
        (
            "declared_size".to_string(),
            descriptor.declared_size.to_string(),
        ),
    ];
    if let Some(tag) = &descriptor.finder_tag {
        custom.push(("finder_tag".to_string(), tag.clone()));
    }
    if let Some(name) = &descriptor.file_name {
        custom.push(("file_name".to_string(), name.clone()));
    }
    if let Some(email) = &descriptor.uploader_email {
        custom.push(("uploader_email".to_string(), email.clone()));
    }
    let meta = PutMetadata {
        content_type: stored_content_type,
        cache_control: CACHE_CONTROL_IMMUTABLE.to_string(),
        custom,
    };

    // 宣言サイズは信頼せず、実ストリームに独立した上限を課す。
    let stream = request
        .into_body()
        .into_data_stream()
        .map_err(std::io::Error::other);
    let guarded = ByteCeiling::new(stream, state.max_upload_bytes);
    let tripped = guarded.tripped();
    let mut reader = StreamReader::new(guarded);

    let stored_size = match store.put_stream(&descriptor.key, &mut reader, &meta).await {
        Ok(size) => size,
        Err(err) => {
            // 中断時に部分オブジェクトを残さない。
            if let Err(cleanup) = store.delete(&descriptor.key).await {
                tracing::debug!(
                    key = %descriptor.key,
                    error = %cleanup,
                    "部分オブジェクトの削除に失敗"
                );
            }
            if tripped.load(Ordering::SeqCst) {
                return Err(ApiError::TooLarge(
                    "Uploaded payload exceeds allowed size".to_string(),
                ));
            }
            tracing::error!(key = %descriptor.key, error = %err, "ストレージへの書き込みに失敗");
            return Err(ApiError::Storage(
                "Failed to store uploaded object".to_string(),
            ));
        }
    };

    if stored_size == 0 {
        if let Err(cleanup) = store.delete(&descriptor.key).await {
            tracing::debug!(
                key = %descriptor.key,
                error = %cleanup,
                "空オブジェクトの削除に失敗"
            );
        }
        return Err(ApiError::Validation("Upload payload is missing".to_string()));
    }

    if stored_size.abs_diff(descriptor.declared_size) > SIZE_MISMATCH_TOLERANCE {
        tracing::warn!(
            key = %descriptor.key,
            declared = descriptor.declared_size,
            stored = stored_size,
            "宣言サイズと保存サイズが乖離"
        );
    }

    state.key_cache.invalidate().await;

    tracing::info!(key = %descriptor.key, size = stored_size, "アセットを保存");

    Ok((
        StatusCode::OK,
        UPLOAD_CORS,
        Json(UploadCompleteResponse {
            key: descriptor.key,
            size: stored_size,
        }),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// ヘルパー
// ---------------------------------------------------------------------------

/// トークン署名器の取得。シークレット未設定なら500。
fn require_signer(state: &AppState) -> Result<&TokenSigner, ApiError> {
    state.signer.as_ref().ok_or_else(|| {
        ApiError::Internal("Upload signing secret is not configured".to_string())
    })
}

/// ヘッダー値を文字列として取得する。
fn header_str<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}

/// オブジェクトキーをサニタイズする（パストラバーサル対策）。
/// バックスラッシュをスラッシュに正規化し、先頭のスラッシュを除去する。
/// 空または `..` を含む場合は `None`。
fn sanitize_key(input: &str) -> Option<String> {
    let normalized = input.replace('\\', "/");
    let normalized = normalized.trim_start_matches('/');
    if normalized.is_empty() || normalized.contains("..") {
        return None;
    }
    Some(normalized.to_string())
}

/// ファイル名をサニタイズする。パス区切りを除いたベース名とし、
/// 制御文字を取り除く。
fn sanitize_file_name(input: &str) -> Option<String> {
    let normalized = input.replace('\\', "/");
    let candidate = normalized.rsplit('/').next()?.trim();
    if candidate.is_empty() {
        return None;
    }
    let cleaned: String = candidate.chars().filter(|c| !c.is_control()).collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// 宣言サイズをパースする。数値と数値文字列の両方を受け付ける。
fn parse_size(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// テスト
// ---------------------------------------------------------------------------
