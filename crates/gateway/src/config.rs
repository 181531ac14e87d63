//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//! キャッシュや署名器はモジュールグローバルではなく状態に埋め込み、
//! テストでは独立したインスタンスを構築できるようにする。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::auth::IdentityVerifier;
use crate::cache::KeyCache;
use crate::policy;
use crate::storage::ObjectStore;
use crate::token::TokenSigner;

/// アップロードの上限（200 MiB）。宣言サイズと実ストリームの両方に適用。
pub const MAX_UPLOAD_BYTES: u64 = 200 * 1024 * 1024;

/// アップロードトークンのTTL（秒）。プロトコル中唯一のタイムアウト。
pub const SIGNED_URL_TTL_SECONDS: u64 = 120;

/// 保存オブジェクトに付与するCache-Control。
pub const CACHE_CONTROL_IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// 外部IDプロバイダへのリクエストタイムアウト（秒）。
const IDENTITY_TIMEOUT_SECONDS: u64 = 10;

/// 現在時刻をUNIX秒で返す。
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Gatewayの共有状態。
pub struct AppState {
    /// オブジェクトストア。未設定の場合、各エンドポイントは503を返す。
    pub store: Option<Arc<dyn ObjectStore>>,
    /// トークン署名器。シークレット未設定の場合、アップロードは500を返す。
    pub signer: Option<TokenSigner>,
    /// 外部IDプロバイダ
    pub identity: IdentityVerifier,
    /// 許可する拡張子の集合
    pub allowed_extensions: HashSet<String>,
    /// キー一覧キャッシュ
    pub key_cache: KeyCache,
    /// アップロードURLを組み立てる際のベースURL
    pub public_base_url: String,
    /// アップロードの上限バイト数
    pub max_upload_bytes: u64,
    /// トークンのTTL（秒）
    pub token_ttl_seconds: u64,
}

impl AppState {
    /// 環境変数から共有状態を構築する。
    pub fn from_env() -> anyhow::Result<Arc<Self>> {
        #[cfg(feature = "vendor-aws")]
        let store: Option<Arc<dyn ObjectStore>> =
            Some(Arc::new(crate::storage::S3Store::from_env()?));
        #[cfg(not(feature = "vendor-aws"))]
        let store: Option<Arc<dyn ObjectStore>> = {
            tracing::warn!("ストレージバックエンドが無効化されています（vendor-aws機能なし）");
            None
        };

        let signer = match std::env::var("ASSET_UPLOAD_SIGNING_SECRET") {
            Ok(secret) if !secret.is_empty() => Some(TokenSigner::new(&secret)?),
            _ => {
                tracing::warn!(
                    "ASSET_UPLOAD_SIGNING_SECRETが未設定です。アップロードAPIは500を返します"
                );
                None
            }
        };

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(IDENTITY_TIMEOUT_SECONDS))
            .build()?;
        let identity = IdentityVerifier::new(
            http_client,
            std::env::var("AUTH_BASE_URL").unwrap_or_default(),
            std::env::var("AUTH_API_KEY").unwrap_or_default(),
        );

        let allowed_extensions =
            policy::resolve_allowed(&[std::env::var("ASSET_SYNC_ALLOWED_EXTENSIONS").ok()]);

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Arc::new(Self {
            store,
            signer,
            identity,
            allowed_extensions,
            key_cache: KeyCache::new(),
            public_base_url,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            token_ttl_seconds: SIGNED_URL_TTL_SECONDS,
        }))
    }
}
