//! # Asset Sync Gateway
//!
//! S3互換ストレージへのアセットアップロードを仲介するGateway。
//!
//! ## 役割
//! - 外部IDプロバイダによるクライアント認証
//! - 二段階（準備・実行）アップロードプロトコルのトークン発行と検証
//! - アップロードストリームへのバイト上限の適用
//! - オブジェクトキー一覧のTTLキャッシュ付き提供
//!
//! ## API エンドポイント
//! - `POST /asset-sync/upload` — 準備（トークン発行）/ 実行（ボディ保存）
//! - `GET /asset-sync/keys` — キー一覧
//! - `GET /asset-sync/mime` — 拡張子とMIMEタイプの対応表

mod auth;
mod cache;
mod config;
mod endpoints;
mod error;
mod limit;
mod mime;
mod policy;
mod storage;
mod token;

use endpoints::{
    handle_keys, handle_keys_preflight, handle_mime, handle_upload, handle_upload_preflight,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let state = config::AppState::from_env()?;

    let app = axum::Router::new()
        .route(
            "/asset-sync/upload",
            axum::routing::post(handle_upload).options(handle_upload_preflight),
        )
        .route(
            "/asset-sync/keys",
            axum::routing::get(handle_keys).options(handle_keys_preflight),
        )
        .route("/asset-sync/mime", axum::routing::get(handle_mime))
        .with_state(state);

    let addr =
        std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    tracing::info!("Gatewayを {} で起動します", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
