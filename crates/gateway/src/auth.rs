//! # 外部IDプロバイダによる認証
//!
//! `Authorization: Bearer` トークンの抽出と、外部IDプロバイダに対する
//! イントロスペクション。検証結果のIdentityは保存せず、比較にのみ使う。

use asset_sync_types::Identity;

use crate::error::ApiError;

/// AuthorizationヘッダーからBearerトークンを抽出する。
/// スキームは大文字小文字を区別しない。
pub fn extract_bearer(header: Option<&str>) -> Option<String> {
    let header = header?.trim();
    let mut parts = header.split_whitespace();
    let scheme = parts.next()?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        return None;
    }
    Some(rest.join(" "))
}

/// 外部IDプロバイダへの問い合わせクライアント。
pub struct IdentityVerifier {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl IdentityVerifier {
    /// ベースURLとAPIキーから構築する。
    /// HTTPクライアントはタイムアウト設定済みのものを渡す。
    pub fn new(http_client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Bearerトークンをイントロスペクトし、成功時にIdentityを返す。
    /// プロバイダ未設定・非成功ステータス・パース失敗はいずれも認証エラー。
    pub async fn introspect(&self, bearer: &str) -> Result<Identity, ApiError> {
        if self.base_url.is_empty() {
            tracing::error!("IDプロバイダのベースURLが設定されていません");
            return Err(ApiError::Auth("Identity provider is not configured".to_string()));
        }

        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.api_key)
            .header("authorization", format!("Bearer {bearer}"))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "IDプロバイダへの問い合わせに失敗");
                ApiError::Auth("Identity validation failed".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "IDプロバイダがセッションを拒否");
            return Err(ApiError::Auth("Invalid or expired session".to_string()));
        }

        response
            .json::<Identity>()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Identityレスポンスのパースに失敗");
                ApiError::Auth("Invalid identity response".to_string())
            })
    }
}
