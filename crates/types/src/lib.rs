//! # Asset Sync 共有型定義
//!
//! GatewayのHTTP APIで交換されるデータ構造をRust構造体として提供する。
//!
//! ## エンコーディング規則
//! - Base64url（パディングなし）: トークン本体とHMAC署名
//! - UNIX秒: 有効期限・更新時刻などのタイムスタンプ

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// 署名付きケーパビリティトークン
// ---------------------------------------------------------------------------

/// 発行済みの署名付きトークン。発行後は不変。
/// `signature` は `token + "." + expires` に対するHMAC-SHA256。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedToken {
    /// Base64urlエンコードされたペイロード（JSON）
    pub token: String,
    /// 有効期限（UNIX秒）
    pub expires: u64,
    /// Base64urlエンコードされたHMAC-SHA256署名
    pub signature: String,
}

/// トークンにエンコードされるアップロード内容の記述子。
/// 保存先パス・所有者・宣言サイズをひとつの引換可能なケーパビリティに束ねる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// オブジェクトストア上の保存先キー
    pub key: String,
    /// クライアント側の相対パス
    pub relative_path: String,
    /// 任意の分類タグ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finder_tag: Option<String>,
    /// 準備フェーズで宣言されたサイズ（バイト）
    pub declared_size: u64,
    /// 宣言されたContent-Type
    pub content_type: String,
    /// トークン発行時に検証したユーザーID。実行フェーズで再検証される。
    pub user_id: String,
    /// 発行時ユーザーのメールアドレス
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader_email: Option<String>,
    /// サニタイズ済みファイル名（ベース名のみ）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

// ---------------------------------------------------------------------------
// 外部IDプロバイダ
// ---------------------------------------------------------------------------

/// Bearerトークンのイントロスペクション結果。
/// 保存されることはなく、比較にのみ使用する。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// ユーザーID
    pub id: String,
    /// メールアドレス
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// オーディエンス
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

// ---------------------------------------------------------------------------
// アップロードAPI（POST /asset-sync/upload）
// ---------------------------------------------------------------------------

/// 準備フェーズのJSONリクエストボディ。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadIntentRequest {
    /// 保存先キー（サニタイズ前）
    pub key: String,
    /// 相対パス（サニタイズ前）
    pub relative_path: String,
    /// 任意の分類タグ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finder_tag: Option<String>,
    /// 宣言サイズ。文字列・数値の両方を受け付ける。
    #[serde(default)]
    pub file_size: serde_json::Value,
    /// ファイル名（サニタイズ前）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Content-Type。省略時は `application/octet-stream`。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// 準備フェーズで受理されたフィールドのエコー。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadIntentFields {
    pub key: String,
    pub relative_path: String,
    pub declared_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub content_type: String,
}

/// 準備フェーズのレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadIntentResponse {
    /// トークン・有効期限・署名をクエリに含むアップロードURL
    #[serde(rename = "uploadUrl")]
    pub upload_url: String,
    /// トークンの有効期限（UNIX秒）
    #[serde(rename = "expiresAt")]
    pub expires_at: u64,
    /// 受理されたフィールドのエコー
    pub fields: UploadIntentFields,
}

/// 実行フェーズ成功時のレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCompleteResponse {
    /// 保存されたキー
    pub key: String,
    /// 実際に保存されたサイズ（バイト）
    pub size: u64,
}

// ---------------------------------------------------------------------------
// キー一覧API（GET /asset-sync/keys）
// ---------------------------------------------------------------------------

/// キー一覧のレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyListingResponse {
    /// 保存済みオブジェクトキーの一覧
    pub keys: Vec<String>,
    /// キー総数
    pub total: usize,
    /// 一覧を取得した時刻（UNIX秒）
    #[serde(rename = "refreshedAt")]
    pub refreshed_at: u64,
    /// キャッシュの有効期限（UNIX秒）
    #[serde(rename = "cacheExpiresAt")]
    pub cache_expires_at: u64,
    /// キャッシュから返したかどうか
    pub cached: bool,
}
