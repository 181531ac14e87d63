//! # オブジェクトストア
//!
//! キーアドレスのBlobストレージに対する抽象インターフェース。
//! S3互換ストレージ実装は `s3` サブモジュールを参照。
//! head/put/list/deleteのみを要求し、運用者はS3互換ストレージ
//! （MinIO, AWS S3, Cloudflare R2等）を実装として選択できる。

#[cfg(feature = "vendor-aws")]
pub mod s3;

#[cfg(feature = "vendor-aws")]
pub use s3::S3Store;

use tokio::io::AsyncRead;

use crate::error::ApiError;

/// headの結果。存在するオブジェクトのメタデータ。
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// 保存済みサイズ（バイト）
    pub size: u64,
}

/// putに付与するメタデータ。
#[derive(Debug, Clone)]
pub struct PutMetadata {
    /// 保存するContent-Type
    pub content_type: String,
    /// Cache-Controlヘッダー値
    pub cache_control: String,
    /// サイドカーのカスタムメタデータ（名前, 値）
    pub custom: Vec<(String, String)>,
}

/// list_pageの結果1ページ分。
#[derive(Debug, Clone)]
pub struct KeyPage {
    /// このページのキー
    pub keys: Vec<String>,
    /// 続きがある場合のカーソル
    pub cursor: Option<String>,
}

/// オブジェクトストアの抽象インターフェース。
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// キーのオブジェクトが存在すればメタデータを返す。
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, ApiError>;

    /// ストリームをキーへ書き込み、保存したバイト数を返す。
    /// 読み取り側のエラーで書き込みは中断される。中断時に部分オブジェクトが
    /// 残るかどうかは実装依存なので、呼び出し側が `delete` で後始末する。
    async fn put_stream(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        meta: &PutMetadata,
    ) -> Result<u64, ApiError>;

    /// カーソル駆動でキーを1ページ列挙する。
    async fn list_page(&self, cursor: Option<String>, limit: usize)
        -> Result<KeyPage, ApiError>;

    /// キーのオブジェクトを削除する。存在しない場合も成功扱い。
    async fn delete(&self, key: &str) -> Result<(), ApiError>;
}
