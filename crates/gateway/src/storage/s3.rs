//! # S3互換オブジェクトストア実装
//!
//! AWS S3, MinIO, Cloudflare R2 等のS3互換APIを使用する
//! オブジェクトストア実装。putはマルチパートのストリーミング書き込みで、
//! ペイロード全体をメモリに載せない。

use tokio::io::AsyncRead;

use super::{KeyPage, ObjectMeta, ObjectStore, PutMetadata};
use crate::error::ApiError;

/// S3互換ストレージによるオブジェクトストア実装。
pub struct S3Store {
    bucket: s3::Bucket,
}

impl S3Store {
    /// S3互換バケットから構築する。
    pub fn new(bucket: s3::Bucket) -> Self {
        Self { bucket }
    }

    /// 環境変数からS3互換バケットを初期化する。
    fn init_bucket(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        bucket_name: &str,
    ) -> anyhow::Result<s3::Bucket> {
        // AWS S3エンドポイント（s3.REGION.amazonaws.com）からリージョンを自動検出。
        // 非AWSエンドポイントではus-east-1をフォールバックとして使用。
        let detected_region = std::env::var("S3_REGION").ok().unwrap_or_else(|| {
            if let Some(caps) = endpoint.find("s3.").and_then(|start| {
                let rest = &endpoint[start + 3..];
                rest.find(".amazonaws.com").map(|end| rest[..end].to_string())
            }) {
                caps
            } else {
                "us-east-1".to_string()
            }
        });
        let region = s3::Region::Custom {
            region: detected_region,
            endpoint: endpoint.to_string(),
        };

        let credentials = s3::creds::Credentials::new(
            Some(access_key),
            Some(secret_key),
            None,
            None,
            None,
        )?;

        let bucket = s3::Bucket::new(bucket_name, region, credentials)?.with_path_style();

        Ok(*bucket)
    }

    /// 環境変数から構築する。
    pub fn from_env() -> anyhow::Result<Self> {
        let endpoint = std::env::var("S3_ENDPOINT")
            .unwrap_or_else(|_| "http://localhost:9000".to_string());
        let access_key =
            std::env::var("S3_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".to_string());
        let secret_key =
            std::env::var("S3_SECRET_KEY").unwrap_or_else(|_| "minioadmin".to_string());
        let bucket_name =
            std::env::var("S3_BUCKET").unwrap_or_else(|_| "asset-sync".to_string());

        let bucket = Self::init_bucket(&endpoint, &access_key, &secret_key, &bucket_name)?;

        Ok(Self::new(bucket))
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3Store {
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, ApiError> {
        match self.bucket.head_object(key).await {
            Ok((_, 404)) => Ok(None),
            Ok((head, code)) if (200..300).contains(&code) => Ok(Some(ObjectMeta {
                size: head.content_length.unwrap_or(0).max(0) as u64,
            })),
            Ok((_, code)) => Err(ApiError::Storage(format!(
                "headが予期しないステータスを返しました: HTTP {code}"
            ))),
            Err(s3::error::S3Error::HttpFailWithBody(404, _)) => Ok(None),
            Err(e) => Err(ApiError::Storage(format!("head失敗: {e}"))),
        }
    }

    async fn put_stream(
        &self,
        key: &str,
        mut reader: &mut (dyn AsyncRead + Send + Unpin),
        meta: &PutMetadata,
    ) -> Result<u64, ApiError> {
        // Cache-Controlとカスタムメタデータは追加ヘッダーとして
        // リクエストごとのバケットクローンに載せる。
        let mut bucket = self.bucket.clone();
        bucket.add_header("cache-control", &meta.cache_control);
        for (name, value) in &meta.custom {
            bucket.add_header(&format!("x-amz-meta-{name}"), value);
        }

        let response = bucket
            .put_object_stream_with_content_type(&mut reader, key, &meta.content_type)
            .await
            .map_err(|e| ApiError::Storage(format!("put失敗: {e}")))?;

        Ok(response.uploaded_bytes() as u64)
    }

    async fn list_page(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<KeyPage, ApiError> {
        let (result, _code) = self
            .bucket
            .list_page(String::new(), None, cursor, None, Some(limit))
            .await
            .map_err(|e| ApiError::Storage(format!("list失敗: {e}")))?;

        let keys = result.contents.into_iter().map(|o| o.key).collect();
        let cursor = if result.is_truncated {
            result.next_continuation_token
        } else {
            None
        };

        Ok(KeyPage { keys, cursor })
    }

    async fn delete(&self, key: &str) -> Result<(), ApiError> {
        self.bucket
            .delete_object(key)
            .await
            .map(|_| ())
            .map_err(|e| ApiError::Storage(format!("delete失敗: {e}")))
    }
}
