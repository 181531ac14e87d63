//! # Gateway エラー型
//!
//! リクエスト処理中に発生する失敗の分類。各バリアントはHTTPステータスに
//! 1対1で対応し、`{"error": メッセージ}` のJSONボディとして返る。
//! Gatewayは内部でリトライを行わない。回復はすべてクライアント側が
//! 準備フェーズをやり直すことで行う。

use axum::http::StatusCode;
use axum::Json;

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// ストレージバインディング未設定（503）
    #[error("{0}")]
    Configuration(String),
    /// 署名シークレット未設定などの内部エラー（500）
    #[error("{0}")]
    Internal(String),
    /// 不正・危険な入力（400）
    #[error("{0}")]
    Validation(String),
    /// Bearerトークンの欠落・無効（401）
    #[error("{0}")]
    Auth(String),
    /// トークン検証失敗・ユーザー不一致（403）
    #[error("{0}")]
    Forbidden(String),
    /// 許可されない拡張子・メディアタイプ（415）
    #[error("{0}")]
    Policy(String),
    /// オブジェクトが既に存在する（409）
    #[error("{0}")]
    Conflict(String),
    /// 宣言またはストリームのサイズ超過（413）
    #[error("{0}")]
    TooLarge(String),
    /// バックエンドストレージの失敗（502）
    #[error("{0}")]
    Storage(String),
}

impl ApiError {
    /// 対応するHTTPステータスコード。
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Policy(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Storage(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (
            self.status(),
            [("access-control-allow-origin", "*")],
            Json(body),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 各バリアントが期待するステータスコードへ写像されることを確認
    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Configuration("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Auth("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::Forbidden("x".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Policy("x".into()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::TooLarge("x".into()).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::Storage("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
