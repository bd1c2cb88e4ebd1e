//! # Gateway エラー型
//!
//! 全エンドポイントで共通のエラー型。
//! 外部API由来の失敗は種別を問わず500とし、メッセージはそのまま返す。

use axum::http::StatusCode;
use axum::Json;
use docgate_types::ErrorBody;

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 不正なリクエスト（必須項目の欠落、JSONパース失敗）
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// APIキーが提示されていない
    #[error("認証が必要です: {0}")]
    Unauthorized(String),
    /// OAuthトークンが保存されていない、または失効している
    #[error("認証されていません。/authorize からアクセスを許可してください")]
    NotAuthenticated,
    /// APIキーが一致しない
    #[error("アクセスが拒否されました: {0}")]
    Forbidden(String),
    /// ファイルが見つからない
    #[error("ファイルが見つかりません: {0}")]
    NotFound(String),
    /// UTF-8として解釈できない、またはエクスポート不能な形式
    #[error("サポートされていない形式です: {0}")]
    UnsupportedFormat(String),
    /// ドキュメントストレージ操作に失敗
    #[error("ストレージ操作に失敗: {0}")]
    Storage(String),
    /// シークレットストア操作に失敗
    #[error("シークレットストア操作に失敗: {0}")]
    SecretStore(String),
    /// アンビエント認証情報の取得に失敗
    #[error("認証情報の取得に失敗: {0}")]
    Credentials(String),
    /// OAuthトークン交換・更新に失敗
    #[error("OAuth処理に失敗: {0}")]
    OAuth(String),
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTPステータスコード。
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) | GatewayError::NotAuthenticated => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            GatewayError::Storage(_)
            | GatewayError::SecretStore(_)
            | GatewayError::Credentials(_)
            | GatewayError::OAuth(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// レスポンスボディの `type` フィールド。
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::Unauthorized(_) => "unauthorized",
            GatewayError::NotAuthenticated => "not_authenticated",
            GatewayError::Forbidden(_) => "forbidden",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::UnsupportedFormat(_) => "unsupported_format",
            GatewayError::Storage(_) => "storage",
            GatewayError::SecretStore(_) => "secret_store",
            GatewayError::Credentials(_) => "credentials",
            GatewayError::OAuth(_) => "oauth",
            GatewayError::Internal(_) => "internal",
        }
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "リクエスト処理に失敗");
        }
        let body = ErrorBody {
            kind: self.kind().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<axum::extract::rejection::JsonRejection> for GatewayError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        GatewayError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::NotAuthenticated.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::Forbidden("x".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GatewayError::UnsupportedFormat("x".into()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            GatewayError::SecretStore("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    /// 外部APIのメッセージがボディにそのまま含まれることを確認
    #[tokio::test]
    async fn test_error_body_keeps_upstream_message() {
        let response =
            GatewayError::Storage("API error: 503 backend unavailable".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.kind, "storage");
        assert!(body.message.contains("503 backend unavailable"));
    }
}
