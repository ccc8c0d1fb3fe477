//! エラー型の定義

use thiserror::Error;

/// ディスパッチ処理全体のエラー型
#[derive(Error, Debug)]
pub enum Error {
    /// ハンドラーが見つからない（`throw_if_no_handler_found` 有効時のみ）
    #[error("No handler found for {method} {path}")]
    NoHandlerFound { method: String, path: String },

    /// ハンドラーを扱えるアダプターが登録されていない（設定ミス）
    #[error("No adapter for handler [{0}]: the dispatcher configuration needs a HandlerAdapter that supports this handler")]
    NoAdapterFound(String),

    /// マッピング・インターセプター・アダプター内部で発生した処理エラー
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// インターセプターのフック内エラー
    #[error("Interceptor error: {0}")]
    Interceptor(String),

    /// 無効なパスパターン
    #[error("Invalid path pattern: {0}")]
    InvalidPattern(String),

    /// 無効なリクエストボディ
    #[error("Invalid request body: {0}")]
    InvalidRequestBody(String),

    /// レスポンスのシリアライズエラー
    #[error("Failed to serialize response: {0}")]
    ResponseSerializationError(String),

    /// 無効なヘッダー
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// 無効なクッキー
    #[error("Invalid cookie: {0}")]
    InvalidCookie(String),

    /// 認証エラー
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// 認可エラー
    #[error("Authorization error: {0}")]
    AuthorizationError(String),

    /// 戦略がサポートしない操作（読み取り専用のロケール解決への変更要求など）
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// マルチパート解析エラー
    #[error(transparent)]
    Multipart(#[from] MultipartError),

    /// 内部サーバーエラー
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

/// マルチパート解析時のエラー
#[derive(Error, Debug)]
pub enum MultipartError {
    /// マルチパートではないリクエストを解析しようとした
    #[error("Request is not a multipart request (content type: {0})")]
    NotMultipart(String),

    /// Content-Typeにboundaryがない
    #[error("Multipart boundary missing or invalid: {0}")]
    MissingBoundary(String),

    /// アップロード全体のサイズ上限超過
    #[error("Maximum upload size of {limit} bytes exceeded")]
    MaxUploadSizeExceeded { limit: u64 },

    /// ファイル単位のサイズ上限超過
    #[error("Maximum file size of {limit} bytes exceeded for part '{field}'")]
    MaxFileSizeExceeded { field: String, limit: u64 },

    /// 不正な形式のボディ
    #[error("Malformed multipart body: {0}")]
    Malformed(String),

    /// 一時ファイルの読み書きエラー
    #[error("Multipart storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MultipartError {
    /// サイズ上限に起因するエラーかどうか
    pub fn is_size_exceeded(&self) -> bool {
        matches!(
            self,
            MultipartError::MaxUploadSizeExceeded { .. } | MultipartError::MaxFileSizeExceeded { .. }
        )
    }
}

impl From<multer::Error> for MultipartError {
    fn from(err: multer::Error) -> Self {
        match err {
            multer::Error::StreamSizeExceeded { limit } => {
                MultipartError::MaxUploadSizeExceeded { limit }
            }
            multer::Error::FieldSizeExceeded { limit, field_name } => {
                MultipartError::MaxFileSizeExceeded {
                    field: field_name.unwrap_or_default(),
                    limit,
                }
            }
            multer::Error::NoBoundary => {
                MultipartError::MissingBoundary("no boundary in content type".to_string())
            }
            other => MultipartError::Malformed(other.to_string()),
        }
    }
}

impl Error {
    /// エラーからHTTPステータスコードを取得
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NoHandlerFound { .. } => 404,
            Error::NoAdapterFound(_) => 500,
            Error::Dispatch(_) => 500,
            Error::Interceptor(_) => 500,
            Error::InvalidPattern(_) => 500,
            Error::InvalidRequestBody(_) => 400,
            Error::ResponseSerializationError(_) => 500,
            Error::InvalidHeader(_) => 400,
            Error::InvalidCookie(_) => 400,
            Error::AuthenticationError(_) => 401,
            Error::AuthorizationError(_) => 403,
            Error::UnsupportedOperation(_) => 500,
            Error::Multipart(e) if e.is_size_exceeded() => 413,
            Error::Multipart(MultipartError::Io(_)) => 500,
            Error::Multipart(_) => 400,
            Error::InternalServerError(_) => 500,
        }
    }
}
