//! コントローラー型のハンドラー（アダプター経由で呼び出される）

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::common::{Request, Response};
use crate::error::Error;

use super::model::ModelAndView;

/// リクエストを処理し、必要ならビューを返すコントローラー
#[async_trait]
pub trait Controller: Send + Sync {
    /// リクエストを処理
    ///
    /// `Ok(None)` はレスポンスを直接書き込んだことを表す。
    async fn handle_request(
        &self,
        req: &mut Request,
        res: &mut Response,
    ) -> Result<Option<ModelAndView>, Error>;

    /// 最終更新日時（GET/HEADの条件付きリクエスト用）。既定は未対応
    fn last_modified(&self, _req: &Request) -> Option<DateTime<Utc>> {
        None
    }

    /// ログ・エラー表示用の名前
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// レスポンスを直接書き込むだけのハンドラー（ビューを返さない）
#[async_trait]
pub trait HttpRequestHandler: Send + Sync {
    async fn handle_request(&self, req: &mut Request, res: &mut Response) -> Result<(), Error>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
