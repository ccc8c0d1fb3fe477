//! ハンドラー呼び出しの前後に差し込むインターセプター

pub mod chain;

use std::sync::Arc;

use async_trait::async_trait;

use crate::common::{Request, Response};
use crate::error::Error;
use crate::handler::{Handler, ModelAndView, PathPattern};

pub use self::chain::ExecutionChain;

/// インターセプターの特性
///
/// フックは1リクエストのタスク内で順番に await される。
/// リクエスト単位の状態を持つ場合は実装側で同期を取ること。
#[async_trait]
pub trait HandlerInterceptor: Send + Sync {
    /// ハンドラー呼び出し前。`Ok(false)` で以降の処理を打ち切る
    async fn pre_handle(
        &self,
        _req: &mut Request,
        _res: &mut Response,
        _handler: &Handler,
    ) -> Result<bool, Error> {
        Ok(true)
    }

    /// ハンドラーが正常終了した後（ビュー描画前）
    async fn post_handle(
        &self,
        _req: &mut Request,
        _res: &mut Response,
        _handler: &Handler,
        _model_and_view: Option<&mut ModelAndView>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// pre_handle に入ったインターセプターに対して、結果にかかわらず必ず呼ばれる
    async fn after_completion(
        &self,
        _req: &mut Request,
        _res: &mut Response,
        _handler: &Handler,
        _error: Option<&Error>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// ログ用の名前
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// パスの包含・除外パターンで適用範囲を絞ったインターセプター
#[derive(Clone)]
pub struct MappedInterceptor {
    includes: Vec<PathPattern>,
    excludes: Vec<PathPattern>,
    interceptor: Arc<dyn HandlerInterceptor>,
}

impl MappedInterceptor {
    /// 全パスに適用されるインターセプター
    pub fn new<I: HandlerInterceptor + 'static>(interceptor: I) -> Self {
        Self::from_arc(Arc::new(interceptor))
    }

    pub fn from_arc(interceptor: Arc<dyn HandlerInterceptor>) -> Self {
        Self {
            includes: Vec::new(),
            excludes: Vec::new(),
            interceptor,
        }
    }

    /// 適用するパスパターンを追加
    pub fn include(mut self, pattern: &str) -> Result<Self, Error> {
        self.includes.push(PathPattern::new(pattern)?);
        Ok(self)
    }

    /// 除外するパスパターンを追加
    pub fn exclude(mut self, pattern: &str) -> Result<Self, Error> {
        self.excludes.push(PathPattern::new(pattern)?);
        Ok(self)
    }

    /// 指定パスに適用されるか（除外が優先、包含が空なら全パス）
    pub fn matches(&self, path: &str) -> bool {
        if self.excludes.iter().any(|p| p.matches(path)) {
            return false;
        }
        self.includes.is_empty() || self.includes.iter().any(|p| p.matches(path))
    }

    pub fn interceptor(&self) -> &Arc<dyn HandlerInterceptor> {
        &self.interceptor
    }
}
