//! ハンドラーアダプター（ハンドラーの形に依らない統一的な呼び出し口）

pub mod builtin;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, trace};

use crate::common::{Request, Response};
use crate::error::Error;
use crate::handler::{Handler, ModelAndView};

pub use self::builtin::{ControllerAdapter, HttpRequestHandlerAdapter, RouteHandlerAdapter};

/// 特定の形のハンドラーを呼び出せるアダプター
#[async_trait]
pub trait HandlerAdapter: Send + Sync {
    /// このハンドラーを呼び出せるか
    fn supports(&self, handler: &Handler) -> bool;

    /// ハンドラーを呼び出す
    ///
    /// `Ok(None)` はレスポンスが書き込み済みで、ビューの処理が不要なことを表す。
    async fn handle(
        &self,
        req: &mut Request,
        res: &mut Response,
        handler: &Handler,
    ) -> Result<Option<ModelAndView>, Error>;

    /// 最終更新日時。既定は未対応（`None`）
    fn last_modified(&self, _req: &Request, _handler: &Handler) -> Option<DateTime<Utc>> {
        None
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// 登録順に `supports` を問い合わせるアダプターの一覧
///
/// 複数のアダプターが同じハンドラーに対応する場合、先に登録された方が使われる。
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn HandlerAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 組み込みアダプター（ルート、コントローラー、HTTPリクエストハンドラー）を登録済みのもの
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(RouteHandlerAdapter);
        registry.register(ControllerAdapter);
        registry.register(HttpRequestHandlerAdapter);
        registry
    }

    pub fn register<A: HandlerAdapter + 'static>(&mut self, adapter: A) {
        self.register_arc(Arc::new(adapter));
    }

    pub fn register_arc(&mut self, adapter: Arc<dyn HandlerAdapter>) {
        debug!("Registering handler adapter {}", adapter.name());
        self.adapters.push(adapter);
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// ハンドラーを扱える最初のアダプター
    pub fn adapter_for(&self, handler: &Handler) -> Result<Arc<dyn HandlerAdapter>, Error> {
        self.adapters
            .iter()
            .find(|adapter| {
                trace!("Testing handler adapter {}", adapter.name());
                adapter.supports(handler)
            })
            .cloned()
            .ok_or_else(|| Error::NoAdapterFound(handler.description()))
    }

    /// 対応するアダプターでハンドラーを呼び出す
    pub async fn invoke(
        &self,
        req: &mut Request,
        res: &mut Response,
        handler: &Handler,
    ) -> Result<Option<ModelAndView>, Error> {
        let adapter = self.adapter_for(handler)?;
        adapter.handle(req, res, handler).await
    }
}
