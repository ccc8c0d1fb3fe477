//! ハンドラーの表現（型消去されたハンドラーと各種ハンドラー実装）
//!
//! ディスパッチ層はハンドラーの形を問わない。`Handler` はタグ付きの列挙で、
//! どの型のハンドラーかの判定はアダプターの `supports` に委ねる。

pub mod builders;
pub mod controller;
pub mod core;
pub mod model;
pub mod pattern;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub use self::builders::{async_delete, async_get, async_post, delete, get, options, post, put};
pub use self::controller::{Controller, HttpRequestHandler};
pub use self::core::{AsyncRouteHandler, ResponseWrapper, Route, RouteHandler};
pub use self::model::ModelAndView;
pub use self::pattern::{ensure_safe_pattern, PathPattern};

/// 任意型のハンドラー（専用アダプターが `downcast_ref` で取り出す）
#[derive(Clone)]
pub struct CustomHandler {
    name: Arc<str>,
    inner: Arc<dyn Any + Send + Sync>,
}

impl CustomHandler {
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>, value: T) -> Self {
        Self {
            name: Arc::from(name.into()),
            inner: Arc::new(value),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 具体型として参照
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }
}

/// マッピングが解決し、アダプターが呼び出すハンドラー
///
/// 起動時に一度登録され、以後は読み取り専用で並行リクエスト間に共有される。
#[derive(Clone)]
pub enum Handler {
    /// 関数ベースのルート
    Route(Arc<dyn Route>),
    /// ビューを返しうるコントローラー
    Controller(Arc<dyn Controller>),
    /// レスポンスを直接書くハンドラー
    HttpRequest(Arc<dyn HttpRequestHandler>),
    /// 任意型
    Custom(CustomHandler),
}

impl Handler {
    pub fn route<R: Route + 'static>(route: R) -> Self {
        Handler::Route(Arc::new(route))
    }

    pub fn controller<C: Controller + 'static>(controller: C) -> Self {
        Handler::Controller(Arc::new(controller))
    }

    pub fn http_request<H: HttpRequestHandler + 'static>(handler: H) -> Self {
        Handler::HttpRequest(Arc::new(handler))
    }

    pub fn custom<T: Any + Send + Sync>(name: impl Into<String>, value: T) -> Self {
        Handler::Custom(CustomHandler::new(name, value))
    }

    /// ログ・エラー表示用の説明
    pub fn description(&self) -> String {
        match self {
            Handler::Route(route) => format!("route {} {}", route.method(), route.pattern()),
            Handler::Controller(controller) => format!("controller {}", controller.name()),
            Handler::HttpRequest(handler) => format!("http request handler {}", handler.name()),
            Handler::Custom(custom) => format!("custom handler {}", custom.name()),
        }
    }

    /// `Custom` の中身を具体型として参照
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Handler::Custom(custom) => custom.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// 同一のハンドラーインスタンスか
    pub fn ptr_eq(&self, other: &Handler) -> bool {
        match (self, other) {
            (Handler::Route(a), Handler::Route(b)) => Arc::ptr_eq(a, b),
            (Handler::Controller(a), Handler::Controller(b)) => Arc::ptr_eq(a, b),
            (Handler::HttpRequest(a), Handler::HttpRequest(b)) => Arc::ptr_eq(a, b),
            (Handler::Custom(a), Handler::Custom(b)) => Arc::ptr_eq(&a.inner, &b.inner),
            _ => false,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}
