//! MvcBridge: ハンドラー解決とリクエストディスパッチのための軽量フレームワーク
//!
//! 優先度付きのマッピング戦略でリクエストを1つのハンドラーに対応づけ、
//! インターセプターで前後処理を挟み、アダプター経由で呼び出す。
//! ロケールとマルチパートの解決もここで扱う。

pub mod adapter;
pub mod common;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod interceptor;
pub mod locale;
pub mod mapping;
pub mod multipart;

pub use adapter::{AdapterRegistry, HandlerAdapter};
pub use common::{Attribute, Cookie, Method, Request, RequestContext, Response};
pub use dispatch::{DispatchOutcome, MvcBridge, MvcBridgeBuilder};
pub use error::{Error, MultipartError};
pub use handler::{Handler, ModelAndView};
pub use interceptor::{ExecutionChain, HandlerInterceptor, MappedInterceptor};
pub use locale::{Locale, LocaleResolver};
pub use mapping::{HandlerMapping, HandlerRegistry};
pub use multipart::{MultipartResolver, MultipartState};
