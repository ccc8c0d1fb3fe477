//! URLパスとハンドラーの対応表によるマッピング

use std::sync::Arc;

use log::{debug, info};

use crate::common::{Attribute, Request};
use crate::error::Error;
use crate::handler::Handler;
use crate::interceptor::{ExecutionChain, HandlerInterceptor};

use super::HandlerMapping;

#[derive(Clone)]
enum UrlPattern {
    Exact(String),
    // 末尾 `/*` を除いた接頭辞
    Prefix(String),
}

impl UrlPattern {
    fn parse(pattern: &str) -> Result<Self, Error> {
        if !pattern.starts_with('/') {
            return Err(Error::InvalidPattern(format!(
                "URL pattern must start with '/': {}",
                pattern
            )));
        }
        Ok(match pattern.strip_suffix("/*") {
            Some(prefix) => UrlPattern::Prefix(prefix.to_string()),
            None => UrlPattern::Exact(pattern.to_string()),
        })
    }

    /// 一致した場合はマッピング内のパスを返す
    fn path_within(&self, path: &str) -> Option<String> {
        match self {
            UrlPattern::Exact(exact) => (exact == path).then(|| path.to_string()),
            UrlPattern::Prefix(prefix) => {
                let rest = path.strip_prefix(prefix.as_str())?;
                if rest.is_empty() {
                    Some(String::new())
                } else {
                    rest.strip_prefix('/').map(str::to_string)
                }
            }
        }
    }

    fn source(&self) -> String {
        match self {
            UrlPattern::Exact(exact) => exact.clone(),
            UrlPattern::Prefix(prefix) => format!("{}/*", prefix),
        }
    }

    // 完全一致は常に優先し、ワイルドカード同士は接頭辞の長い方を優先する
    fn rank(&self) -> (u8, usize) {
        match self {
            UrlPattern::Exact(exact) => (1, exact.len()),
            UrlPattern::Prefix(prefix) => (0, prefix.len()),
        }
    }
}

/// 完全一致のパスと `/prefix/*` 形式のワイルドカードを任意のハンドラーに対応づけるマッピング
///
/// メソッドは区別しない。どれにも一致しない場合、既定ハンドラーがあればそれを返す。
#[derive(Default)]
pub struct SimpleUrlHandlerMapping {
    entries: Vec<(UrlPattern, Handler)>,
    default_handler: Option<Handler>,
    interceptors: Vec<Arc<dyn HandlerInterceptor>>,
    order: Option<i32>,
}

impl SimpleUrlHandlerMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLパターンにハンドラーを対応づける
    pub fn map(mut self, pattern: &str, handler: Handler) -> Result<Self, Error> {
        let parsed = UrlPattern::parse(pattern)?;
        info!("Mapping URL {} to {}", pattern, handler.description());
        self.entries.push((parsed, handler));
        // 安定ソート（同順位は登録順）
        self.entries.sort_by(|a, b| b.0.rank().cmp(&a.0.rank()));
        Ok(self)
    }

    /// どのパターンにも一致しない場合のハンドラー
    pub fn default_handler(mut self, handler: Handler) -> Self {
        self.default_handler = Some(handler);
        self
    }

    pub fn interceptor<I: HandlerInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    fn lookup(&self, path: &str) -> Option<(String, String, Handler)> {
        self.entries.iter().find_map(|(pattern, handler)| {
            pattern
                .path_within(path)
                .map(|within| (pattern.source(), within, handler.clone()))
        })
    }
}

impl HandlerMapping for SimpleUrlHandlerMapping {
    fn get_handler(&self, req: &mut Request) -> Result<Option<ExecutionChain>, Error> {
        let (pattern, within, handler) = match self.lookup(&req.path) {
            Some(found) => found,
            None => match &self.default_handler {
                Some(handler) => {
                    debug!("Using default handler for {}", req.path);
                    ("/*".to_string(), req.path.clone(), handler.clone())
                }
                None => return Ok(None),
            },
        };

        let context = req.context_mut();
        context.set_attribute(Attribute::BestMatchingHandler, handler.clone());
        context.set_attribute(Attribute::BestMatchingPattern, pattern);
        context.set_attribute(Attribute::PathWithinHandlerMapping, within);
        context.set_attribute(Attribute::IntrospectTypeLevelMapping, false);

        Ok(Some(ExecutionChain::with_interceptors(
            handler,
            self.interceptors.clone(),
        )))
    }

    fn order(&self) -> Option<i32> {
        self.order
    }
}
