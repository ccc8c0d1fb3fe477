//! ディスパッチャー（リクエスト1件の処理サイクル全体）

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, error, info, warn};

use crate::adapter::{AdapterRegistry, HandlerAdapter};
use crate::common::{Method, Request, Response};
use crate::error::Error;
use crate::handler::{Handler, ModelAndView};
use crate::interceptor::ExecutionChain;
use crate::locale::{self, AcceptHeaderLocaleResolver, LocaleResolver};
use crate::mapping::{HandlerMapping, HandlerRegistry};
use crate::multipart::{MultipartCleanup, MultipartResolver};

/// HTTP日付の書式（常にGMT）
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

// 旧形式の HTTP 日付（RFC 850 と asctime）
const RFC850_DATE_FORMAT: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// ディスパッチの結果
#[derive(Debug)]
pub enum DispatchOutcome {
    /// ハンドラーがビューを返した
    View {
        model_and_view: ModelAndView,
        response: Response,
    },
    /// ハンドラーがレスポンスを書き込んだ
    Completed(Response),
    /// インターセプターが処理を打ち切った
    ShortCircuited(Response),
    /// 条件付きGETで未変更
    NotModified(Response),
    /// どのマッピングにも一致しなかった
    NotFound,
}

impl DispatchOutcome {
    /// 書き込まれたレスポンス（`NotFound` は `None`）
    pub fn response(&self) -> Option<&Response> {
        match self {
            DispatchOutcome::View { response, .. }
            | DispatchOutcome::Completed(response)
            | DispatchOutcome::ShortCircuited(response)
            | DispatchOutcome::NotModified(response) => Some(response),
            DispatchOutcome::NotFound => None,
        }
    }

    /// 送信用のレスポンスに変換（ビューはJSONとして描画する）
    pub fn into_response(self) -> Result<Response, Error> {
        match self {
            DispatchOutcome::View {
                model_and_view,
                response,
            } => {
                let mut rendered = model_and_view.to_json_response()?;
                if model_and_view.status().is_none() {
                    rendered.status = response.status;
                }
                for (key, value) in response.headers {
                    if rendered.header(&key).is_none() {
                        rendered.headers.insert(key, value);
                    }
                }
                rendered.cookies = response.cookies;
                Ok(rendered)
            }
            DispatchOutcome::Completed(response)
            | DispatchOutcome::ShortCircuited(response)
            | DispatchOutcome::NotModified(response) => Ok(response),
            DispatchOutcome::NotFound => Ok(Response::not_found()),
        }
    }
}

/// ディスパッチャーを構築するためのビルダー
pub struct MvcBridgeBuilder {
    registry: HandlerRegistry,
    adapters: AdapterRegistry,
    locale_resolver: Option<Arc<dyn LocaleResolver>>,
    multipart_resolver: Option<Arc<dyn MultipartResolver>>,
    throw_if_no_handler_found: bool,
}

impl Default for MvcBridgeBuilder {
    fn default() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            adapters: AdapterRegistry::new(),
            locale_resolver: None,
            multipart_resolver: None,
            throw_if_no_handler_found: false,
        }
    }
}

impl MvcBridgeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// マッピング戦略を追加（優先度は戦略の `order()`）
    pub fn mapping<M: HandlerMapping + 'static>(mut self, mapping: M) -> Self {
        self.registry.register(mapping);
        self
    }

    /// 優先度を指定してマッピング戦略を追加
    pub fn mapping_with_priority<M: HandlerMapping + 'static>(mut self, mapping: M, priority: i32) -> Self {
        self.registry.register_with_priority(mapping, priority);
        self
    }

    /// アダプターを追加（1つも追加しなければ組み込みアダプターを使う）
    pub fn adapter<A: HandlerAdapter + 'static>(mut self, adapter: A) -> Self {
        self.adapters.register(adapter);
        self
    }

    /// ロケールリゾルバー（既定は `AcceptHeaderLocaleResolver`）
    pub fn locale_resolver<R: LocaleResolver + 'static>(mut self, resolver: R) -> Self {
        self.locale_resolver = Some(Arc::new(resolver));
        self
    }

    /// マルチパートリゾルバー（既定はなし）
    pub fn multipart_resolver<R: MultipartResolver + 'static>(mut self, resolver: R) -> Self {
        self.multipart_resolver = Some(Arc::new(resolver));
        self
    }

    /// ハンドラーが見つからない場合に `Error::NoHandlerFound` を返すか
    pub fn throw_if_no_handler_found(mut self, enabled: bool) -> Self {
        self.throw_if_no_handler_found = enabled;
        self
    }

    pub fn build(self) -> MvcBridge {
        let adapters = if self.adapters.is_empty() {
            AdapterRegistry::with_defaults()
        } else {
            self.adapters
        };
        let locale_resolver = self
            .locale_resolver
            .unwrap_or_else(|| Arc::new(AcceptHeaderLocaleResolver::new()));

        info!(
            "MvcBridge built with {} handler mappings, {} adapters, locale resolver {}, multipart {}",
            self.registry.len(),
            adapters.len(),
            locale_resolver.name(),
            if self.multipart_resolver.is_some() { "enabled" } else { "disabled" }
        );

        MvcBridge {
            registry: self.registry,
            adapters,
            locale_resolver,
            multipart_resolver: self.multipart_resolver,
            throw_if_no_handler_found: self.throw_if_no_handler_found,
        }
    }
}

/// リクエストを解決・呼び出しするディスパッチャー
///
/// 構築後は変更されないので、`Arc` で包んで並行リクエスト間で共有できる。
pub struct MvcBridge {
    registry: HandlerRegistry,
    adapters: AdapterRegistry,
    locale_resolver: Arc<dyn LocaleResolver>,
    multipart_resolver: Option<Arc<dyn MultipartResolver>>,
    throw_if_no_handler_found: bool,
}

impl MvcBridge {
    pub fn builder() -> MvcBridgeBuilder {
        MvcBridgeBuilder::new()
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn locale_resolver(&self) -> &Arc<dyn LocaleResolver> {
        &self.locale_resolver
    }

    /// ハンドラーの解決だけを行う
    pub fn resolve(&self, req: &mut Request) -> Result<Option<ExecutionChain>, Error> {
        self.registry.resolve(req)
    }

    /// ハンドラーに対応するアダプター
    pub fn adapter_for(&self, handler: &Handler) -> Result<Arc<dyn HandlerAdapter>, Error> {
        self.adapters.adapter_for(handler)
    }

    /// リクエストを処理してレスポンスを返す（エラーもレスポンスに変換する）
    pub async fn handle(&self, req: Request) -> Response {
        let method = req.method;
        let path = req.path.clone();
        let result = match self.dispatch(req).await {
            Ok(outcome) => outcome.into_response(),
            Err(e) => Err(e),
        };
        match result {
            Ok(res) => res,
            Err(e) => {
                if e.status_code() >= 500 {
                    error!("Error processing {} {}: {}", method, path, e);
                } else {
                    warn!("Request {} {} failed: {}", method, path, e);
                }
                Response::from_error(&e)
            }
        }
    }

    /// リクエストを1件処理する
    ///
    /// マルチパートの解析に失敗した場合は、ハンドラーを解決する前にエラーを返す。
    /// 解析済みの一時ファイルは、どの経路で戻る場合も解放される。
    pub async fn dispatch(&self, mut req: Request) -> Result<DispatchOutcome, Error> {
        locale::expose_resolver(&mut req, self.locale_resolver.clone());

        let mut guard = MultipartCleanup::resolve(self.multipart_resolver.clone(), req).await?;
        let outcome = self.dispatch_resolved(guard.request_mut()).await;
        guard.cleanup();
        outcome
    }

    async fn dispatch_resolved(&self, req: &mut Request) -> Result<DispatchOutcome, Error> {
        let mut chain = match self.registry.resolve(req)? {
            Some(chain) => chain,
            None => {
                if self.throw_if_no_handler_found {
                    return Err(Error::NoHandlerFound {
                        method: req.method.to_string(),
                        path: req.path.clone(),
                    });
                }
                warn!("No handler found for {} {}", req.method, req.path);
                return Ok(DispatchOutcome::NotFound);
            }
        };

        let adapter = self.adapters.adapter_for(chain.handler())?;

        let mut res = Response::ok();
        if matches!(req.method, Method::GET | Method::HEAD) {
            if let Some(last_modified) = adapter.last_modified(req, chain.handler()) {
                let header = last_modified.format(HTTP_DATE_FORMAT).to_string();
                if is_not_modified(req, last_modified) {
                    debug!("{} {} not modified since {}", req.method, req.path, last_modified);
                    let res = Response::not_modified().with_header("Last-Modified", header);
                    return Ok(DispatchOutcome::NotModified(res));
                }
                res = res.with_header("Last-Modified", header);
            }
        }

        match self.run_chain(&mut chain, adapter.as_ref(), req, &mut res).await {
            Ok(None) => Ok(DispatchOutcome::ShortCircuited(res)),
            Ok(Some(model_and_view)) => {
                chain.trigger_after_completion(req, &mut res, None).await?;
                Ok(match model_and_view {
                    Some(model_and_view) => DispatchOutcome::View {
                        model_and_view,
                        response: res,
                    },
                    None => DispatchOutcome::Completed(res),
                })
            }
            Err(e) => {
                if let Err(after) = chain.trigger_after_completion(req, &mut res, Some(&e)).await {
                    error!(
                        "after_completion failed while handling an earlier error ({}): {}",
                        e, after
                    );
                }
                Err(e)
            }
        }
    }

    /// pre_handle から post_handle まで。打ち切られた場合は `Ok(None)`
    async fn run_chain(
        &self,
        chain: &mut ExecutionChain,
        adapter: &dyn HandlerAdapter,
        req: &mut Request,
        res: &mut Response,
    ) -> Result<Option<Option<ModelAndView>>, Error> {
        if !chain.apply_pre_handle(req, res).await? {
            return Ok(None);
        }

        let handler = chain.handler().clone();
        debug!("Invoking {} with adapter {}", handler.description(), adapter.name());
        let mut model_and_view = adapter.handle(req, res, &handler).await?;
        if let Some(mav) = model_and_view.as_mut() {
            if !mav.has_view() {
                mav.set_view_name(default_view_name(&req.path));
            }
        }

        chain.apply_post_handle(req, res, model_and_view.as_mut()).await?;
        Ok(Some(model_and_view))
    }
}

/// HTTP 日付を解析（IMF-fixdate、RFC 850、asctime の順に試す）
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    // asctime は日付が空白埋めされるため、空白を詰めてから解析する
    let compact = value.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(value, RFC850_DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(&compact, ASCTIME_DATE_FORMAT))
        .ok()
        .map(|naive| naive.and_utc())
}

/// If-Modified-Since と比較して未変更か（秒単位）
fn is_not_modified(req: &Request, last_modified: DateTime<Utc>) -> bool {
    let since = match req.header(http::header::IF_MODIFIED_SINCE.as_str()) {
        Some(raw) => raw,
        None => return false,
    };
    match parse_http_date(since) {
        Some(since) => last_modified.timestamp() <= since.timestamp(),
        None => {
            debug!("Ignoring unparsable If-Modified-Since '{}'", since);
            false
        }
    }
}

/// パスから既定のビュー名を作る（前後の `/`、マトリクス変数、拡張子を除く）
pub fn default_view_name(path: &str) -> String {
    let mut name: String = path
        .trim_matches('/')
        .split('/')
        .map(|segment| segment.split(';').next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("/");
    let last_segment_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    if let Some(dot) = name[last_segment_start..].rfind('.') {
        name.truncate(last_segment_start + dot);
    }
    name
}
