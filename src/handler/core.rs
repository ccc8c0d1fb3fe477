use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::{Method, Request, Response};
use crate::error::Error;

use super::pattern::PathPattern;

/// レスポンス変換トレイト
pub trait ResponseWrapper {
    /// 自身をResponseに変換
    fn into_response(self) -> Result<Response, Error>;
}

/// 通常のシリアライズ可能なデータ型はJSONとして返す
impl<T: Serialize> ResponseWrapper for T {
    fn into_response(self) -> Result<Response, Error> {
        Response::ok().json(&self)
    }
}

/// Response型はそのまま返す
impl ResponseWrapper for Response {
    fn into_response(self) -> Result<Response, Error> {
        Ok(self)
    }
}

/// Content-Typeの許容範囲を判定（JSONボディとして解釈できるか）
pub fn is_json_like_content_type(ct: &str) -> bool {
    let main_type = ct
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    main_type == "application/json" || main_type.ends_with("+json")
}

/// 関数ベースのルート（メソッド + パスパターン + 処理本体）
///
/// `RouteHandlerMapping` が照合し、`RouteHandlerAdapter` が呼び出す。
#[async_trait]
pub trait Route: Send + Sync {
    /// 対象のHTTPメソッド
    fn method(&self) -> Method;

    /// 対象のパスパターン
    fn pattern(&self) -> &PathPattern;

    /// このルートが生成できるメディアタイプ（空なら制約なし）
    fn produces(&self) -> &[String] {
        &[]
    }

    /// リクエストを処理
    async fn handle(&self, req: &Request) -> Result<Response, Error>;
}

/// ボディが空でなければContent-Typeを検証してJSONとして読む
fn read_json_body<T: DeserializeOwned>(req: &Request) -> Result<Option<T>, Error> {
    let has_non_empty_body = req.body.as_ref().map(|b| !b.is_empty()).unwrap_or(false);
    if !has_non_empty_body {
        return Ok(None);
    }

    let ct = req.content_type().ok_or_else(|| {
        warn!("Request with body missing Content-Type header");
        Error::InvalidRequestBody("Missing Content-Type header".to_string())
    })?;

    if !is_json_like_content_type(ct) {
        warn!("Unsupported Content-Type for JSON parsing: {}", ct);
        return Err(Error::InvalidRequestBody(format!(
            "Unsupported Content-Type: {} (expected application/json or *+json)",
            ct
        )));
    }

    Ok(Some(req.json::<T>()?))
}

/// 同期ルートハンドラー
pub struct RouteHandler<F, T, R> {
    method: Method,
    pattern: PathPattern,
    produces: Vec<String>,
    handler_fn: F,
    _types: PhantomData<fn(T) -> R>,
}

impl<F, T, R> RouteHandler<F, T, R>
where
    F: Fn(Request, Option<T>) -> Result<R, Error> + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: ResponseWrapper + Send + 'static,
{
    /// 新しいRouteHandlerを作成
    pub fn try_new(method: Method, path_pattern: &str, handler_fn: F) -> Result<Self, Error> {
        let pattern = PathPattern::new(path_pattern)?;
        info!("Registering handler for {} with pattern: {}", method, pattern);
        Ok(Self {
            method,
            pattern,
            produces: Vec::new(),
            handler_fn,
            _types: PhantomData,
        })
    }

    /// 生成するメディアタイプを宣言
    pub fn with_produces(mut self, media_type: impl Into<String>) -> Self {
        self.produces.push(media_type.into());
        self
    }
}

/// 非同期ルートハンドラー
pub struct AsyncRouteHandler<F, T, R, Fut> {
    method: Method,
    pattern: PathPattern,
    produces: Vec<String>,
    handler_fn: F,
    _types: PhantomData<fn(T) -> (R, Fut)>,
}

impl<F, T, R, Fut> AsyncRouteHandler<F, T, R, Fut>
where
    F: Fn(Request, Option<T>) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: ResponseWrapper + Send + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
{
    /// 新しいAsyncRouteHandlerを作成
    pub fn try_new(method: Method, path_pattern: &str, handler_fn: F) -> Result<Self, Error> {
        let pattern = PathPattern::new(path_pattern)?;
        info!("Registering async handler for {} with pattern: {}", method, pattern);
        Ok(Self {
            method,
            pattern,
            produces: Vec::new(),
            handler_fn,
            _types: PhantomData,
        })
    }

    /// 生成するメディアタイプを宣言
    pub fn with_produces(mut self, media_type: impl Into<String>) -> Self {
        self.produces.push(media_type.into());
        self
    }
}

#[async_trait]
impl<F, T, R> Route for RouteHandler<F, T, R>
where
    F: Fn(Request, Option<T>) -> Result<R, Error> + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: ResponseWrapper + Send + 'static,
{
    fn method(&self) -> Method {
        self.method
    }

    fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    fn produces(&self) -> &[String] {
        &self.produces
    }

    async fn handle(&self, req: &Request) -> Result<Response, Error> {
        let body_data = read_json_body::<T>(req)?;
        debug!("Invoking route {} {}", self.method, self.pattern);
        (self.handler_fn)(req.clone(), body_data)?.into_response()
    }
}

#[async_trait]
impl<F, T, R, Fut> Route for AsyncRouteHandler<F, T, R, Fut>
where
    F: Fn(Request, Option<T>) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: ResponseWrapper + Send + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
{
    fn method(&self) -> Method {
        self.method
    }

    fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    fn produces(&self) -> &[String] {
        &self.produces
    }

    async fn handle(&self, req: &Request) -> Result<Response, Error> {
        let body_data = read_json_body::<T>(req)?;
        debug!("Invoking async route {} {}", self.method, self.pattern);
        (self.handler_fn)(req.clone(), body_data).await?.into_response()
    }
}
