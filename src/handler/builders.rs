use std::future::Future;

use futures::future::{self, Ready};
use serde::de::DeserializeOwned;

use crate::common::{Method, Request};
use crate::error::Error;

use super::core::{AsyncRouteHandler, ResponseWrapper, RouteHandler};

// 可読性のための型エイリアス（ボディ必須の非同期ハンドラー）
pub type BodyOrError<Fut, R> = future::Either<Ready<Result<R, Error>>, Fut>;

// 同期: Option<T> から T を要求し、なければエラーにする薄いアダプタ
fn require_body_sync<F, T, R>(
    handler: F,
) -> impl Fn(Request, Option<T>) -> Result<R, Error> + Send + Sync + 'static
where
    F: Fn(Request, T) -> Result<R, Error> + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: ResponseWrapper + Send + 'static,
{
    move |req, body_data| match body_data {
        Some(data) => handler(req, data),
        None => Err(Error::InvalidRequestBody("Missing request body".to_string())),
    }
}

// 非同期: Option<T> から T を要求し、なければ即時エラーfutureを返すアダプタ
fn require_body_async<F, T, R, Fut>(
    handler: F,
) -> impl Fn(Request, Option<T>) -> BodyOrError<Fut, R> + Send + Sync + 'static
where
    F: Fn(Request, T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: ResponseWrapper + Send + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
{
    move |req, body_data| match body_data {
        Some(data) => future::Either::Right(handler(req, data)),
        None => future::Either::Left(future::ready(Err(Error::InvalidRequestBody(
            "Missing request body".to_string(),
        )))),
    }
}

/// ボディなしの同期ルートを作成
fn bodyless<F, R>(
    method: Method,
    path: &str,
    handler: F,
) -> Result<RouteHandler<impl Fn(Request, Option<()>) -> Result<R, Error> + Send + Sync + 'static, (), R>, Error>
where
    F: Fn(Request) -> Result<R, Error> + Send + Sync + 'static,
    R: ResponseWrapper + Send + 'static,
{
    RouteHandler::try_new(method, path, move |req, _| handler(req))
}

/// ボディなしの非同期ルートを作成
fn async_bodyless<F, R, Fut>(
    method: Method,
    path: &str,
    handler: F,
) -> Result<AsyncRouteHandler<impl Fn(Request, Option<()>) -> Fut + Send + Sync + 'static, (), R, Fut>, Error>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    R: ResponseWrapper + Send + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
{
    AsyncRouteHandler::try_new(method, path, move |req, _| handler(req))
}

/// GETハンドラーを作成
pub fn get<F, R>(
    path: &str,
    handler: F,
) -> Result<RouteHandler<impl Fn(Request, Option<()>) -> Result<R, Error> + Send + Sync + 'static, (), R>, Error>
where
    F: Fn(Request) -> Result<R, Error> + Send + Sync + 'static,
    R: ResponseWrapper + Send + 'static,
{
    bodyless(Method::GET, path, handler)
}

/// 非同期GETハンドラーを作成
pub fn async_get<F, R, Fut>(
    path: &str,
    handler: F,
) -> Result<AsyncRouteHandler<impl Fn(Request, Option<()>) -> Fut + Send + Sync + 'static, (), R, Fut>, Error>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    R: ResponseWrapper + Send + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
{
    async_bodyless(Method::GET, path, handler)
}

/// POSTハンドラーを作成（JSONボディ必須）
pub fn post<F, T, R>(
    path: &str,
    handler: F,
) -> Result<RouteHandler<impl Fn(Request, Option<T>) -> Result<R, Error> + Send + Sync + 'static, T, R>, Error>
where
    F: Fn(Request, T) -> Result<R, Error> + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: ResponseWrapper + Send + 'static,
{
    RouteHandler::try_new(Method::POST, path, require_body_sync(handler))
}

/// 非同期POSTハンドラーを作成（JSONボディ必須）
pub fn async_post<F, T, R, Fut>(
    path: &str,
    handler: F,
) -> Result<AsyncRouteHandler<impl Fn(Request, Option<T>) -> BodyOrError<Fut, R> + Send + Sync + 'static, T, R, BodyOrError<Fut, R>>, Error>
where
    F: Fn(Request, T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: ResponseWrapper + Send + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
{
    AsyncRouteHandler::try_new(Method::POST, path, require_body_async(handler))
}

/// PUTハンドラーを作成（JSONボディ必須）
pub fn put<F, T, R>(
    path: &str,
    handler: F,
) -> Result<RouteHandler<impl Fn(Request, Option<T>) -> Result<R, Error> + Send + Sync + 'static, T, R>, Error>
where
    F: Fn(Request, T) -> Result<R, Error> + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: ResponseWrapper + Send + 'static,
{
    RouteHandler::try_new(Method::PUT, path, require_body_sync(handler))
}

/// DELETEハンドラーを作成
pub fn delete<F, R>(
    path: &str,
    handler: F,
) -> Result<RouteHandler<impl Fn(Request, Option<()>) -> Result<R, Error> + Send + Sync + 'static, (), R>, Error>
where
    F: Fn(Request) -> Result<R, Error> + Send + Sync + 'static,
    R: ResponseWrapper + Send + 'static,
{
    bodyless(Method::DELETE, path, handler)
}

/// 非同期DELETEハンドラーを作成
pub fn async_delete<F, R, Fut>(
    path: &str,
    handler: F,
) -> Result<AsyncRouteHandler<impl Fn(Request, Option<()>) -> Fut + Send + Sync + 'static, (), R, Fut>, Error>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    R: ResponseWrapper + Send + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
{
    async_bodyless(Method::DELETE, path, handler)
}

/// OPTIONSハンドラーを作成
pub fn options<F, R>(
    path: &str,
    handler: F,
) -> Result<RouteHandler<impl Fn(Request, Option<()>) -> Result<R, Error> + Send + Sync + 'static, (), R>, Error>
where
    F: Fn(Request) -> Result<R, Error> + Send + Sync + 'static,
    R: ResponseWrapper + Send + 'static,
{
    bodyless(Method::OPTIONS, path, handler)
}
