//! 組み込みアダプター

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::common::{Request, Response};
use crate::error::Error;
use crate::handler::{Handler, ModelAndView};

use super::HandlerAdapter;

/// 関数ルート用。ルートの返したレスポンスで置き換え、ビューは返さない
pub struct RouteHandlerAdapter;

#[async_trait]
impl HandlerAdapter for RouteHandlerAdapter {
    fn supports(&self, handler: &Handler) -> bool {
        matches!(handler, Handler::Route(_))
    }

    async fn handle(
        &self,
        req: &mut Request,
        res: &mut Response,
        handler: &Handler,
    ) -> Result<Option<ModelAndView>, Error> {
        let route = match handler {
            Handler::Route(route) => route,
            _ => return Err(Error::NoAdapterFound(handler.description())),
        };
        let mut produced = route.handle(req).await?;
        // インターセプターが先に付けたクッキーは残す
        for cookie in std::mem::take(&mut res.cookies) {
            if !produced.cookies.iter().any(|c| c.name == cookie.name) {
                produced.cookies.push(cookie);
            }
        }
        for (key, value) in std::mem::take(&mut res.headers) {
            if produced.header(&key).is_none() {
                produced.headers.insert(key, value);
            }
        }
        *res = produced;
        Ok(None)
    }
}

/// `Controller` 用。コントローラーの結果をそのまま返す
pub struct ControllerAdapter;

#[async_trait]
impl HandlerAdapter for ControllerAdapter {
    fn supports(&self, handler: &Handler) -> bool {
        matches!(handler, Handler::Controller(_))
    }

    async fn handle(
        &self,
        req: &mut Request,
        res: &mut Response,
        handler: &Handler,
    ) -> Result<Option<ModelAndView>, Error> {
        match handler {
            Handler::Controller(controller) => controller.handle_request(req, res).await,
            _ => Err(Error::NoAdapterFound(handler.description())),
        }
    }

    fn last_modified(&self, req: &Request, handler: &Handler) -> Option<DateTime<Utc>> {
        match handler {
            Handler::Controller(controller) => controller.last_modified(req),
            _ => None,
        }
    }
}

/// `HttpRequestHandler` 用。常にレスポンス書き込み済みとして扱う
pub struct HttpRequestHandlerAdapter;

#[async_trait]
impl HandlerAdapter for HttpRequestHandlerAdapter {
    fn supports(&self, handler: &Handler) -> bool {
        matches!(handler, Handler::HttpRequest(_))
    }

    async fn handle(
        &self,
        req: &mut Request,
        res: &mut Response,
        handler: &Handler,
    ) -> Result<Option<ModelAndView>, Error> {
        match handler {
            Handler::HttpRequest(inner) => {
                inner.handle_request(req, res).await?;
                Ok(None)
            }
            _ => Err(Error::NoAdapterFound(handler.description())),
        }
    }
}
