use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use mvcbridge::common::{Attribute, Method, Request, Response};
use mvcbridge::error::Error;
use mvcbridge::handler::{self, Controller, Handler, HttpRequestHandler, ModelAndView};
use mvcbridge::interceptor::{HandlerInterceptor, MappedInterceptor};
use mvcbridge::locale::{self, CookieLocaleResolver};
use mvcbridge::mapping::{RouteHandlerMapping, SimpleUrlHandlerMapping};
use mvcbridge::multipart::StandardMultipartResolver;
use mvcbridge::MvcBridge;

#[derive(Serialize, Deserialize)]
struct Item {
    id: String,
    name: String,
    description: Option<String>,
}

#[derive(Serialize)]
struct ItemList {
    items: Vec<Item>,
}

// ヘルスチェック
fn health_handler(_req: Request) -> Result<serde_json::Value, Error> {
    Ok(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn get_items(_req: Request) -> Result<ItemList, Error> {
    let items = vec![
        Item {
            id: "1".to_string(),
            name: "Item 1".to_string(),
            description: Some("Description for item 1".to_string()),
        },
        Item {
            id: "2".to_string(),
            name: "Item 2".to_string(),
            description: None,
        },
    ];
    Ok(ItemList { items })
}

fn get_item(req: Request) -> Result<Item, Error> {
    let id = req
        .context()
        .attribute::<HashMap<String, String>>(Attribute::UriTemplateVariables)
        .and_then(|vars| vars.get("id").cloned())
        .ok_or_else(|| Error::InvalidRequestBody("missing item id".to_string()))?;
    Ok(Item {
        name: format!("Item {}", id),
        id,
        description: None,
    })
}

fn create_item(_req: Request, item: Item) -> Result<Item, Error> {
    info!("Creating new item: {}", item.name);
    Ok(item)
}

/// 現在のロケールで挨拶するコントローラー
struct GreetingController;

#[async_trait]
impl Controller for GreetingController {
    async fn handle_request(
        &self,
        req: &mut Request,
        res: &mut Response,
    ) -> Result<Option<ModelAndView>, Error> {
        if let Some(lang) = req.query_params.get("lang").cloned() {
            let new_locale = lang
                .parse()
                .map_err(|e| Error::InvalidRequestBody(format!("invalid locale '{}': {}", lang, e)))?;
            locale::change_locale(req, Some(res), Some(new_locale))?;
        }
        let current = locale::current_locale(req);
        let greeting = match current.language.as_str() {
            "ja" => "こんにちは",
            "fr" => "Bonjour",
            "de" => "Hallo",
            _ => "Hello",
        };
        Ok(Some(
            ModelAndView::empty()
                .with_object("greeting", &greeting)?
                .with_object("locale", &current.to_string())?,
        ))
    }
}

/// アップロードされたファイルの概要を返すハンドラー
struct UploadHandler;

#[async_trait]
impl HttpRequestHandler for UploadHandler {
    async fn handle_request(&self, req: &mut Request, res: &mut Response) -> Result<(), Error> {
        let parts = req
            .multipart()
            .ok_or_else(|| Error::InvalidRequestBody("multipart body required".to_string()))?;
        let files: Vec<serde_json::Value> = parts
            .file_names()
            .flat_map(|name| parts.files(name))
            .map(|file| {
                serde_json::json!({
                    "name": file.name(),
                    "filename": file.original_filename(),
                    "size": file.size(),
                    "in_memory": file.is_in_memory(),
                })
            })
            .collect();
        *res = Response::ok().json(&serde_json::json!({ "files": files }))?;
        Ok(())
    }
}

/// 静的ファイルの代わりにパスを返すハンドラー
struct StaticHandler;

#[async_trait]
impl HttpRequestHandler for StaticHandler {
    async fn handle_request(&self, req: &mut Request, res: &mut Response) -> Result<(), Error> {
        let within = req
            .context()
            .attribute::<String>(Attribute::PathWithinHandlerMapping)
            .cloned()
            .unwrap_or_default();
        *res = Response::ok().text(format!("static resource: {}", within));
        Ok(())
    }
}

/// 処理時間を記録するインターセプター
struct TimingInterceptor;

const STARTED_AT: &str = "demo.timing.started";

#[async_trait]
impl HandlerInterceptor for TimingInterceptor {
    async fn pre_handle(&self, req: &mut Request, _res: &mut Response, _handler: &Handler) -> Result<bool, Error> {
        req.context_mut().set(STARTED_AT, Instant::now());
        Ok(true)
    }

    async fn after_completion(
        &self,
        req: &mut Request,
        _res: &mut Response,
        handler: &Handler,
        error: Option<&Error>,
    ) -> Result<(), Error> {
        if let Some(started) = req.context().get::<Instant>(STARTED_AT) {
            info!(
                "{} {} handled by {} in {:?} (error: {})",
                req.method,
                req.path,
                handler.description(),
                started.elapsed(),
                error.is_some()
            );
        }
        Ok(())
    }
}

/// `X-Auth-Token` を要求するインターセプター
struct AuthInterceptor;

#[async_trait]
impl HandlerInterceptor for AuthInterceptor {
    async fn pre_handle(&self, req: &mut Request, res: &mut Response, _handler: &Handler) -> Result<bool, Error> {
        match req.header("X-Auth-Token") {
            Some("secret-token") => Ok(true),
            _ => {
                *res = Response::new(401).text("authentication required");
                Ok(false)
            }
        }
    }
}

fn build_app() -> Result<MvcBridge, Error> {
    let routes = RouteHandlerMapping::new()
        .route(handler::get("/", health_handler)?)
        .route(handler::get("/items", get_items)?)
        .route(handler::get(r"/items/(?P<id>[^/]+)", get_item)?.with_produces("application/json"))
        .route(handler::post("/items", create_item)?)
        .interceptor(TimingInterceptor)
        .mapped_interceptor(MappedInterceptor::new(AuthInterceptor).include("/admin/.*")?)
        .with_order(0);

    let urls = SimpleUrlHandlerMapping::new()
        .map("/static/*", Handler::http_request(StaticHandler))?
        .map("/greeting", Handler::controller(GreetingController))?
        .map("/upload", Handler::http_request(UploadHandler))?
        .interceptor(TimingInterceptor)
        .with_order(10);

    Ok(MvcBridge::builder()
        .mapping(routes)
        .mapping(urls)
        .locale_resolver(CookieLocaleResolver::new())
        .multipart_resolver(StandardMultipartResolver::from_env())
        .build())
}

fn print_response(label: &str, res: &Response) {
    println!("== {} -> {}", label, res.status);
    let mut headers: Vec<_> = res.headers.iter().collect();
    headers.sort();
    for (key, value) in headers {
        println!("{}: {}", key, value);
    }
    for cookie in res.set_cookie_headers() {
        println!("Set-Cookie: {}", cookie);
    }
    if let Some(body) = &res.body {
        println!("{}", String::from_utf8_lossy(body));
    }
}

#[tokio::main]
async fn main() {
    // ロガーの初期化
    env_logger::init();

    let app = match build_app() {
        Ok(app) => Arc::new(app),
        Err(e) => {
            eprintln!("Failed to build application: {}", e);
            std::process::exit(1);
        }
    };

    // 引数があれば `METHOD PATH [BODY]` を1件処理する
    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() >= 2 {
        let method = match Method::from_str(&args[0]) {
            Some(method) => method,
            None => {
                eprintln!("Unsupported method: {}", args[0]);
                std::process::exit(2);
            }
        };
        let (path, query) = match args[1].split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (args[1].clone(), String::new()),
        };
        let mut req = Request::new(method, path).with_query_string(&query);
        if let Some(body) = args.get(2) {
            req = req
                .with_header("Content-Type", "application/json")
                .with_body(body.clone().into_bytes());
        }
        let res = app.handle(req).await;
        print_response(&args[1], &res);
        return;
    }

    info!("No request given, running sample requests");
    let samples = vec![
        ("GET /", Request::new(Method::GET, "/")),
        ("GET /items/42", Request::new(Method::GET, "/items/42")),
        (
            "POST /items",
            Request::new(Method::POST, "/items")
                .with_header("Content-Type", "application/json")
                .with_body(br#"{"id":"3","name":"Item 3","description":null}"#.to_vec()),
        ),
        ("GET /static/css/app.css", Request::new(Method::GET, "/static/css/app.css")),
        (
            "GET /greeting?lang=ja",
            Request::new(Method::GET, "/greeting").with_query_param("lang", "ja"),
        ),
        ("GET /admin/users", Request::new(Method::GET, "/admin/users")),
        ("GET /missing", Request::new(Method::GET, "/missing")),
    ];

    for (label, req) in samples {
        let res = app.handle(req).await;
        print_response(label, &res);
    }
}
