//! ディスパッチ全体のインテグレーションテスト

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use mvcbridge::common::{Attribute, Method, Request, Response};
use mvcbridge::error::{Error, MultipartError};
use mvcbridge::handler::{self, Controller, Handler, HttpRequestHandler, ModelAndView};
use mvcbridge::interceptor::HandlerInterceptor;
use mvcbridge::locale::{self, CookieLocaleResolver, FixedLocaleResolver};
use mvcbridge::mapping::{RouteHandlerMapping, SimpleUrlHandlerMapping};
use mvcbridge::multipart::{MultipartConfig, StandardMultipartResolver};
use mvcbridge::{DispatchOutcome, MvcBridge};
use unic_langid::langid;

type Log = Arc<Mutex<Vec<String>>>;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

// 呼び出し順を記録するインターセプター
struct Recording {
    name: &'static str,
    allow: bool,
    log: Log,
}

impl Recording {
    fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            allow: true,
            log: log.clone(),
        }
    }

    fn rejecting(name: &'static str, log: &Log) -> Self {
        Self {
            allow: false,
            ..Self::new(name, log)
        }
    }
}

#[async_trait]
impl HandlerInterceptor for Recording {
    async fn pre_handle(&self, _req: &mut Request, res: &mut Response, _handler: &Handler) -> Result<bool, Error> {
        self.log.lock().unwrap().push(format!("{}.pre", self.name));
        if !self.allow {
            res.status = 403;
        }
        Ok(self.allow)
    }

    async fn post_handle(
        &self,
        _req: &mut Request,
        _res: &mut Response,
        _handler: &Handler,
        _model_and_view: Option<&mut ModelAndView>,
    ) -> Result<(), Error> {
        self.log.lock().unwrap().push(format!("{}.post", self.name));
        Ok(())
    }

    async fn after_completion(
        &self,
        _req: &mut Request,
        _res: &mut Response,
        _handler: &Handler,
        error: Option<&Error>,
    ) -> Result<(), Error> {
        let suffix = if error.is_some() { "(err)" } else { "" };
        self.log.lock().unwrap().push(format!("{}.after{}", self.name, suffix));
        Ok(())
    }
}

// 呼ばれたことを記録し、必要ならエラーを返すハンドラー
struct Stub {
    name: &'static str,
    fail: bool,
    log: Log,
}

#[async_trait]
impl HttpRequestHandler for Stub {
    async fn handle_request(&self, _req: &mut Request, res: &mut Response) -> Result<(), Error> {
        self.log.lock().unwrap().push(format!("{}.handle", self.name));
        if self.fail {
            return Err(Error::Dispatch(format!("{} failed", self.name)));
        }
        *res = Response::ok().text(self.name);
        Ok(())
    }
}

fn stub(name: &'static str, log: &Log) -> Handler {
    Handler::http_request(Stub {
        name,
        fail: false,
        log: log.clone(),
    })
}

fn failing_stub(name: &'static str, log: &Log) -> Handler {
    Handler::http_request(Stub {
        name,
        fail: true,
        log: log.clone(),
    })
}

fn body_text(res: &Response) -> String {
    String::from_utf8(res.body.clone().unwrap_or_default()).unwrap()
}

#[tokio::test]
async fn test_highest_priority_mapping_wins() {
    init_logger();
    let log = new_log();
    let low = SimpleUrlHandlerMapping::new()
        .map("/items", stub("low", &log))
        .unwrap()
        .with_order(10);
    let high = SimpleUrlHandlerMapping::new()
        .map("/items", stub("high", &log))
        .unwrap()
        .with_order(1);
    let fallback = SimpleUrlHandlerMapping::new().default_handler(stub("fallback", &log));

    // 登録順ではなく優先度で選ばれる
    let app = MvcBridge::builder()
        .mapping(fallback)
        .mapping(low)
        .mapping(high)
        .build();

    let res = app.handle(Request::new(Method::GET, "/items")).await;
    assert_eq!(res.status, 200);
    assert_eq!(body_text(&res), "high");

    // どれにも一致しなければ優先度のないフォールバックへ
    let res = app.handle(Request::new(Method::GET, "/other")).await;
    assert_eq!(body_text(&res), "fallback");
    assert_eq!(entries(&log), vec!["high.handle", "fallback.handle"]);
}

#[tokio::test]
async fn test_explicit_priority_overrides_mapping_order() {
    let log = new_log();
    let first = SimpleUrlHandlerMapping::new()
        .map("/a", stub("first", &log))
        .unwrap()
        .with_order(1);
    let second = SimpleUrlHandlerMapping::new()
        .map("/a", stub("second", &log))
        .unwrap()
        .with_order(100);

    let app = MvcBridge::builder()
        .mapping(first)
        .mapping_with_priority(second, -5)
        .build();

    let res = app.handle(Request::new(Method::GET, "/a")).await;
    assert_eq!(body_text(&res), "second");
}

#[tokio::test]
async fn test_interceptor_short_circuit_runs_after_completion_in_reverse() {
    let log = new_log();
    let mapping = SimpleUrlHandlerMapping::new()
        .map("/secure", stub("handler", &log))
        .unwrap()
        .interceptor(Recording::new("I1", &log))
        .interceptor(Recording::rejecting("I2", &log))
        .interceptor(Recording::new("I3", &log));
    let app = MvcBridge::builder().mapping(mapping).build();

    let outcome = app.dispatch(Request::new(Method::GET, "/secure")).await.unwrap();
    match &outcome {
        DispatchOutcome::ShortCircuited(res) => assert_eq!(res.status, 403),
        other => panic!("expected short circuit, got {:?}", other),
    }
    assert_eq!(entries(&log), vec!["I1.pre", "I2.pre", "I2.after", "I1.after"]);
}

#[tokio::test]
async fn test_successful_dispatch_hook_order() {
    let log = new_log();
    let mapping = SimpleUrlHandlerMapping::new()
        .map("/ok", stub("handler", &log))
        .unwrap()
        .interceptor(Recording::new("I1", &log))
        .interceptor(Recording::new("I2", &log));
    let app = MvcBridge::builder().mapping(mapping).build();

    let outcome = app.dispatch(Request::new(Method::GET, "/ok")).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Completed(_)));
    assert_eq!(
        entries(&log),
        vec!["I1.pre", "I2.pre", "handler.handle", "I2.post", "I1.post", "I2.after", "I1.after"]
    );
}

#[tokio::test]
async fn test_handler_error_reaches_after_completion() {
    let log = new_log();
    let mapping = SimpleUrlHandlerMapping::new()
        .map("/boom", failing_stub("handler", &log))
        .unwrap()
        .interceptor(Recording::new("I1", &log))
        .interceptor(Recording::new("I2", &log));
    let app = MvcBridge::builder().mapping(mapping).build();

    let err = app.dispatch(Request::new(Method::GET, "/boom")).await.unwrap_err();
    assert!(matches!(err, Error::Dispatch(_)));
    // post_handle は呼ばれない
    assert_eq!(
        entries(&log),
        vec!["I1.pre", "I2.pre", "handler.handle", "I2.after(err)", "I1.after(err)"]
    );

    let res = app.handle(Request::new(Method::GET, "/boom")).await;
    assert_eq!(res.status, 500);
    assert_eq!(body_text(&res), "Internal Server Error");
}

#[tokio::test]
async fn test_no_adapter_for_custom_handler() {
    let log = new_log();
    let mapping = SimpleUrlHandlerMapping::new()
        .map("/custom", Handler::custom("opaque", 7u8))
        .unwrap()
        .interceptor(Recording::new("I1", &log));
    let app = MvcBridge::builder().mapping(mapping).build();

    let err = app.dispatch(Request::new(Method::GET, "/custom")).await.unwrap_err();
    match err {
        Error::NoAdapterFound(description) => assert_eq!(description, "custom handler opaque"),
        other => panic!("expected NoAdapterFound, got {:?}", other),
    }
    // アダプター選択はインターセプターより前
    assert!(entries(&log).is_empty());
    assert_eq!(app.handle(Request::new(Method::GET, "/custom")).await.status, 500);
}

#[tokio::test]
async fn test_not_found_and_throw_if_no_handler_found() {
    let app = MvcBridge::builder()
        .mapping(RouteHandlerMapping::new())
        .build();
    let outcome = app.dispatch(Request::new(Method::GET, "/nothing")).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::NotFound));
    assert_eq!(app.handle(Request::new(Method::GET, "/nothing")).await.status, 404);

    let strict = MvcBridge::builder()
        .mapping(RouteHandlerMapping::new())
        .throw_if_no_handler_found(true)
        .build();
    let err = strict.dispatch(Request::new(Method::DELETE, "/nothing")).await.unwrap_err();
    match err {
        Error::NoHandlerFound { method, path } => {
            assert_eq!(method, "DELETE");
            assert_eq!(path, "/nothing");
        }
        other => panic!("expected NoHandlerFound, got {:?}", other),
    }
}

// 最終更新日時を持つコントローラー
struct Catalog {
    updated: DateTime<Utc>,
}

#[async_trait]
impl Controller for Catalog {
    async fn handle_request(
        &self,
        _req: &mut Request,
        _res: &mut Response,
    ) -> Result<Option<ModelAndView>, Error> {
        Ok(Some(ModelAndView::empty().with_object("count", &3)?))
    }

    fn last_modified(&self, _req: &Request) -> Option<DateTime<Utc>> {
        Some(self.updated)
    }
}

fn catalog_app() -> MvcBridge {
    let updated = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    MvcBridge::builder()
        .mapping(
            SimpleUrlHandlerMapping::new()
                .map("/catalog/list.html", Handler::controller(Catalog { updated }))
                .unwrap(),
        )
        .build()
}

#[tokio::test]
async fn test_conditional_get_not_modified() {
    let app = catalog_app();

    let req = Request::new(Method::GET, "/catalog/list.html")
        .with_header("If-Modified-Since", "Mon, 01 Jan 2024 12:00:00 GMT");
    match app.dispatch(req).await.unwrap() {
        DispatchOutcome::NotModified(res) => {
            assert_eq!(res.status, 304);
            assert_eq!(res.header("Last-Modified"), Some("Mon, 01 Jan 2024 12:00:00 GMT"));
        }
        other => panic!("expected NotModified, got {:?}", other),
    }

    // 古い日時なら通常どおり処理される
    let req = Request::new(Method::GET, "/catalog/list.html")
        .with_header("If-Modified-Since", "Sun, 31 Dec 2023 12:00:00 GMT");
    match app.dispatch(req).await.unwrap() {
        DispatchOutcome::View { response, .. } => {
            assert_eq!(response.status, 200);
            assert_eq!(response.header("Last-Modified"), Some("Mon, 01 Jan 2024 12:00:00 GMT"));
        }
        other => panic!("expected View, got {:?}", other),
    }

    // RFC 850 / asctime 形式の日付も解釈する
    for since in ["Monday, 01-Jan-24 12:00:00 GMT", "Mon Jan  1 12:00:00 2024"] {
        let req = Request::new(Method::HEAD, "/catalog/list.html").with_header("If-Modified-Since", since);
        assert!(matches!(app.dispatch(req).await.unwrap(), DispatchOutcome::NotModified(_)), "{}", since);
    }

    // GET/HEAD 以外は判定しない
    let req = Request::new(Method::POST, "/catalog/list.html")
        .with_header("If-Modified-Since", "Mon, 01 Jan 2024 12:00:00 GMT");
    assert!(matches!(app.dispatch(req).await.unwrap(), DispatchOutcome::View { .. }));
}

#[tokio::test]
async fn test_default_view_name_is_derived_from_path() {
    let app = catalog_app();
    match app.dispatch(Request::new(Method::GET, "/catalog/list.html")).await.unwrap() {
        DispatchOutcome::View { model_and_view, response } => {
            assert_eq!(model_and_view.view_name(), Some("catalog/list"));
            assert_eq!(model_and_view.model().get("count"), Some(&serde_json::json!(3)));
            assert_eq!(response.status, 200);
        }
        other => panic!("expected a view, got {:?}", other),
    }

    let res = app.handle(Request::new(Method::GET, "/catalog/list.html")).await;
    assert_eq!(res.header("X-View-Name"), Some("catalog/list"));
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Published {
    id: Option<String>,
    pattern: Option<String>,
    within: Option<String>,
    produces: Option<Vec<String>>,
    color: Option<String>,
}

fn inspect_attributes(req: Request) -> Result<Published, Error> {
    let context = req.context();
    let vars = context.attribute::<HashMap<String, String>>(Attribute::UriTemplateVariables);
    let matrix = context.attribute::<mvcbridge::common::MatrixVariables>(Attribute::MatrixVariables);
    Ok(Published {
        id: vars.and_then(|v| v.get("id").cloned()),
        pattern: context.attribute::<String>(Attribute::BestMatchingPattern).cloned(),
        within: context.attribute::<String>(Attribute::PathWithinHandlerMapping).cloned(),
        produces: context.attribute::<Vec<String>>(Attribute::ProducibleMediaTypes).cloned(),
        color: matrix
            .and_then(|m| m.get("id"))
            .and_then(|values| values.get("color"))
            .and_then(|colors| colors.first().cloned()),
    })
}

#[tokio::test]
async fn test_route_mapping_publishes_attributes() {
    let mapping = RouteHandlerMapping::new().route(
        handler::get(r"/cars/(?P<id>[^/]+)", inspect_attributes)
            .unwrap()
            .with_produces("application/json"),
    );
    let app = MvcBridge::builder().mapping(mapping).build();

    let res = app.handle(Request::new(Method::GET, "/cars/42;color=red")).await;
    assert_eq!(res.status, 200);
    let published: Published = serde_json::from_slice(&res.body.unwrap()).unwrap();
    assert_eq!(
        published,
        Published {
            id: Some("42".to_string()),
            pattern: Some("^/cars/(?P<id>[^/]+)$".to_string()),
            within: Some("/cars/42".to_string()),
            produces: Some(vec!["application/json".to_string()]),
            color: Some("red".to_string()),
        }
    );
}

// アップロードされたファイルの一時パスを記録するハンドラー
struct UploadStub {
    seen: Arc<Mutex<Vec<PathBuf>>>,
    fail: bool,
}

#[async_trait]
impl HttpRequestHandler for UploadStub {
    async fn handle_request(&self, req: &mut Request, res: &mut Response) -> Result<(), Error> {
        let parts = req
            .multipart()
            .ok_or_else(|| Error::InvalidRequestBody("multipart body required".to_string()))?;
        let file = parts
            .file("doc")
            .ok_or_else(|| Error::InvalidRequestBody("missing part 'doc'".to_string()))?;
        if let Some(path) = file.path() {
            assert!(path.exists());
            self.seen.lock().unwrap().push(path);
        }
        if self.fail {
            return Err(Error::Dispatch("upload rejected".to_string()));
        }
        *res = Response::ok().text(format!("{} bytes", file.size()));
        Ok(())
    }
}

fn upload_request(path: &str, content: &str) -> Request {
    let body = format!(
        "--XBOUNDARY\r\n\
         Content-Disposition: form-data; name=\"title\"\r\n\r\n\
         report\r\n\
         --XBOUNDARY\r\n\
         Content-Disposition: form-data; name=\"doc\"; filename=\"report.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         {}\r\n\
         --XBOUNDARY--\r\n",
        content
    );
    Request::new(Method::POST, path)
        .with_header("Content-Type", "multipart/form-data; boundary=XBOUNDARY")
        .with_body(body.into_bytes())
}

fn upload_app(dir: &std::path::Path, seen: &Arc<Mutex<Vec<PathBuf>>>) -> MvcBridge {
    let resolver = StandardMultipartResolver::new(
        MultipartConfig::new()
            .with_file_size_threshold(16)
            .with_temp_dir(dir),
    );
    let mapping = SimpleUrlHandlerMapping::new()
        .map(
            "/upload",
            Handler::http_request(UploadStub {
                seen: seen.clone(),
                fail: false,
            }),
        )
        .unwrap()
        .map(
            "/upload-fail",
            Handler::http_request(UploadStub {
                seen: seen.clone(),
                fail: true,
            }),
        )
        .unwrap();
    MvcBridge::builder()
        .mapping(mapping)
        .multipart_resolver(resolver)
        .build()
}

fn temp_dir_is_empty(dir: &std::path::Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn test_multipart_temp_files_released_after_success() {
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = upload_app(dir.path(), &seen);

    let content = "a".repeat(200);
    let res = app.handle(upload_request("/upload", &content)).await;
    assert_eq!(res.status, 200);
    assert_eq!(body_text(&res), "200 bytes");

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert!(!seen[0].exists());
    assert!(temp_dir_is_empty(dir.path()));
}

#[tokio::test]
async fn test_multipart_temp_files_released_after_handler_error() {
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = upload_app(dir.path(), &seen);

    let content = "b".repeat(200);
    let err = app
        .dispatch(upload_request("/upload-fail", &content))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Dispatch(_)));

    assert_eq!(seen.lock().unwrap().len(), 1);
    assert!(temp_dir_is_empty(dir.path()));
}

#[tokio::test]
async fn test_multipart_temp_files_released_when_no_handler() {
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = upload_app(dir.path(), &seen);

    let outcome = app
        .dispatch(upload_request("/elsewhere", &"c".repeat(200)))
        .await
        .unwrap();
    assert!(matches!(outcome, DispatchOutcome::NotFound));
    assert!(temp_dir_is_empty(dir.path()));
}

#[tokio::test]
async fn test_multipart_parse_failure_skips_handler() {
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = upload_app(dir.path(), &seen);

    let req = Request::new(Method::POST, "/upload")
        .with_header("Content-Type", "multipart/form-data")
        .with_body(b"not really multipart".to_vec());
    let err = app.dispatch(req).await.unwrap_err();
    assert!(matches!(err, Error::Multipart(MultipartError::MissingBoundary(_))));
    assert!(seen.lock().unwrap().is_empty());

    let req = Request::new(Method::POST, "/upload")
        .with_header("Content-Type", "multipart/form-data")
        .with_body(b"not really multipart".to_vec());
    assert_eq!(app.handle(req).await.status, 400);
}

// ロケールを変更して現在値を返すコントローラー
struct LocaleSwitch;

#[async_trait]
impl Controller for LocaleSwitch {
    async fn handle_request(
        &self,
        req: &mut Request,
        res: &mut Response,
    ) -> Result<Option<ModelAndView>, Error> {
        if let Some(lang) = req.query_params.get("lang").cloned() {
            let locale = lang
                .parse()
                .map_err(|_| Error::InvalidRequestBody(format!("bad locale {}", lang)))?;
            locale::change_locale(req, Some(res), Some(locale))?;
        }
        let current = locale::current_locale(req).to_string();
        Ok(Some(ModelAndView::new("locale").with_object("locale", &current)?))
    }
}

fn locale_of(outcome: &DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::View { model_and_view, .. } => model_and_view
            .model()
            .get("locale")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        other => panic!("expected a view, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cookie_locale_round_trip() {
    let app = MvcBridge::builder()
        .mapping(
            SimpleUrlHandlerMapping::new()
                .map("/locale", Handler::controller(LocaleSwitch))
                .unwrap(),
        )
        .locale_resolver(CookieLocaleResolver::new())
        .build();

    // Accept-Language だけのとき
    let req = Request::new(Method::GET, "/locale").with_header("Accept-Language", "fr-CA,fr;q=0.8");
    assert_eq!(locale_of(&app.dispatch(req).await.unwrap()), "fr-CA");

    // 変更すると同じリクエスト内で反映され、クッキーが発行される
    let req = Request::new(Method::GET, "/locale")
        .with_query_param("lang", "ja")
        .with_header("Accept-Language", "fr");
    let outcome = app.dispatch(req).await.unwrap();
    assert_eq!(locale_of(&outcome), "ja");
    let cookies = outcome.response().unwrap().set_cookie_headers();
    assert_eq!(cookies, vec!["LOCALE=ja; Path=/; SameSite=Lax".to_string()]);

    // 次のリクエストではクッキーが Accept-Language より優先される
    let req = Request::new(Method::GET, "/locale")
        .with_header("Cookie", "LOCALE=ja")
        .with_header("Accept-Language", "fr");
    assert_eq!(locale_of(&app.dispatch(req).await.unwrap()), "ja");
}

#[tokio::test]
async fn test_fixed_locale_rejects_change() {
    let app = MvcBridge::builder()
        .mapping(
            SimpleUrlHandlerMapping::new()
                .map("/locale", Handler::controller(LocaleSwitch))
                .unwrap(),
        )
        .locale_resolver(FixedLocaleResolver::new(langid!("de")))
        .build();

    let req = Request::new(Method::GET, "/locale").with_header("Accept-Language", "fr");
    assert_eq!(locale_of(&app.dispatch(req).await.unwrap()), "de");

    let req = Request::new(Method::GET, "/locale").with_query_param("lang", "ja");
    let err = app.dispatch(req).await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation(_)));
}

#[tokio::test]
async fn test_concurrent_dispatch_shares_bridge() {
    let log = new_log();
    let app = Arc::new(
        MvcBridge::builder()
            .mapping(
                SimpleUrlHandlerMapping::new()
                    .map("/shared", stub("shared", &log))
                    .unwrap(),
            )
            .build(),
    );

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move { app.handle(Request::new(Method::GET, "/shared")).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().status, 200);
    }
    assert_eq!(entries(&log).len(), 8);
}
