//! マルチパートリクエストの検出・解析・後始末
//!
//! 状態遷移:
//! `Unchecked` -> (`NotMultipart` | `MultipartDetected`) -> (`Parsed` | `ParseFailed`) -> `CleanedUp`

pub mod config;
pub mod parts;
pub mod request;
pub mod standard;

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, trace};

use crate::common::Request;
use crate::error::Error;

pub use self::config::MultipartConfig;
pub use self::parts::{MultipartFile, MultipartParts};
pub use self::request::MultipartRequest;
pub use self::standard::StandardMultipartResolver;

/// 1リクエストにおけるマルチパート処理の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipartState {
    /// まだ判定していない
    Unchecked,
    /// マルチパートではない
    NotMultipart,
    /// マルチパートと判定された（未解析）
    MultipartDetected,
    /// 解析済み（一時ストレージを保持している可能性がある）
    Parsed,
    /// 解析に失敗した
    ParseFailed,
    /// 一時ストレージを解放済み
    CleanedUp,
}

/// マルチパートリゾルバーの特性
#[async_trait]
pub trait MultipartResolver: Send + Sync {
    /// マルチパートとして扱うべきリクエストか
    fn is_multipart(&self, req: &Request) -> bool;

    /// リクエストを解析してファイルとフィールドを取り出す
    async fn resolve_multipart(&self, req: Request) -> Result<MultipartRequest, Error>;

    /// 解析で確保した一時ストレージを解放する
    ///
    /// 何度呼んでもよく、解析していないリクエストに対しては何もしない。
    fn cleanup_multipart(&self, req: &mut Request) {
        if let Some(parts) = req.multipart() {
            if parts.release() {
                debug!("Cleaned up multipart storage for {} {}", req.method, req.path);
            }
        }
    }
}

/// リクエストを所有し、破棄時にマルチパートの後始末を行うガード
///
/// ハンドラー呼び出しの間ずっと保持しておけば、正常終了・エラー・
/// タスクのキャンセルのいずれでも一時ファイルが解放される。
pub struct MultipartCleanup {
    resolver: Option<Arc<dyn MultipartResolver>>,
    request: Request,
    state: MultipartState,
}

impl MultipartCleanup {
    /// 判定と解析を行い、ガードを返す
    ///
    /// リゾルバーがなければ判定せずに `Unchecked` のまま包む。
    /// 解析に失敗した場合はエラーを返し、途中で確保した一時ファイルはその場で解放される。
    pub async fn resolve(
        resolver: Option<Arc<dyn MultipartResolver>>,
        req: Request,
    ) -> Result<Self, Error> {
        let resolver = match resolver {
            Some(resolver) => resolver,
            None => {
                return Ok(Self {
                    resolver: None,
                    request: req,
                    state: MultipartState::Unchecked,
                })
            }
        };

        if !resolver.is_multipart(&req) {
            trace!("{} {} is not a multipart request", req.method, req.path);
            return Ok(Self {
                resolver: Some(resolver),
                request: req,
                state: MultipartState::NotMultipart,
            });
        }

        debug!("Multipart request detected for {} {}", req.method, req.path);
        match resolver.resolve_multipart(req).await {
            Ok(parsed) => Ok(Self {
                resolver: Some(resolver),
                request: parsed.into_request(),
                state: MultipartState::Parsed,
            }),
            Err(e) => {
                debug!("Multipart parsing failed ({:?}): {}", MultipartState::ParseFailed, e);
                Err(e)
            }
        }
    }

    pub fn state(&self) -> MultipartState {
        self.state
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// 後始末を今すぐ行う（以後は何もしない）
    pub fn cleanup(&mut self) {
        if self.state != MultipartState::Parsed {
            return;
        }
        if let Some(resolver) = &self.resolver {
            resolver.cleanup_multipart(&mut self.request);
        }
        self.state = MultipartState::CleanedUp;
    }
}

impl Deref for MultipartCleanup {
    type Target = Request;

    fn deref(&self) -> &Request {
        &self.request
    }
}

impl DerefMut for MultipartCleanup {
    fn deref_mut(&mut self) -> &mut Request {
        &mut self.request
    }
}

impl Drop for MultipartCleanup {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Method;

    fn upload_request(body: &str) -> Request {
        Request::new(Method::POST, "/upload")
            .with_header("Content-Type", "multipart/form-data; boundary=XBOUNDARY")
            .with_body(body.as_bytes().to_vec())
    }

    fn file_body(content: &str) -> String {
        format!(
            "--XBOUNDARY\r\n\
             Content-Disposition: form-data; name=\"doc\"; filename=\"doc.txt\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             {}\r\n\
             --XBOUNDARY--\r\n",
            content
        )
    }

    fn spilling_resolver() -> Arc<dyn MultipartResolver> {
        Arc::new(StandardMultipartResolver::new(
            MultipartConfig::new().with_file_size_threshold(4),
        ))
    }

    #[tokio::test]
    async fn test_guard_without_resolver_stays_unchecked() {
        let guard = MultipartCleanup::resolve(None, upload_request(&file_body("abc")))
            .await
            .unwrap();
        assert_eq!(guard.state(), MultipartState::Unchecked);
        assert!(guard.multipart().is_none());
    }

    #[tokio::test]
    async fn test_guard_for_plain_request() {
        let req = Request::new(Method::GET, "/");
        let mut guard = MultipartCleanup::resolve(Some(spilling_resolver()), req)
            .await
            .unwrap();
        assert_eq!(guard.state(), MultipartState::NotMultipart);
        guard.cleanup();
        assert_eq!(guard.state(), MultipartState::NotMultipart);
    }

    #[tokio::test]
    async fn test_guard_releases_temp_files_on_drop() {
        let guard = MultipartCleanup::resolve(
            Some(spilling_resolver()),
            upload_request(&file_body("larger than four bytes")),
        )
        .await
        .unwrap();
        assert_eq!(guard.state(), MultipartState::Parsed);

        let parts = guard.multipart().unwrap();
        let path = parts.file("doc").unwrap().path().unwrap();
        assert!(path.exists());

        drop(guard);
        assert!(!path.exists());
        assert!(parts.is_released());
    }

    #[tokio::test]
    async fn test_explicit_cleanup_is_idempotent() {
        let resolver = spilling_resolver();
        let mut guard = MultipartCleanup::resolve(
            Some(resolver.clone()),
            upload_request(&file_body("larger than four bytes")),
        )
        .await
        .unwrap();

        guard.cleanup();
        assert_eq!(guard.state(), MultipartState::CleanedUp);
        guard.cleanup();
        resolver.cleanup_multipart(guard.request_mut());
        assert_eq!(guard.state(), MultipartState::CleanedUp);
    }

    #[tokio::test]
    async fn test_cleanup_on_never_parsed_request_is_noop() {
        let resolver = spilling_resolver();
        let mut req = upload_request(&file_body("abc"));
        resolver.cleanup_multipart(&mut req);
        assert!(req.multipart().is_none());
    }

    #[tokio::test]
    async fn test_parse_failure_surfaces_error() {
        let req = Request::new(Method::POST, "/upload")
            .with_header("Content-Type", "multipart/form-data")
            .with_body(b"garbage".to_vec());
        let result = MultipartCleanup::resolve(Some(spilling_resolver()), req).await;
        assert!(matches!(result, Err(Error::Multipart(_))));
    }
}
