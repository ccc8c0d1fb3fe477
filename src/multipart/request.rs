use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::common::http::MULTIPART_PARTS_ATTRIBUTE;
use crate::common::Request;

use super::parts::{MultipartFile, MultipartParts};
use super::MultipartState;

/// マルチパート解析済みのリクエスト
///
/// 元のリクエストとして振る舞い、加えてファイルとフィールドに直接アクセスできる。
/// 解析結果はリクエストの属性にも公開されるため、`into_request` した後も
/// `Request::multipart()` から参照できる。
#[derive(Debug)]
pub struct MultipartRequest {
    request: Request,
    parts: Arc<MultipartParts>,
}

impl MultipartRequest {
    /// 解析結果をリクエストに結びつける
    pub fn new(mut request: Request, parts: MultipartParts) -> Self {
        let parts = Arc::new(parts);
        request
            .context_mut()
            .set_shared(MULTIPART_PARTS_ATTRIBUTE, parts.clone());
        Self { request, parts }
    }

    pub fn parts(&self) -> &Arc<MultipartParts> {
        &self.parts
    }

    pub fn file(&self, name: &str) -> Option<&MultipartFile> {
        self.parts.file(name)
    }

    pub fn files(&self, name: &str) -> &[MultipartFile] {
        self.parts.files(name)
    }

    /// テキストフィールドの値
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parts.parameter(name)
    }

    pub fn state(&self) -> MultipartState {
        if self.parts.is_released() {
            MultipartState::CleanedUp
        } else {
            MultipartState::Parsed
        }
    }

    /// 元のリクエストを取り出す
    pub fn into_request(self) -> Request {
        self.request
    }
}

impl Deref for MultipartRequest {
    type Target = Request;

    fn deref(&self) -> &Request {
        &self.request
    }
}

impl DerefMut for MultipartRequest {
    fn deref_mut(&mut self) -> &mut Request {
        &mut self.request
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bytes::Bytes;

    use super::*;
    use crate::common::Method;

    #[test]
    fn test_parts_are_published_on_the_request() {
        let mut files = HashMap::new();
        files.insert(
            "f".to_string(),
            vec![MultipartFile::in_memory("f".into(), None, None, Bytes::from_static(b"x"))],
        );
        let mut fields = HashMap::new();
        fields.insert("title".to_string(), vec!["hello".to_string()]);

        let mreq = MultipartRequest::new(
            Request::new(Method::POST, "/upload"),
            MultipartParts::new(files, fields),
        );
        assert_eq!(mreq.path, "/upload");
        assert_eq!(mreq.parameter("title"), Some("hello"));
        assert_eq!(mreq.state(), MultipartState::Parsed);

        let req = mreq.into_request();
        let parts = req.multipart().unwrap();
        assert_eq!(parts.file("f").unwrap().size(), 1);
        parts.release();
        assert!(req.multipart().unwrap().is_released());
    }
}
