//! multer による標準のマルチパートリゾルバー

use std::collections::HashMap;
use std::io;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream;
use log::{debug, info, trace};
use multer::{Constraints, Multipart, SizeLimit};
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::common::Request;
use crate::error::{Error, MultipartError};

use super::config::MultipartConfig;
use super::parts::{MultipartFile, MultipartParts};
use super::request::MultipartRequest;
use super::MultipartResolver;

/// `multipart/*` リクエストをボディ全体から解析するリゾルバー
///
/// ファイルパートは閾値を超えた時点で一時ファイルへ書き出す。
/// 解析に成功するとリクエストのボディは消費され、`None` になる。
#[derive(Debug, Clone, Default)]
pub struct StandardMultipartResolver {
    config: MultipartConfig,
}

impl StandardMultipartResolver {
    pub fn new(config: MultipartConfig) -> Self {
        Self { config }
    }

    /// 環境変数の設定で作成
    pub fn from_env() -> Self {
        Self::new(MultipartConfig::from_env())
    }

    pub fn config(&self) -> &MultipartConfig {
        &self.config
    }

    fn constraints(&self) -> Constraints {
        let mut limit = SizeLimit::new().whole_stream(self.config.max_upload_size());
        if let Some(per_file) = self.config.max_file_size() {
            limit = limit.per_field(per_file);
        }
        Constraints::new().size_limit(limit)
    }

    // 作成はブロッキングI/Oなので専用スレッドで行う
    async fn create_temp_file(&self) -> Result<(NamedTempFile, File), MultipartError> {
        let temp_dir = self.config.temp_dir().map(|dir| dir.to_path_buf());
        let file = tokio::task::spawn_blocking(move || {
            let mut builder = tempfile::Builder::new();
            builder.prefix("mvcbridge-upload-");
            match temp_dir {
                Some(dir) => builder.tempfile_in(dir),
                None => builder.tempfile(),
            }
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
        let writer = File::from_std(file.as_file().try_clone()?);
        Ok((file, writer))
    }

    async fn read_file_part(
        &self,
        mut field: multer::Field<'_>,
        name: String,
        original_filename: Option<String>,
        content_type: Option<String>,
    ) -> Result<MultipartFile, MultipartError> {
        let threshold = self.config.file_size_threshold();
        let mut buffer = BytesMut::new();
        let mut spilled: Option<(NamedTempFile, File)> = None;
        let mut size: u64 = 0;

        while let Some(chunk) = field.chunk().await? {
            size += chunk.len() as u64;
            match spilled.as_mut() {
                Some((_, writer)) => writer.write_all(&chunk).await?,
                None => {
                    buffer.extend_from_slice(&chunk);
                    if buffer.len() > threshold {
                        let (file, mut writer) = self.create_temp_file().await?;
                        writer.write_all(&buffer).await?;
                        trace!("Part '{}' exceeded {} bytes, spilled to {}", name, threshold, file.path().display());
                        buffer.clear();
                        spilled = Some((file, writer));
                    }
                }
            }
        }

        Ok(match spilled {
            Some((file, mut writer)) => {
                writer.flush().await?;
                MultipartFile::on_disk(name, original_filename, content_type, file, size)
            }
            None => MultipartFile::in_memory(name, original_filename, content_type, buffer.freeze()),
        })
    }

    async fn parse(&self, content_type: &str, body: Vec<u8>) -> Result<MultipartParts, MultipartError> {
        let boundary = multer::parse_boundary(content_type)?;

        let limit = self.config.max_upload_size();
        if body.len() as u64 > limit {
            return Err(MultipartError::MaxUploadSizeExceeded { limit });
        }

        let body = Bytes::from(body);
        let stream = stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
        let mut multipart = Multipart::with_constraints(stream, boundary, self.constraints());

        let mut files: HashMap<String, Vec<MultipartFile>> = HashMap::new();
        let mut fields: HashMap<String, Vec<String>> = HashMap::new();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(original_filename) => {
                    let content_type = field.content_type().map(|mime| mime.to_string());
                    let file = self
                        .read_file_part(field, name.clone(), Some(original_filename), content_type)
                        .await?;
                    files.entry(name).or_default().push(file);
                }
                None => {
                    let value = field.text().await?;
                    fields.entry(name).or_default().push(value);
                }
            }
        }

        Ok(MultipartParts::new(files, fields))
    }
}

#[async_trait]
impl MultipartResolver for StandardMultipartResolver {
    fn is_multipart(&self, req: &Request) -> bool {
        let content_type = match req.content_type() {
            Some(ct) => ct.trim_start().to_ascii_lowercase(),
            None => return false,
        };
        if self.config.is_strict() {
            content_type.starts_with("multipart/form-data")
        } else {
            content_type.starts_with("multipart/")
        }
    }

    async fn resolve_multipart(&self, mut req: Request) -> Result<MultipartRequest, Error> {
        if !self.is_multipart(&req) {
            let content_type = req.content_type().unwrap_or("none").to_string();
            return Err(MultipartError::NotMultipart(content_type).into());
        }
        let content_type = req.content_type().unwrap_or_default().to_string();
        let body = req.body.take().unwrap_or_default();
        let body_len = body.len();

        let parts = self.parse(&content_type, body).await?;
        info!(
            "Parsed multipart request {} {} ({} bytes, {} temp files)",
            req.method,
            req.path,
            body_len,
            parts.temp_file_count()
        );
        debug!(
            "Multipart fields: {:?}, files: {:?}",
            parts.parameter_names().collect::<Vec<_>>(),
            parts.file_names().collect::<Vec<_>>()
        );
        Ok(MultipartRequest::new(req, parts))
    }
}
