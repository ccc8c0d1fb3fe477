//! 解析済みのマルチパート内容（ファイルとテキストフィールド）

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use log::{debug, warn};
use tempfile::NamedTempFile;

use crate::error::MultipartError;

enum Storage {
    Memory(Bytes),
    // 解放済みなら `None`
    TempFile(Mutex<Option<NamedTempFile>>),
}

/// アップロードされた1つのファイルパート
///
/// 閾値以下はメモリ、それを超えるものは一時ファイルに保持される。
/// 一時ファイルはクリーンアップ時、または値の破棄時に削除される。
pub struct MultipartFile {
    name: String,
    original_filename: Option<String>,
    content_type: Option<String>,
    size: u64,
    storage: Storage,
}

impl fmt::Debug for MultipartFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartFile")
            .field("name", &self.name)
            .field("original_filename", &self.original_filename)
            .field("content_type", &self.content_type)
            .field("size", &self.size)
            .field("in_memory", &self.is_in_memory())
            .finish()
    }
}

fn released_error(name: &str) -> MultipartError {
    MultipartError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("temporary storage of part '{}' has already been released", name),
    ))
}

impl MultipartFile {
    pub(crate) fn in_memory(
        name: String,
        original_filename: Option<String>,
        content_type: Option<String>,
        data: Bytes,
    ) -> Self {
        Self {
            name,
            original_filename,
            content_type,
            size: data.len() as u64,
            storage: Storage::Memory(data),
        }
    }

    pub(crate) fn on_disk(
        name: String,
        original_filename: Option<String>,
        content_type: Option<String>,
        file: NamedTempFile,
        size: u64,
    ) -> Self {
        Self {
            name,
            original_filename,
            content_type,
            size,
            storage: Storage::TempFile(Mutex::new(Some(file))),
        }
    }

    /// フォーム上のパート名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// クライアントが送ったファイル名
    pub fn original_filename(&self) -> Option<&str> {
        self.original_filename.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// バイト数
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(self.storage, Storage::Memory(_))
    }

    fn temp_file(&self) -> Option<MutexGuard<'_, Option<NamedTempFile>>> {
        match &self.storage {
            Storage::TempFile(file) => Some(file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())),
            Storage::Memory(_) => None,
        }
    }

    /// 一時ファイルのパス（メモリ保持、または解放済みなら `None`）
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_file()?.as_ref().map(|file| file.path().to_path_buf())
    }

    /// 内容を読み出す
    pub async fn bytes(&self) -> Result<Bytes, MultipartError> {
        match &self.storage {
            Storage::Memory(data) => Ok(data.clone()),
            Storage::TempFile(_) => {
                let path = self.path().ok_or_else(|| released_error(&self.name))?;
                Ok(Bytes::from(tokio::fs::read(path).await?))
            }
        }
    }

    /// 内容を指定パスに書き出す
    pub async fn transfer_to(&self, dest: impl AsRef<Path>) -> Result<(), MultipartError> {
        let dest = dest.as_ref();
        match &self.storage {
            Storage::Memory(data) => tokio::fs::write(dest, data).await?,
            Storage::TempFile(_) => {
                let path = self.path().ok_or_else(|| released_error(&self.name))?;
                tokio::fs::copy(path, dest).await?;
            }
        }
        debug!("Transferred part '{}' to {}", self.name, dest.display());
        Ok(())
    }

    /// 一時ファイルを削除する（何度呼んでもよい）
    pub(crate) fn release(&self) {
        let file = match self.temp_file() {
            Some(mut guard) => guard.take(),
            None => None,
        };
        if let Some(file) = file {
            let path = file.path().to_path_buf();
            if let Err(e) = file.close() {
                warn!("Failed to delete temporary upload file {}: {}", path.display(), e);
            }
        }
    }
}

/// リクエスト1件分の解析結果
#[derive(Debug, Default)]
pub struct MultipartParts {
    files: HashMap<String, Vec<MultipartFile>>,
    fields: HashMap<String, Vec<String>>,
    released: AtomicBool,
}

impl MultipartParts {
    pub(crate) fn new(
        files: HashMap<String, Vec<MultipartFile>>,
        fields: HashMap<String, Vec<String>>,
    ) -> Self {
        Self {
            files,
            fields,
            released: AtomicBool::new(false),
        }
    }

    /// 名前に対応する最初のファイル
    pub fn file(&self, name: &str) -> Option<&MultipartFile> {
        self.files.get(name).and_then(|files| files.first())
    }

    /// 名前に対応するすべてのファイル
    pub fn files(&self, name: &str) -> &[MultipartFile] {
        self.files.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn file_names(&self) -> impl Iterator<Item = &String> {
        self.files.keys()
    }

    /// 名前に対応する最初のテキスト値
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn parameter_values(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// 一時ファイルに保持されているパートの数
    pub fn temp_file_count(&self) -> usize {
        self.files
            .values()
            .flatten()
            .filter(|file| file.path().is_some())
            .count()
    }

    /// 一時ストレージを解放する。最初の呼び出しだけが `true` を返す
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        for file in self.files.values().flatten() {
            file.release();
        }
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}
