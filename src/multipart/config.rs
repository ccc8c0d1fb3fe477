use std::env;
use std::path::{Path, PathBuf};

use crate::common::utils::{env_usize, get_max_body_size};

/// ファイルパートをメモリに保持する上限の既定値（これを超えると一時ファイルへ書き出す）
pub const DEFAULT_FILE_SIZE_THRESHOLD: usize = 10 * 1024;

/// マルチパート解析の設定
///
/// 環境変数からの読み込み:
/// - `MVCBRIDGE_MAX_BODY_SIZE`: アップロード全体の上限（既定 5MB）
/// - `MVCBRIDGE_MAX_FILE_SIZE`: パート単位の上限（既定なし）
/// - `MVCBRIDGE_FILE_SIZE_THRESHOLD`: 一時ファイルに書き出す閾値（既定 10KiB）
/// - `MVCBRIDGE_UPLOAD_TEMP_DIR`: 一時ファイルの置き場所（既定はOSの一時ディレクトリ）
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    max_upload_size: u64,
    max_file_size: Option<u64>,
    file_size_threshold: usize,
    temp_dir: Option<PathBuf>,
    strict: bool,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 5 * 1024 * 1024,
            max_file_size: None,
            file_size_threshold: DEFAULT_FILE_SIZE_THRESHOLD,
            temp_dir: None,
            strict: false,
        }
    }
}

impl MultipartConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 環境変数から設定を読む（未設定の項目は既定値）
    pub fn from_env() -> Self {
        let mut config = Self::default().with_max_upload_size(get_max_body_size() as u64);
        if let Some(limit) = env_usize("MVCBRIDGE_MAX_FILE_SIZE") {
            config = config.with_max_file_size(limit as u64);
        }
        if let Some(threshold) = env_usize("MVCBRIDGE_FILE_SIZE_THRESHOLD") {
            config = config.with_file_size_threshold(threshold);
        }
        if let Ok(dir) = env::var("MVCBRIDGE_UPLOAD_TEMP_DIR") {
            if !dir.trim().is_empty() {
                config = config.with_temp_dir(dir.trim());
            }
        }
        config
    }

    pub fn with_max_upload_size(mut self, limit: u64) -> Self {
        self.max_upload_size = limit;
        self
    }

    pub fn with_max_file_size(mut self, limit: u64) -> Self {
        self.max_file_size = Some(limit);
        self
    }

    pub fn with_file_size_threshold(mut self, threshold: usize) -> Self {
        self.file_size_threshold = threshold;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// `multipart/form-data` だけをマルチパートとみなす
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    pub fn max_file_size(&self) -> Option<u64> {
        self.max_file_size
    }

    pub fn file_size_threshold(&self) -> usize {
        self.file_size_threshold
    }

    pub fn temp_dir(&self) -> Option<&Path> {
        self.temp_dir.as_deref()
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }
}
