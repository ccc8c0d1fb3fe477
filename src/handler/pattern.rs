//! パスパターン（アンカー付き正規表現）

use std::collections::HashMap;
use std::fmt;

#[cfg(debug_assertions)]
use log::warn;
#[cfg(debug_assertions)]
use std::time::{Duration, Instant};

use log::debug;
use regex::Regex;

use crate::error::Error;

// 先頭の `^` と末尾の `$` を一つずつ外す（`\$` はリテラルなので残す）
fn strip_anchors(pattern: &str) -> &str {
    let inner = pattern.strip_prefix('^').unwrap_or(pattern);
    match inner.strip_suffix('$') {
        Some(rest) if rest.chars().rev().take_while(|&c| c == '\\').count() % 2 == 0 => rest,
        _ => inner,
    }
}

/// パターンの安全性を確保（アンカーの確認と追加）
///
/// 表示用の `^...$` 形式を返す。実際の照合には選択 `|` 全体を
/// 非捕獲グループで囲んだ `^(?:...)$` を使う。
pub fn ensure_safe_pattern(pattern: &str) -> Result<String, Error> {
    let inner = strip_anchors(pattern);
    if inner.is_empty() {
        return Err(Error::InvalidPattern("Empty regex pattern is not allowed".to_string()));
    }

    let safe_pattern = format!("^{}$", inner);
    if safe_pattern != pattern {
        debug!(
            "Pattern '{}' lacks proper anchors, converted to '{}'",
            pattern, safe_pattern
        );
    }
    Ok(safe_pattern)
}

/// 登録時に一度だけコンパイルされるパスパターン
#[derive(Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathPattern").field(&self.source).finish()
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PathPattern {
    /// パターンをアンカー付きにしてコンパイル
    pub fn new(pattern: &str) -> Result<Self, Error> {
        let source = ensure_safe_pattern(pattern)?;
        let regex = Regex::new(&format!("^(?:{})$", strip_anchors(&source)))
            .map_err(|e| Error::InvalidPattern(format!("{}: {}", source, e)))?;
        Ok(Self { source, regex })
    }

    /// アンカー付きのパターン文字列
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// パスがパターンに一致するか
    pub fn matches(&self, path: &str) -> bool {
        // デバッグビルド時のみ遅いマッチを監視
        #[cfg(debug_assertions)]
        {
            let start_time = Instant::now();
            let is_match = self.regex.is_match(path);
            let elapsed = start_time.elapsed();
            if elapsed > Duration::from_millis(100) {
                warn!(
                    "Slow regex matching detected: pattern '{}' took {:?} for path '{}'",
                    self.source, elapsed, path
                );
            }
            is_match
        }
        #[cfg(not(debug_assertions))]
        {
            self.regex.is_match(path)
        }
    }

    /// 一致した場合、名前付きキャプチャをURIテンプレート変数として返す
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let caps = self.regex.captures(path)?;
        let vars = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();
        Some(vars)
    }

    /// 具体性（パス区切りの数）。多いほど先に評価される
    pub fn specificity(&self) -> usize {
        self.source.matches('/').count()
    }
}
