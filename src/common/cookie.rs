//! Set-Cookie の組み立てと Cookie ヘッダーの分解

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use log::warn;

use crate::error::Error;
use super::utils::{is_header_value_valid, validate_cookie_pair};

/// SameSite属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// レスポンスで発行するクッキー
///
/// 名前と値は作成時に検証されるため、`Set-Cookie` にそのまま書ける。
#[derive(Debug, Clone, PartialEq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub max_age: Option<Duration>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl Cookie {
    pub fn try_new(name: impl Into<String>, value: impl Into<String>) -> Result<Self, Error> {
        let (name, value) = (name.into(), value.into());
        validate_cookie_pair(&name, &value)?;
        Ok(Self {
            name,
            value,
            path: None,
            domain: None,
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
        })
    }

    /// ブラウザ側の同名クッキーを削除させるためのクッキー
    pub fn expired(name: impl Into<String>) -> Result<Self, Error> {
        Ok(Self::try_new(name, "")?.with_max_age(Duration::ZERO))
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// `Set-Cookie` の値
    ///
    /// Path / Domain に制御文字が含まれる場合はその属性だけを落とす。
    pub fn to_header_value(&self) -> String {
        let mut attributes = vec![format!("{}={}", self.name, self.value)];

        for (label, value) in [("Path", &self.path), ("Domain", &self.domain)] {
            match value {
                Some(v) if is_header_value_valid(v) => attributes.push(format!("{}={}", label, v)),
                Some(v) => warn!("Dropping invalid {} attribute of cookie '{}': {:?}", label, self.name, v),
                None => {}
            }
        }
        if let Some(max_age) = self.max_age {
            attributes.push(format!("Max-Age={}", max_age.as_secs()));
        }
        if self.secure {
            attributes.push("Secure".to_string());
        }
        if self.http_only {
            attributes.push("HttpOnly".to_string());
        }
        if let Some(same_site) = self.same_site {
            attributes.push(format!("SameSite={}", same_site));
        }

        attributes.join("; ")
    }
}

/// `Cookie` リクエストヘッダーを名前 -> 値のマップに分解
///
/// 同名のクッキーが複数ある場合は最初のものを採用する。
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for pair in header.split(';') {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        cookies
            .entry(name.to_string())
            .or_insert_with(|| value.trim().trim_matches('"').to_string());
    }
    cookies
}
