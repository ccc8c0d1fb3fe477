//! クッキーに保存したロケールによる解決

use std::time::Duration;

use log::{debug, warn};

use crate::common::{Cookie, Request, Response, SameSite};
use crate::error::Error;

use super::{AcceptHeaderLocaleResolver, Locale, LocaleResolver};

/// 既定のクッキー名
pub const DEFAULT_COOKIE_NAME: &str = "LOCALE";

/// 同じリクエスト内で変更されたロケールを保持する属性キー
const LOCALE_OVERRIDE_ATTRIBUTE: &str = "mvcbridge.locale.cookie.override";

// `None` は同じリクエスト内で設定が解除されたことを表す
#[derive(Clone)]
struct LocaleOverride(Option<Locale>);

/// クッキーでロケールを保持するリゾルバー
///
/// 解決順: このリクエスト内で設定されたロケール、クッキー、既定ロケール、Accept-Language。
#[derive(Debug, Clone)]
pub struct CookieLocaleResolver {
    cookie_name: String,
    cookie_path: String,
    cookie_domain: Option<String>,
    cookie_max_age: Option<Duration>,
    cookie_secure: bool,
    cookie_http_only: bool,
    default_locale: Option<Locale>,
    accept_header: AcceptHeaderLocaleResolver,
}

impl Default for CookieLocaleResolver {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_path: "/".to_string(),
            cookie_domain: None,
            cookie_max_age: None,
            cookie_secure: false,
            cookie_http_only: false,
            default_locale: None,
            accept_header: AcceptHeaderLocaleResolver::new(),
        }
    }
}

impl CookieLocaleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    /// クッキーの有効期間（未設定ならセッションクッキー）
    pub fn with_cookie_max_age(mut self, max_age: Duration) -> Self {
        self.cookie_max_age = Some(max_age);
        self
    }

    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    pub fn with_cookie_http_only(mut self, http_only: bool) -> Self {
        self.cookie_http_only = http_only;
        self
    }

    pub fn with_default_locale(mut self, locale: Locale) -> Self {
        self.default_locale = Some(locale);
        self
    }

    /// クッキーも既定ロケールもない場合に使う Accept-Language 側の設定
    pub fn with_accept_header_resolver(mut self, resolver: AcceptHeaderLocaleResolver) -> Self {
        self.accept_header = resolver;
        self
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    fn cookie_locale(&self, req: &Request) -> Option<Locale> {
        let raw = req.cookie(&self.cookie_name)?;
        match raw.parse::<Locale>() {
            Ok(locale) => Some(locale),
            Err(e) => {
                warn!("Ignoring invalid locale cookie '{}' ({}): {}", self.cookie_name, raw, e);
                None
            }
        }
    }

    fn scoped(&self, mut cookie: Cookie) -> Cookie {
        cookie = cookie.with_path(self.cookie_path.clone());
        if let Some(domain) = &self.cookie_domain {
            cookie = cookie.with_domain(domain.clone());
        }
        cookie
    }

    fn build_cookie(&self, locale: &Locale) -> Result<Cookie, Error> {
        let mut cookie = self
            .scoped(Cookie::try_new(self.cookie_name.clone(), locale.to_string())?)
            .secure(self.cookie_secure)
            .http_only(self.cookie_http_only)
            .with_same_site(SameSite::Lax);
        if let Some(max_age) = self.cookie_max_age {
            cookie = cookie.with_max_age(max_age);
        }
        Ok(cookie)
    }
}

impl LocaleResolver for CookieLocaleResolver {
    fn resolve_locale(&self, req: &Request) -> Locale {
        if let Some(LocaleOverride(locale)) = req.context().get::<LocaleOverride>(LOCALE_OVERRIDE_ATTRIBUTE) {
            if let Some(locale) = locale {
                return locale.clone();
            }
        } else if let Some(locale) = self.cookie_locale(req) {
            return locale;
        }

        match &self.default_locale {
            Some(locale) => locale.clone(),
            None => self.accept_header.resolve_locale(req),
        }
    }

    fn set_locale(
        &self,
        req: &mut Request,
        res: Option<&mut Response>,
        locale: Option<Locale>,
    ) -> Result<(), Error> {
        let cookie = match &locale {
            Some(locale) => self.build_cookie(locale)?,
            None => self.scoped(Cookie::expired(self.cookie_name.clone())?),
        };
        match res {
            Some(res) => res.add_cookie(cookie),
            None => debug!("No response available, locale cookie '{}' not written", self.cookie_name),
        }
        req.context_mut()
            .set(LOCALE_OVERRIDE_ATTRIBUTE, LocaleOverride(locale));
        Ok(())
    }
}
