//! ロケール解決（リクエストごとの現在のロケール）

pub mod accept;
pub mod cookie;
pub mod fixed;

use std::cmp::Ordering;
use std::sync::Arc;

use log::{debug, trace};
use unic_langid::{langid, LanguageIdentifier};

use crate::common::{Request, Response};
use crate::error::Error;

pub use self::accept::AcceptHeaderLocaleResolver;
pub use self::cookie::CookieLocaleResolver;
pub use self::fixed::FixedLocaleResolver;

/// ロケール（BCP 47 言語タグ）
pub type Locale = LanguageIdentifier;

/// 何も決まらないときのロケール
pub const FALLBACK_LOCALE: Locale = langid!("en");

/// ディスパッチャーが使用中のリゾルバーを公開する属性キー
pub const LOCALE_RESOLVER_ATTRIBUTE: &str = "mvcbridge.locale.resolver";

/// ロケールリゾルバーの特性
///
/// `resolve_locale` は必ず何らかのロケールを返す。
pub trait LocaleResolver: Send + Sync {
    /// 現在のロケールを解決
    fn resolve_locale(&self, req: &Request) -> Locale;

    /// 現在のロケールを変更（`None` は設定の解除）
    ///
    /// 変更に対応しないリゾルバーは `Error::UnsupportedOperation` を返す。
    fn set_locale(
        &self,
        _req: &mut Request,
        _res: Option<&mut Response>,
        _locale: Option<Locale>,
    ) -> Result<(), Error> {
        Err(Error::UnsupportedOperation(format!(
            "{} cannot change the locale",
            self.name()
        )))
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Accept-Language の1要素
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageRange {
    pub locale: Locale,
    pub quality: f32,
}

/// Accept-Language を品質値の降順（同値は出現順）に解析
///
/// `*`、解析できないタグ、`q=0` の要素は捨てる。
pub fn parse_accept_language(header: &str) -> Vec<LanguageRange> {
    let mut ranges: Vec<LanguageRange> = header
        .split(',')
        .filter_map(|item| {
            let mut parts = item.split(';');
            let tag = parts.next()?.trim();
            if tag.is_empty() || tag == "*" {
                return None;
            }

            let mut quality = 1.0_f32;
            for param in parts {
                if let Some((key, value)) = param.split_once('=') {
                    if key.trim() == "q" {
                        quality = value.trim().parse::<f32>().ok()?.clamp(0.0, 1.0);
                    }
                }
            }
            if quality <= 0.0 {
                return None;
            }

            match tag.parse::<Locale>() {
                Ok(locale) => Some(LanguageRange { locale, quality }),
                Err(e) => {
                    trace!("Ignoring unparsable language tag '{}': {}", tag, e);
                    None
                }
            }
        })
        .collect();

    // 安定ソートなので同じ品質値は出現順を保つ
    ranges.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap_or(Ordering::Equal));
    ranges
}

/// リクエストの Accept-Language から要求ロケールを優先順に取り出す
pub(crate) fn requested_locales(req: &Request) -> Vec<Locale> {
    req.header(http::header::ACCEPT_LANGUAGE.as_str())
        .map(parse_accept_language)
        .unwrap_or_default()
        .into_iter()
        .map(|range| range.locale)
        .collect()
}

fn resolver_of(req: &Request) -> Option<Arc<dyn LocaleResolver>> {
    req.context()
        .get::<Arc<dyn LocaleResolver>>(LOCALE_RESOLVER_ATTRIBUTE)
        .cloned()
}

/// リゾルバーをリクエストに公開
pub fn expose_resolver(req: &mut Request, resolver: Arc<dyn LocaleResolver>) {
    req.context_mut().set(LOCALE_RESOLVER_ATTRIBUTE, resolver);
}

/// リクエストの現在のロケール
///
/// リゾルバーが公開されていなければ Accept-Language だけで判断する。
pub fn current_locale(req: &Request) -> Locale {
    match resolver_of(req) {
        Some(resolver) => resolver.resolve_locale(req),
        None => AcceptHeaderLocaleResolver::new().resolve_locale(req),
    }
}

/// 公開されたリゾルバーを通じてロケールを変更
pub fn change_locale(
    req: &mut Request,
    res: Option<&mut Response>,
    locale: Option<Locale>,
) -> Result<(), Error> {
    let resolver = resolver_of(req).ok_or_else(|| {
        Error::UnsupportedOperation("no locale resolver is exposed on this request".to_string())
    })?;
    debug!("Changing locale to {:?} via {}", locale.as_ref().map(|l| l.to_string()), resolver.name());
    resolver.set_locale(req, res, locale)
}
