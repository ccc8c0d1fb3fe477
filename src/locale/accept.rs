//! Accept-Language ヘッダーによるロケール解決

use log::trace;

use crate::common::Request;

use super::{requested_locales, Locale, LocaleResolver, FALLBACK_LOCALE};

/// Accept-Language だけを見る読み取り専用のリゾルバー
///
/// 対応ロケールが設定されていれば、要求の中から完全一致を探し、
/// なければ言語だけが一致するものを使う。
#[derive(Debug, Clone, Default)]
pub struct AcceptHeaderLocaleResolver {
    supported: Vec<Locale>,
    default_locale: Option<Locale>,
}

impl AcceptHeaderLocaleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 対応ロケールを設定
    pub fn with_supported_locales(mut self, locales: impl IntoIterator<Item = Locale>) -> Self {
        self.supported = locales.into_iter().collect();
        self
    }

    /// ヘッダーがない・対応ロケールに一致しない場合のロケール
    pub fn with_default_locale(mut self, locale: Locale) -> Self {
        self.default_locale = Some(locale);
        self
    }

    pub fn supported_locales(&self) -> &[Locale] {
        &self.supported
    }

    pub fn default_locale(&self) -> Option<&Locale> {
        self.default_locale.as_ref()
    }

    fn find_supported(&self, requested: &[Locale]) -> Option<Locale> {
        let mut language_match = None;
        for candidate in requested {
            if self.supported.contains(candidate) {
                return Some(candidate.clone());
            }
            if language_match.is_none() {
                language_match = self
                    .supported
                    .iter()
                    .find(|s| s.language == candidate.language)
                    .cloned();
            }
        }
        language_match
    }
}

impl LocaleResolver for AcceptHeaderLocaleResolver {
    fn resolve_locale(&self, req: &Request) -> Locale {
        let requested = requested_locales(req);
        trace!("Requested locales: {:?}", requested);

        let first = match requested.first() {
            Some(first) => first.clone(),
            None => return self.default_locale.clone().unwrap_or(FALLBACK_LOCALE),
        };
        if self.supported.is_empty() || self.supported.contains(&first) {
            return first;
        }
        self.find_supported(&requested)
            .or_else(|| self.default_locale.clone())
            .unwrap_or(first)
    }
}
