use crate::common::Request;

use super::{Locale, LocaleResolver};

/// 常に同じロケールを返す読み取り専用のリゾルバー
#[derive(Debug, Clone)]
pub struct FixedLocaleResolver {
    locale: Locale,
}

impl FixedLocaleResolver {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }
}

impl LocaleResolver for FixedLocaleResolver {
    fn resolve_locale(&self, _req: &Request) -> Locale {
        self.locale.clone()
    }
}

#[cfg(test)]
mod tests {
    use unic_langid::langid;

    use super::*;
    use crate::common::Method;
    use crate::error::Error;

    #[test]
    fn test_fixed_locale_ignores_request_and_rejects_changes() {
        let resolver = FixedLocaleResolver::new(langid!("pt-BR"));
        let mut req = Request::new(Method::GET, "/").with_header("Accept-Language", "en");

        assert_eq!(resolver.resolve_locale(&req), langid!("pt-BR"));
        assert_eq!(resolver.resolve_locale(&req), resolver.resolve_locale(&req));
        let result = resolver.set_locale(&mut req, None, None);
        assert!(matches!(result, Err(Error::UnsupportedOperation(_))));
    }
}
