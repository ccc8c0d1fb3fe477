//! 優先度付きのマッピング戦略レジストリ

use std::sync::Arc;

use log::{debug, trace};

use crate::common::Request;
use crate::error::Error;
use crate::interceptor::ExecutionChain;

use super::HandlerMapping;

struct RegisteredMapping {
    priority: Option<i32>,
    mapping: Arc<dyn HandlerMapping>,
}

/// 登録されたマッピング戦略を優先度順に問い合わせるレジストリ
///
/// 優先度の小さいものから評価し、優先度なしは最後尾。同じ優先度は登録順。
/// 最初に結果を返した戦略が勝ち、以降の戦略には問い合わせない。
#[derive(Default)]
pub struct HandlerRegistry {
    mappings: Vec<RegisteredMapping>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 戦略自身の `order()` を優先度として登録
    pub fn register<M: HandlerMapping + 'static>(&mut self, mapping: M) {
        self.register_arc(Arc::new(mapping));
    }

    /// 共有済みの戦略を登録
    pub fn register_arc(&mut self, mapping: Arc<dyn HandlerMapping>) {
        let priority = mapping.order();
        self.insert(priority, mapping);
    }

    /// 優先度を明示して登録
    pub fn register_with_priority<M: HandlerMapping + 'static>(&mut self, mapping: M, priority: i32) {
        self.insert(Some(priority), Arc::new(mapping));
    }

    fn insert(&mut self, priority: Option<i32>, mapping: Arc<dyn HandlerMapping>) {
        debug!("Registering handler mapping {} (priority: {:?})", mapping.name(), priority);
        self.mappings.push(RegisteredMapping { priority, mapping });
        // 安定ソートなので同じ優先度は登録順のまま
        self.mappings.sort_by_key(|m| match m.priority {
            Some(p) => (0, p),
            None => (1, 0),
        });
    }

    /// 評価順の戦略一覧
    pub fn mappings(&self) -> impl Iterator<Item = &Arc<dyn HandlerMapping>> {
        self.mappings.iter().map(|m| &m.mapping)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// 優先度順に問い合わせ、最初に得られた実行チェーンを返す
    ///
    /// 戦略がエラーを返した場合は後続を評価せずにそのまま伝播する。
    pub fn resolve(&self, req: &mut Request) -> Result<Option<ExecutionChain>, Error> {
        for registered in &self.mappings {
            trace!("Consulting handler mapping {}", registered.mapping.name());
            if let Some(chain) = registered.mapping.get_handler(req)? {
                debug!(
                    "{} {} resolved by {} to {}",
                    req.method,
                    req.path,
                    registered.mapping.name(),
                    chain.handler().description()
                );
                return Ok(Some(chain));
            }
        }
        debug!("No handler mapping matched {} {}", req.method, req.path);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use mockall::mock;

    use super::*;
    use crate::common::Method;
    use crate::handler::Handler;

    mock! {
        pub Mapping {}

        impl HandlerMapping for Mapping {
            fn get_handler(&self, req: &mut Request) -> Result<Option<ExecutionChain>, Error>;
            fn order(&self) -> Option<i32>;
        }
    }

    fn matching(name: &'static str, order: Option<i32>) -> MockMapping {
        let mut mock = MockMapping::new();
        mock.expect_order().return_const(order);
        mock.expect_get_handler()
            .returning(move |_| Ok(Some(ExecutionChain::new(Handler::custom(name, ())))));
        mock
    }

    fn never_called(order: Option<i32>) -> MockMapping {
        let mut mock = MockMapping::new();
        mock.expect_order().return_const(order);
        mock.expect_get_handler().times(0);
        mock
    }

    fn resolved_name(registry: &HandlerRegistry) -> Option<String> {
        let mut req = Request::new(Method::GET, "/x");
        registry
            .resolve(&mut req)
            .unwrap()
            .map(|chain| chain.handler().description())
    }

    #[test]
    fn test_lower_priority_value_wins() {
        let mut registry = HandlerRegistry::new();
        // 登録順とは逆の優先度
        registry.register(never_called(Some(10)));
        registry.register(matching("A", Some(1)));

        assert_eq!(resolved_name(&registry), Some("custom handler A".to_string()));
    }

    #[test]
    fn test_falls_through_to_next_strategy() {
        let mut miss = MockMapping::new();
        miss.expect_order().return_const(Some(1));
        miss.expect_get_handler().times(1).returning(|_| Ok(None));

        let mut registry = HandlerRegistry::new();
        registry.register(miss);
        registry.register(matching("B", Some(10)));

        assert_eq!(resolved_name(&registry), Some("custom handler B".to_string()));
    }

    #[test]
    fn test_equal_priority_keeps_registration_order() {
        let mut registry = HandlerRegistry::new();
        registry.register(matching("first", Some(5)));
        registry.register(never_called(Some(5)));

        assert_eq!(resolved_name(&registry), Some("custom handler first".to_string()));
    }

    #[test]
    fn test_unprioritized_strategies_are_consulted_last() {
        let mut registry = HandlerRegistry::new();
        registry.register(never_called(None));
        registry.register(matching("late", Some(i32::MAX)));

        assert_eq!(resolved_name(&registry), Some("custom handler late".to_string()));
    }

    #[test]
    fn test_unprioritized_strategies_keep_registration_order() {
        let mut miss = MockMapping::new();
        miss.expect_order().return_const(Some(i32::MAX));
        miss.expect_get_handler().times(1).returning(|_| Ok(None));

        let mut registry = HandlerRegistry::new();
        registry.register(matching("first unordered", None));
        registry.register(never_called(None));
        registry.register(miss);

        assert_eq!(resolved_name(&registry), Some("custom handler first unordered".to_string()));
    }

    #[test]
    fn test_explicit_priority_overrides_order() {
        let mut registry = HandlerRegistry::new();
        registry.register(never_called(Some(1)));
        registry.register_with_priority(matching("explicit", None), 0);

        assert_eq!(resolved_name(&registry), Some("custom handler explicit".to_string()));
    }

    #[test]
    fn test_strategy_error_aborts_resolution() {
        let mut failing = MockMapping::new();
        failing.expect_order().return_const(Some(1));
        failing
            .expect_get_handler()
            .returning(|_| Err(Error::Dispatch("lookup failed".to_string())));

        let mut registry = HandlerRegistry::new();
        registry.register(failing);
        registry.register(never_called(Some(2)));

        let mut req = Request::new(Method::GET, "/x");
        assert!(matches!(registry.resolve(&mut req), Err(Error::Dispatch(_))));
    }

    #[test]
    fn test_empty_registry_resolves_nothing() {
        let registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(resolved_name(&registry), None);
    }
}
