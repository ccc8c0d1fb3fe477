//! 関数ルートのマッピング（メソッド + 正規表現パス）

use std::sync::Arc;

use log::{debug, info};

use crate::common::{Attribute, MatrixVariables, Request};
use crate::error::Error;
use crate::handler::{Handler, Route};
use crate::interceptor::{ExecutionChain, HandlerInterceptor, MappedInterceptor};

use super::{split_matrix_variables, HandlerMapping};

/// `Route` をパスの具体性順に照合するマッピング
///
/// ルートはパス区切り `/` の多い順に並べ替えられ（同数は登録順）、
/// メソッドとパターンの両方が一致した最初のルートが選ばれる。
#[derive(Default)]
pub struct RouteHandlerMapping {
    routes: Vec<Arc<dyn Route>>,
    interceptors: Vec<Arc<dyn HandlerInterceptor>>,
    mapped_interceptors: Vec<MappedInterceptor>,
    order: Option<i32>,
}

impl RouteHandlerMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// ルートを追加
    pub fn route<R: Route + 'static>(mut self, route: R) -> Self {
        self.add_route(Arc::new(route));
        self
    }

    /// 共有済みのルートを追加
    pub fn add_route(&mut self, route: Arc<dyn Route>) {
        info!("Mapping route {} {}", route.method(), route.pattern());
        self.routes.push(route);
        // 安定ソートで `/` の数の降順（多い方が先）
        self.routes
            .sort_by(|a, b| b.pattern().specificity().cmp(&a.pattern().specificity()));
    }

    /// 全リクエストに適用するインターセプターを追加
    pub fn interceptor<I: HandlerInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// パス条件付きのインターセプターを追加
    pub fn mapped_interceptor(mut self, interceptor: MappedInterceptor) -> Self {
        self.mapped_interceptors.push(interceptor);
        self
    }

    /// 登録時の優先度を設定
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn routes(&self) -> &[Arc<dyn Route>] {
        &self.routes
    }

    fn build_chain(&self, handler: Handler, lookup_path: &str) -> ExecutionChain {
        let mut chain = ExecutionChain::with_interceptors(handler, self.interceptors.clone());
        for mapped in &self.mapped_interceptors {
            if mapped.matches(lookup_path) {
                chain.add_interceptor(mapped.interceptor().clone());
            }
        }
        chain
    }
}

impl HandlerMapping for RouteHandlerMapping {
    fn get_handler(&self, req: &mut Request) -> Result<Option<ExecutionChain>, Error> {
        let (lookup_path, matrix_variables) = split_matrix_variables(&req.path);

        let mut matched = None;
        for route in &self.routes {
            if route.method() != req.method {
                continue;
            }
            if let Some(vars) = route.pattern().captures(&lookup_path) {
                matched = Some((route.clone(), vars));
                break;
            }
        }

        let (route, uri_variables) = match matched {
            Some(found) => found,
            None => return Ok(None),
        };
        debug!("Route {} {} matched {}", route.method(), route.pattern(), lookup_path);

        let handler = Handler::Route(route.clone());

        // マトリクス変数は、それが付いていたセグメントの値を持つURI変数名で引けるようにする
        let mut matrix_by_variable = MatrixVariables::new();
        for (name, value) in &uri_variables {
            if let Some(vars) = matrix_variables.get(value) {
                matrix_by_variable.insert(name.clone(), vars.clone());
            }
        }
        for (segment, vars) in matrix_variables {
            matrix_by_variable.entry(segment).or_insert(vars);
        }

        let context = req.context_mut();
        context.set_attribute(Attribute::BestMatchingHandler, handler.clone());
        context.set_attribute(Attribute::BestMatchingPattern, route.pattern().as_str().to_string());
        context.set_attribute(Attribute::PathWithinHandlerMapping, lookup_path.clone());
        context.set_attribute(Attribute::UriTemplateVariables, uri_variables);
        context.set_attribute(Attribute::MatrixVariables, matrix_by_variable);
        if route.produces().is_empty() {
            context.clear_attribute(Attribute::ProducibleMediaTypes);
        } else {
            context.set_attribute(Attribute::ProducibleMediaTypes, route.produces().to_vec());
        }

        Ok(Some(self.build_chain(handler, &lookup_path)))
    }

    fn order(&self) -> Option<i32> {
        self.order
    }

    fn uses_path_patterns(&self) -> bool {
        true
    }
}
