//! ハンドラーマッピング（リクエストからハンドラーを解決する戦略）

pub mod registry;
pub mod route;
pub mod simple;

use crate::common::{percent_decode, MatrixVariables, Request};
use crate::error::Error;
use crate::interceptor::ExecutionChain;

pub use self::registry::HandlerRegistry;
pub use self::route::RouteHandlerMapping;
pub use self::simple::SimpleUrlHandlerMapping;

/// 最も高い優先度（小さいほど先に評価される）
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// 最も低い優先度
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// マッピング戦略の特性
///
/// 解決時に書き込んでよいのはリクエストの属性バッグだけ。戦略自身は
/// 構築後に変更されず、並行リクエスト間で共有される。
pub trait HandlerMapping: Send + Sync {
    /// リクエストに対応する実行チェーンを返す（該当なしは `Ok(None)`）
    fn get_handler(&self, req: &mut Request) -> Result<Option<ExecutionChain>, Error>;

    /// 登録時の優先度（`None` は最後尾）
    fn order(&self) -> Option<i32> {
        None
    }

    /// 事前解析済みのパスパターンで照合するか
    fn uses_path_patterns(&self) -> bool {
        false
    }

    /// ログ用の名前
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// マトリクス変数を取り除いたパスと、セグメントごとのマトリクス変数
///
/// `/cars;color=red,blue;year=2012/list` は `/cars/list` になり、
/// `cars` に `color=[red, blue]`, `year=[2012]` が紐づく。
pub(crate) fn split_matrix_variables(path: &str) -> (String, MatrixVariables) {
    let mut lookup = String::with_capacity(path.len());
    let mut matrix = MatrixVariables::new();

    for (i, segment) in path.split('/').enumerate() {
        if i > 0 {
            lookup.push('/');
        }
        let mut parts = segment.split(';');
        let name = parts.next().unwrap_or("");
        lookup.push_str(name);

        for pair in parts.filter(|p| !p.is_empty()) {
            let (key, values) = match pair.split_once('=') {
                Some((k, v)) => (k, v),
                None => (pair, ""),
            };
            let entry = matrix
                .entry(name.to_string())
                .or_default()
                .entry(percent_decode(key))
                .or_default();
            entry.extend(
                values
                    .split(',')
                    .filter(|v| !v.is_empty())
                    .map(percent_decode),
            );
        }
    }

    (lookup, matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_matrix_variables() {
        let (path, matrix) = split_matrix_variables("/cars;color=red,blue;year=2012/list");
        assert_eq!(path, "/cars/list");
        let cars = matrix.get("cars").unwrap();
        assert_eq!(cars.get("color"), Some(&vec!["red".to_string(), "blue".to_string()]));
        assert_eq!(cars.get("year"), Some(&vec!["2012".to_string()]));
    }

    #[test]
    fn test_split_without_matrix_variables() {
        let (path, matrix) = split_matrix_variables("/items/1");
        assert_eq!(path, "/items/1");
        assert!(matrix.is_empty());
    }

    #[test]
    fn test_split_flag_without_value() {
        let (path, matrix) = split_matrix_variables("/items;archived");
        assert_eq!(path, "/items");
        assert_eq!(matrix["items"].get("archived"), Some(&Vec::new()));
    }
}
