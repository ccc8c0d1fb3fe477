//! 共通の抽象化レイヤー（リクエスト・レスポンス・属性・クッキー・ユーティリティ）

pub mod context;
pub mod cookie;
pub mod http;
pub mod utils;

pub use self::context::{Attribute, MatrixVariables, RequestContext};
pub use self::cookie::{parse_cookie_header, Cookie, SameSite};
pub use self::http::{Method, Request, Response};
pub use self::utils::{get_max_body_size, parse_query_string, percent_decode};
