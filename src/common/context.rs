//! リクエストコンテキスト（リクエスト単位の属性バッグ）の実装

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// ハンドラーマッピングが公開する既知の属性キー
///
/// どの属性も任意。マッピング戦略ごとに、まったく設定しないもの、
/// 一部だけ設定するもの、すべて設定するものがある。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// 最も一致したハンドラー（`Handler`）
    BestMatchingHandler,
    /// マッピング内のパス（`String`）
    PathWithinHandlerMapping,
    /// 最も一致したパターン（`String`）
    BestMatchingPattern,
    /// 型レベルのマッピングを検査すべきか（`bool`）
    IntrospectTypeLevelMapping,
    /// URIテンプレート変数（`HashMap<String, String>`）
    UriTemplateVariables,
    /// マトリクス変数（`MatrixVariables`）
    MatrixVariables,
    /// 生成可能なメディアタイプ（`Vec<String>`）
    ProducibleMediaTypes,
}

impl Attribute {
    /// すべての既知キー
    pub const ALL: [Attribute; 7] = [
        Attribute::BestMatchingHandler,
        Attribute::PathWithinHandlerMapping,
        Attribute::BestMatchingPattern,
        Attribute::IntrospectTypeLevelMapping,
        Attribute::UriTemplateVariables,
        Attribute::MatrixVariables,
        Attribute::ProducibleMediaTypes,
    ];

    /// 属性バッグ上の文字列キー
    pub fn key(&self) -> &'static str {
        match self {
            Attribute::BestMatchingHandler => "mvcbridge.handler.bestMatchingHandler",
            Attribute::PathWithinHandlerMapping => "mvcbridge.handler.pathWithinHandlerMapping",
            Attribute::BestMatchingPattern => "mvcbridge.handler.bestMatchingPattern",
            Attribute::IntrospectTypeLevelMapping => "mvcbridge.handler.introspectTypeLevelMapping",
            Attribute::UriTemplateVariables => "mvcbridge.handler.uriTemplateVariables",
            Attribute::MatrixVariables => "mvcbridge.handler.matrixVariables",
            Attribute::ProducibleMediaTypes => "mvcbridge.handler.producibleMediaTypes",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// パス変数名 -> (マトリクス変数名 -> 値リスト)
pub type MatrixVariables = HashMap<String, HashMap<String, Vec<String>>>;

/// リクエストコンテキスト（マッピング・インターセプター・ハンドラー間でのデータ共有）
///
/// 値は `Arc` で保持するため、`Request` を複製しても属性は失われない。
#[derive(Default, Clone)]
pub struct RequestContext {
    metadata: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.metadata.keys().collect();
        keys.sort();
        f.debug_struct("RequestContext").field("keys", &keys).finish()
    }
}

impl RequestContext {
    /// 新しいRequestContextを作成
    pub fn new() -> Self {
        Self {
            metadata: HashMap::new(),
        }
    }

    /// 値を設定
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.metadata.insert(key.to_string(), Arc::new(value));
    }

    /// 共有済みの値をそのまま設定
    pub fn set_shared<T: Send + Sync + 'static>(&mut self, key: &str, value: Arc<T>) {
        self.metadata.insert(key.to_string(), value);
    }

    /// 値を取得
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.metadata
            .get(key)
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// 値を `Arc` のまま取得
    pub fn get_shared<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.metadata
            .get(key)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// 値を削除して返却（型が一致しない場合は削除しない）
    pub fn remove<T: Clone + Send + Sync + 'static>(&mut self, key: &str) -> Option<T> {
        let matches = self
            .metadata
            .get(key)
            .map(|value| value.is::<T>())
            .unwrap_or(false);
        if !matches {
            return None;
        }
        self.metadata
            .remove(key)
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| Arc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// 既知属性を設定
    pub fn set_attribute<T: Send + Sync + 'static>(&mut self, attribute: Attribute, value: T) {
        self.set(attribute.key(), value);
    }

    /// 既知属性を取得
    pub fn attribute<T: 'static>(&self, attribute: Attribute) -> Option<&T> {
        self.get(attribute.key())
    }

    /// 既知属性を削除
    pub fn clear_attribute(&mut self, attribute: Attribute) {
        self.metadata.remove(attribute.key());
    }

    /// 指定されたキーが存在するかチェック
    pub fn contains_key(&self, key: &str) -> bool {
        self.metadata.contains_key(key)
    }

    /// 全てのキーを取得
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.metadata.keys()
    }

    /// コンテキストが空かどうか
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }
}
