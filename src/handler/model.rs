//! ハンドラーの戻り値（ビュー名 + モデル）

use serde::Serialize;
use serde_json::{Map, Value};

use crate::common::Response;
use crate::error::Error;

/// ハンドラーが返すビュー名とモデル
///
/// `None` を返すアダプターは「レスポンスは書き込み済み」を意味し、
/// こちらは「描画すべきビューがある」を意味する。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelAndView {
    #[serde(rename = "view", skip_serializing_if = "Option::is_none")]
    view_name: Option<String>,
    model: Map<String, Value>,
    #[serde(skip)]
    status: Option<u16>,
}

impl ModelAndView {
    /// ビュー名を指定して作成
    pub fn new(view_name: impl Into<String>) -> Self {
        Self {
            view_name: Some(view_name.into()),
            ..Self::default()
        }
    }

    /// ビュー名なし（既定のビュー名に委ねる）で作成
    pub fn empty() -> Self {
        Self::default()
    }

    /// モデルに値を追加
    pub fn add_object<T: Serialize>(&mut self, name: impl Into<String>, value: &T) -> Result<(), Error> {
        let value = serde_json::to_value(value)
            .map_err(|e| Error::ResponseSerializationError(e.to_string()))?;
        self.model.insert(name.into(), value);
        Ok(())
    }

    /// モデルに値を追加（ビルダー形式）
    pub fn with_object<T: Serialize>(mut self, name: impl Into<String>, value: &T) -> Result<Self, Error> {
        self.add_object(name, value)?;
        Ok(self)
    }

    /// レスポンスステータスを指定
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn view_name(&self) -> Option<&str> {
        self.view_name.as_deref()
    }

    pub fn set_view_name(&mut self, view_name: impl Into<String>) {
        self.view_name = Some(view_name.into());
    }

    /// ビュー名が設定されているか
    pub fn has_view(&self) -> bool {
        self.view_name.is_some()
    }

    pub fn model(&self) -> &Map<String, Value> {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.model
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// テンプレートエンジンを持たない呼び出し側向けに、ビュー名とモデルをJSONで返す
    pub fn to_json_response(&self) -> Result<Response, Error> {
        Response::new(self.status.unwrap_or(200))
            .with_header("X-View-Name", self.view_name.clone().unwrap_or_default())
            .json(self)
    }
}
