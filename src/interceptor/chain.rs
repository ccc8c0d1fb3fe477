//! 実行チェーン（1つのハンドラーと順序付きインターセプター）

use std::fmt;
use std::sync::Arc;

use log::{debug, error, trace};

use crate::common::{Request, Response};
use crate::error::Error;
use crate::handler::{Handler, ModelAndView};

use super::HandlerInterceptor;

/// リクエストごとに生成される実行チェーン
///
/// pre_handle は登録順、post_handle と after_completion は逆順で呼ばれる。
/// after_completion の対象は pre_handle に入ったインターセプターだけ。
pub struct ExecutionChain {
    handler: Handler,
    interceptors: Vec<Arc<dyn HandlerInterceptor>>,
    // pre_handle に入ったインターセプターの数（高水位）
    entered: usize,
    completed: bool,
}

impl fmt::Debug for ExecutionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionChain")
            .field("handler", &self.handler)
            .field("interceptors", &self.interceptors.len())
            .field("entered", &self.entered)
            .finish()
    }
}

impl ExecutionChain {
    pub fn new(handler: Handler) -> Self {
        Self::with_interceptors(handler, Vec::new())
    }

    pub fn with_interceptors(handler: Handler, interceptors: Vec<Arc<dyn HandlerInterceptor>>) -> Self {
        Self {
            handler,
            interceptors,
            entered: 0,
            completed: false,
        }
    }

    /// インターセプターを末尾に追加
    pub fn add_interceptor(&mut self, interceptor: Arc<dyn HandlerInterceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn interceptors(&self) -> &[Arc<dyn HandlerInterceptor>] {
        &self.interceptors
    }

    /// pre_handle に入ったインターセプターの数
    pub fn entered_count(&self) -> usize {
        self.entered
    }

    /// 登録順に pre_handle を呼ぶ
    ///
    /// いずれかが `false` を返したら、その場で入った分の after_completion を逆順に呼び
    /// `Ok(false)` を返す。エラーの場合は after_completion を呼ばずにエラーを返すので、
    /// 呼び出し側がエラー付きで `trigger_after_completion` を呼ぶこと。
    pub async fn apply_pre_handle(&mut self, req: &mut Request, res: &mut Response) -> Result<bool, Error> {
        let interceptors = self.interceptors.clone();
        for interceptor in interceptors.iter() {
            self.entered += 1;
            trace!("pre_handle: {}", interceptor.name());
            if !interceptor.pre_handle(req, res, &self.handler).await? {
                debug!(
                    "Interceptor {} short-circuited {} {}",
                    interceptor.name(),
                    req.method,
                    req.path
                );
                self.trigger_after_completion(req, res, None).await?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 逆順に post_handle を呼ぶ（pre_handle がすべて通った場合のみ呼ぶこと）
    pub async fn apply_post_handle(
        &self,
        req: &mut Request,
        res: &mut Response,
        mut model_and_view: Option<&mut ModelAndView>,
    ) -> Result<(), Error> {
        for interceptor in self.interceptors.iter().rev() {
            trace!("post_handle: {}", interceptor.name());
            interceptor
                .post_handle(req, res, &self.handler, model_and_view.as_deref_mut())
                .await?;
        }
        Ok(())
    }

    /// pre_handle に入ったインターセプターへ逆順に after_completion を通知する
    ///
    /// 一度だけ実行され、2回目以降は何もしない。途中のフックが失敗しても残りは呼び、
    /// 最初の失敗を返す。
    pub async fn trigger_after_completion(
        &mut self,
        req: &mut Request,
        res: &mut Response,
        error: Option<&Error>,
    ) -> Result<(), Error> {
        if self.completed {
            return Ok(());
        }
        self.completed = true;

        let mut first_failure = None;
        for interceptor in self.interceptors[..self.entered].iter().rev() {
            trace!("after_completion: {}", interceptor.name());
            if let Err(e) = interceptor.after_completion(req, res, &self.handler, error).await {
                error!("after_completion of {} failed: {}", interceptor.name(), e);
                first_failure.get_or_insert(e);
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
