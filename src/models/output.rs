// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 检测器原始输出: 一个或多个张量 + 可选的后端释放钩子

use std::fmt;

use ndarray::{Array, IxDyn};
use tracing::warn;

use crate::error::PipelineError;

type ReleaseHook = Box<dyn FnOnce() -> Result<(), String> + Send>;

/// 单个 tick 的原始输出
///
/// 由 OutputDecoder 独占; `Drop` 时运行释放钩子 (例如归还 GPU 缓冲),
/// 所以无论解码成功、出错还是提前返回,张量都会在 tick 结束前释放。
pub struct RawOutput {
    tensors: Vec<Array<f32, IxDyn>>,
    release: Option<ReleaseHook>,
}

impl RawOutput {
    pub fn new(tensors: Vec<Array<f32, IxDyn>>) -> Self {
        Self {
            tensors,
            release: None,
        }
    }

    /// 附加释放钩子; 钩子失败只记录日志
    pub fn with_release<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() -> Result<(), String> + Send + 'static,
    {
        self.release = Some(Box::new(hook));
        self
    }

    pub fn tensors(&self) -> &[Array<f32, IxDyn>] {
        &self.tensors
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// 各张量形状, 用于日志
    pub fn shapes(&self) -> Vec<Vec<usize>> {
        self.tensors.iter().map(|t| t.shape().to_vec()).collect()
    }

    fn run_release(&mut self) -> Result<(), PipelineError> {
        match self.release.take() {
            Some(hook) => hook().map_err(PipelineError::ResourceRelease),
            None => Ok(()),
        }
    }
}

impl From<Vec<Array<f32, IxDyn>>> for RawOutput {
    fn from(tensors: Vec<Array<f32, IxDyn>>) -> Self {
        Self::new(tensors)
    }
}

impl fmt::Debug for RawOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawOutput")
            .field("shapes", &self.shapes())
            .field("release", &self.release.is_some())
            .finish()
    }
}

impl Drop for RawOutput {
    fn drop(&mut self) {
        self.tensors.clear();
        if let Err(e) = self.run_release() {
            warn!("⚠️ {}", e);
        }
    }
}
