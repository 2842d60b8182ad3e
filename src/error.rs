// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 流水线错误类型 (Pipeline errors)
//!
//! 除启动阶段的 `CapabilityUnavailable` / `Config` 外全部为非致命错误:
//! 单帧出错只跳过当前 tick, 循环继续调度。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// 帧尚未就绪 (宽高为0或像素缓冲不完整)
    #[error("frame not ready: {0}")]
    Readiness(String),

    /// 输出张量的秩/形状无法识别
    #[error("unexpected output layout: {0}")]
    Decode(String),

    /// 推理后端调用失败
    #[error("inference failed: {0}")]
    Inference(String),

    /// 张量释放失败 (只记录日志,从不向上传播)
    #[error("tensor release failed: {0}")]
    ResourceRelease(String),

    /// 会话启动时缺少帧源或检测器
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// 会话配置非法 (启动时校验)
    #[error("invalid config: {0}")]
    Config(String),
}

impl PipelineError {
    /// 只有启动阶段的错误会终止会话
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::CapabilityUnavailable(_) | PipelineError::Config(_)
        )
    }

    /// 简短的错误类别名,用于日志
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Readiness(_) => "readiness",
            PipelineError::Decode(_) => "decode",
            PipelineError::Inference(_) => "inference",
            PipelineError::ResourceRelease(_) => "release",
            PipelineError::CapabilityUnavailable(_) => "capability",
            PipelineError::Config(_) => "config",
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_startup_errors_are_fatal() {
        assert!(PipelineError::CapabilityUnavailable("detector".into()).is_fatal());
        assert!(PipelineError::Config("empty plan".into()).is_fatal());
        assert!(!PipelineError::Readiness("0x0".into()).is_fatal());
        assert!(!PipelineError::Decode("rank 5".into()).is_fatal());
        assert!(!PipelineError::Inference("backend lost".into()).is_fatal());
        assert!(!PipelineError::ResourceRelease("gpu".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let e = PipelineError::Decode("rank 2 tensor [4, 4]".into());
        assert_eq!(e.to_string(), "unexpected output layout: rank 2 tensor [4, 4]");
        assert_eq!(e.kind(), "decode");
    }
}
