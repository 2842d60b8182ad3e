// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod capture; // 拍摄目标与状态机
pub mod config; // 会话配置参数
pub mod detection; // 预处理、解码、坐标映射
pub mod error; // 流水线错误类型
pub mod input; // 帧与帧源
pub mod models; // 检测器接口与输入规格
pub mod pipeline; // 会话与调度器
pub mod utils; // 时钟等工具

pub use crate::capture::{
    CaptureAutomaton, CaptureGoal, CapturePlan, CaptureSink, FireEvent, GoalPredicate,
    TickOutcome,
};
pub use crate::config::SessionConfig;
pub use crate::detection::{BBox, Detection, DetectionSet, LabelTable};
pub use crate::error::PipelineError;
pub use crate::input::{DecodedFrame, FrameSource, StillFrameSource};
pub use crate::models::{Detector, ModelSpec, RawOutput, TensorLayout};
pub use crate::pipeline::{Guidance, LoopDriver, Session, SessionBuilder, TickReport};
pub use crate::utils::{Clock, ManualClock, SystemClock};
