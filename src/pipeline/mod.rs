// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 实时拍摄流水线 (Real-time capture pipeline)
///
/// 单工作线程架构:
/// - LoopDriver: 调度帧, 保证同一时刻最多一个 tick 在执行
/// - Session:    预处理 → 推理 (主检测器 + 可选辅助检测器) → 解码 → 坐标映射 → 拍摄状态机 → 回调
pub mod driver;
pub mod session;

pub use driver::{DriverStats, LoopDriver};
pub use session::{Session, SessionBuilder};

use serde::Serialize;

use crate::capture::TickOutcome;
use crate::detection::DetectionSet;

// ========== 回调 ==========

/// 引导信息 (测距/对准), 由下游换算成距离或进度条
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Guidance {
    pub label: String,
    /// 映射后的框宽 (显示像素)
    pub measurement: f32,
}

/// 引导回调
pub trait GuidanceSink: Send {
    fn on_guidance(&mut self, guidance: &Guidance);
}

impl<F> GuidanceSink for F
where
    F: FnMut(&Guidance) + Send,
{
    fn on_guidance(&mut self, guidance: &Guidance) {
        self(guidance)
    }
}

/// 状态日志回调, 每个 tick 一行
pub trait LogSink: Send {
    fn log(&mut self, line: &str);
}

impl<F> LogSink for F
where
    F: FnMut(&str) + Send,
{
    fn log(&mut self, line: &str) {
        self(line)
    }
}

// ========== 结果 ==========

/// 单个 tick 的结果 (会话 → 调用方)
#[derive(Clone, Debug)]
pub struct TickReport {
    pub frame_id: u64,
    pub now_ms: u64,
    /// 映射到帧像素坐标后的检测
    pub detections: DetectionSet,
    pub outcome: TickOutcome,
    pub guidance: Option<Guidance>,
    /// 解码失败时的错误描述 (该 tick 以空集合继续)
    pub decode_error: Option<String>,
    /// 辅助检测器失败时的错误描述 (主检测器照常运行)
    pub auxiliary_error: Option<String>,
    pub inference_ms: f64,
    pub total_ms: f64,
}

impl TickReport {
    /// 人类可读的状态行
    pub fn summary(&self) -> String {
        let status = match &self.outcome {
            TickOutcome::Armed {
                goal_id,
                stable,
                required,
            } => format!("{} stable {}/{}", goal_id, stable, required),
            TickOutcome::Waiting { goal_id, reason } => format!("{} waiting {:?}", goal_id, reason),
            TickOutcome::Fired(event) => format!("📸 captured {}", event.goal_id),
            TickOutcome::Done => "done".to_string(),
        };
        let guidance = match &self.guidance {
            Some(g) => format!("{}: {:.1}px", g.label, g.measurement),
            None => "no guidance".to_string(),
        };
        format!(
            "Rendered: {} objects | {} | {} | {} | {:.1}ms",
            self.detections.len(),
            self.detections.summary(),
            guidance,
            status,
            self.total_ms
        )
    }
}
