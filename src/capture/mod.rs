// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 拍摄触发 (Capture triggering)
///
/// - goal:      拍摄目标、触发条件、拍摄计划
/// - automaton: 稳定帧 / 冷却 / 阶段间隔状态机
/// - trace:     检测轨迹回放
pub mod automaton;
pub mod goal;
pub mod trace;

pub use automaton::{
    AutomatonState, AutomatonStats, CaptureAutomaton, CaptureSink, FireEvent, TickOutcome,
    WaitReason,
};
pub use goal::{CaptureGoal, CapturePlan, GoalPredicate};
pub use trace::{load_trace, replay, TraceFrame};
