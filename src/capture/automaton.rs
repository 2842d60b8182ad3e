// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 拍摄状态机 (Capture automaton)
//!
//! 每个 tick 只评估当前目标:
//! 1. 条件成立 → 稳定计数 +1, 否则清零
//! 2. 稳定计数达标 + 冷却已过 + 阶段间隔已过 → 触发拍摄
//! 3. 触发后推进到下一个目标, 计数清零
//!
//! 全部目标完成后进入 DONE, 之后的 tick 不再有任何副作用。

use serde::Serialize;
use tracing::{debug, info};

use super::goal::{CaptureGoal, CapturePlan};
use crate::detection::{Detection, DetectionSet};

/// 拍摄回调: `(goal_id, qualifying_detections)`
pub trait CaptureSink {
    fn on_capture(&mut self, goal_id: &str, detections: &[Detection]);
}

impl<F> CaptureSink for F
where
    F: FnMut(&str, &[Detection]),
{
    fn on_capture(&mut self, goal_id: &str, detections: &[Detection]) {
        self(goal_id, detections)
    }
}

/// 会话状态, 只由状态机在 tick 内修改
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutomatonState {
    pub goal_index: usize,
    pub consecutive_stable_count: u32,
    /// 上一次任意拍摄的时间 (None=从未拍摄)
    pub last_fire_ms: Option<u64>,
    /// 上一个目标的拍摄时间, 用于阶段间隔
    pub previous_goal_fire_ms: Option<u64>,
    pub completed_goal_ids: Vec<String>,
}

/// 一次拍摄事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FireEvent {
    pub goal_id: String,
    pub goal_index: usize,
    pub at_ms: u64,
    pub detections: Vec<Detection>,
}

/// 条件已稳定但仍需等待的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitReason {
    Cooldown { remaining_ms: u64 },
    PhaseGap { remaining_ms: u64 },
}

/// 单个 tick 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// 当前目标未满足或仍在累计稳定帧
    Armed {
        goal_id: String,
        stable: u32,
        required: u32,
    },
    /// 已稳定, 等待冷却或阶段间隔
    Waiting { goal_id: String, reason: WaitReason },
    Fired(FireEvent),
    /// 计划已全部完成
    Done,
}

impl TickOutcome {
    pub fn fired(&self) -> Option<&FireEvent> {
        match self {
            TickOutcome::Fired(event) => Some(event),
            _ => None,
        }
    }
}

/// 只读统计快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutomatonStats {
    pub goal_index: usize,
    pub total_goals: usize,
    pub current_goal: Option<String>,
    pub consecutive_stable_count: u32,
    pub completed_goal_ids: Vec<String>,
    pub last_fire_ms: Option<u64>,
    /// 上一个目标的触发时间, 阶段间隔从这里起算
    pub previous_goal_fire_ms: Option<u64>,
    pub done: bool,
}

pub struct CaptureAutomaton {
    plan: CapturePlan,
    cooldown_ms: u64,
    state: AutomatonState,
}

impl CaptureAutomaton {
    pub fn new(plan: CapturePlan, cooldown_ms: u64) -> Self {
        Self {
            plan,
            cooldown_ms,
            state: AutomatonState::default(),
        }
    }

    pub fn plan(&self) -> &CapturePlan {
        &self.plan
    }

    pub fn state(&self) -> &AutomatonState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        self.state.goal_index >= self.plan.len()
    }

    /// 当前待触发的目标
    pub fn armed_goal(&self) -> Option<&CaptureGoal> {
        self.plan.get(self.state.goal_index)
    }

    /// 恢复初始状态
    pub fn reset(&mut self) {
        info!("🔄 拍摄状态已重置");
        self.state = AutomatonState::default();
    }

    pub fn tick<S>(&mut self, set: &DetectionSet, now_ms: u64, sink: &mut S) -> TickOutcome
    where
        S: CaptureSink + ?Sized,
    {
        let goal = match self.plan.get(self.state.goal_index) {
            Some(goal) => goal,
            None => return TickOutcome::Done,
        };

        let qualifying = goal.predicate.evaluate(set, goal.confidence_threshold);
        let detections = match qualifying {
            Some(detections) => {
                self.state.consecutive_stable_count += 1;
                detections
            }
            None => {
                self.state.consecutive_stable_count = 0;
                return TickOutcome::Armed {
                    goal_id: goal.id.clone(),
                    stable: 0,
                    required: goal.required_stable_frames,
                };
            }
        };

        let stable = self.state.consecutive_stable_count;
        if stable < goal.required_stable_frames {
            debug!(
                "[capture] {} stable={}/{}",
                goal.id, stable, goal.required_stable_frames
            );
            return TickOutcome::Armed {
                goal_id: goal.id.clone(),
                stable,
                required: goal.required_stable_frames,
            };
        }

        // 冷却: 距上一次任意拍摄
        if let Some(last) = self.state.last_fire_ms {
            let elapsed = now_ms.saturating_sub(last);
            if elapsed <= self.cooldown_ms {
                return TickOutcome::Waiting {
                    goal_id: goal.id.clone(),
                    reason: WaitReason::Cooldown {
                        remaining_ms: self.cooldown_ms - elapsed,
                    },
                };
            }
        }

        // 阶段间隔: 距上一个目标完成 (首个目标不受限)
        if self.state.goal_index > 0 {
            if let Some(previous) = self.state.previous_goal_fire_ms {
                let elapsed = now_ms.saturating_sub(previous);
                if elapsed <= goal.min_gap_after_previous_ms {
                    debug!(
                        "[capture] waiting phase gap... {}ms remaining",
                        goal.min_gap_after_previous_ms - elapsed
                    );
                    return TickOutcome::Waiting {
                        goal_id: goal.id.clone(),
                        reason: WaitReason::PhaseGap {
                            remaining_ms: goal.min_gap_after_previous_ms - elapsed,
                        },
                    };
                }
            }
        }

        let event = FireEvent {
            goal_id: goal.id.clone(),
            goal_index: self.state.goal_index,
            at_ms: now_ms,
            detections,
        };
        info!("📸 CAPTURING: {} @ {}ms", event.goal_id, now_ms);
        sink.on_capture(&event.goal_id, &event.detections);

        self.state.last_fire_ms = Some(now_ms);
        self.state.previous_goal_fire_ms = Some(now_ms);
        self.state.completed_goal_ids.push(event.goal_id.clone());
        self.state.goal_index += 1;
        self.state.consecutive_stable_count = 0;

        if self.is_done() {
            info!("✅ 拍摄计划全部完成 ({} 个目标)", self.plan.len());
        }
        TickOutcome::Fired(event)
    }

    pub fn stats(&self) -> AutomatonStats {
        AutomatonStats {
            goal_index: self.state.goal_index,
            total_goals: self.plan.len(),
            current_goal: self.armed_goal().map(|g| g.id.clone()),
            consecutive_stable_count: self.state.consecutive_stable_count,
            completed_goal_ids: self.state.completed_goal_ids.clone(),
            last_fire_ms: self.state.last_fire_ms,
            previous_goal_fire_ms: self.state.previous_goal_fire_ms,
            done: self.is_done(),
        }
    }
}
