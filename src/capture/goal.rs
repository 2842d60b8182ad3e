// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 拍摄目标与拍摄计划 (Capture goals and plan)

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::detection::{Detection, DetectionSet};
use crate::error::PipelineError;

fn default_stable_frames() -> u32 {
    2
}

fn default_goal_threshold() -> f32 {
    0.5
}

/// 目标触发条件
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GoalPredicate {
    /// 置信度达标的标签集合包含全部 `labels`
    RequiresLabels { labels: Vec<String> },
    /// `label` 出现且映射后的框宽落在 `[min_px, max_px]`
    LabelWidthWithin {
        label: String,
        min_px: f32,
        max_px: f32,
    },
}

impl GoalPredicate {
    /// 条件成立时返回参与判定的检测, 否则 `None`
    pub fn evaluate(&self, set: &DetectionSet, threshold: f32) -> Option<Vec<Detection>> {
        match self {
            GoalPredicate::RequiresLabels { labels } => {
                let observed: HashSet<&str> = set
                    .iter()
                    .filter(|d| d.score >= threshold)
                    .map(|d| d.label.as_str())
                    .collect();
                if !labels.iter().all(|l| observed.contains(l.as_str())) {
                    return None;
                }
                Some(
                    set.iter()
                        .filter(|d| d.score >= threshold && labels.contains(&d.label))
                        .cloned()
                        .collect(),
                )
            }
            GoalPredicate::LabelWidthWithin {
                label,
                min_px,
                max_px,
            } => {
                let hits: Vec<Detection> = set
                    .iter()
                    .filter(|d| d.score >= threshold && &d.label == label)
                    .filter(|d| {
                        let w = d.bbox.width();
                        w >= *min_px && w <= *max_px
                    })
                    .cloned()
                    .collect();
                if hits.is_empty() {
                    None
                } else {
                    Some(hits)
                }
            }
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            GoalPredicate::RequiresLabels { labels } => {
                if labels.is_empty() {
                    return Err("requires_labels needs at least one label".into());
                }
            }
            GoalPredicate::LabelWidthWithin { min_px, max_px, .. } => {
                if !(min_px <= max_px) {
                    return Err(format!("width range [{}, {}] is empty", min_px, max_px));
                }
            }
        }
        Ok(())
    }
}

/// 单个拍摄目标
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptureGoal {
    pub id: String,
    pub predicate: GoalPredicate,
    /// 连续满足条件的帧数
    #[serde(default = "default_stable_frames")]
    pub required_stable_frames: u32,
    /// 距上一个目标触发的最小间隔 (首个目标忽略)
    #[serde(default)]
    pub min_gap_after_previous_ms: u64,
    #[serde(default = "default_goal_threshold")]
    pub confidence_threshold: f32,
}

impl CaptureGoal {
    pub fn requires(id: &str, labels: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            predicate: GoalPredicate::RequiresLabels {
                labels: labels.iter().map(|s| s.to_string()).collect(),
            },
            required_stable_frames: default_stable_frames(),
            min_gap_after_previous_ms: 0,
            confidence_threshold: default_goal_threshold(),
        }
    }

    pub fn stable_frames(mut self, n: u32) -> Self {
        self.required_stable_frames = n;
        self
    }

    pub fn min_gap_ms(mut self, ms: u64) -> Self {
        self.min_gap_after_previous_ms = ms;
        self
    }

    pub fn threshold(mut self, conf: f32) -> Self {
        self.confidence_threshold = conf;
        self
    }
}

/// 有序且不可变的拍摄计划
#[derive(Clone, Debug, PartialEq)]
pub struct CapturePlan {
    goals: Vec<CaptureGoal>,
}

impl CapturePlan {
    pub fn new(goals: Vec<CaptureGoal>) -> Result<Self, PipelineError> {
        validate_goals(&goals).map_err(PipelineError::Config)?;
        Ok(Self { goals })
    }

    /// 默认两阶段计划: 不戴眼镜 → 间隔6秒 → 戴眼镜
    pub fn two_phase() -> Self {
        Self {
            goals: default_goals(),
        }
    }

    /// 两阶段计划之前先拍一张多目标对齐帧
    pub fn with_alignment_frame() -> Self {
        let mut goals = vec![CaptureGoal::requires(
            "multi_class_frame",
            &["triangle", "left_square", "right_circle"],
        )
        .threshold(0.6)];
        goals.extend(default_goals());
        Self { goals }
    }

    pub fn goals(&self) -> &[CaptureGoal] {
        &self.goals
    }

    pub fn get(&self, index: usize) -> Option<&CaptureGoal> {
        self.goals.get(index)
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }
}

pub(crate) fn default_goals() -> Vec<CaptureGoal> {
    vec![
        CaptureGoal::requires("without_glass_image", &["triangle"]),
        CaptureGoal::requires("with_glass_image", &["triangle"]).min_gap_ms(6000),
    ]
}

pub(crate) fn validate_goals(goals: &[CaptureGoal]) -> Result<(), String> {
    if goals.is_empty() {
        return Err("capture plan is empty".into());
    }
    let mut seen = HashSet::new();
    for goal in goals {
        if goal.id.trim().is_empty() {
            return Err("goal id must not be empty".into());
        }
        if !seen.insert(goal.id.as_str()) {
            return Err(format!("duplicate goal id '{}'", goal.id));
        }
        if goal.required_stable_frames == 0 {
            return Err(format!("goal '{}': required_stable_frames must be >= 1", goal.id));
        }
        if !(0.0..=1.0).contains(&goal.confidence_threshold) {
            return Err(format!(
                "goal '{}': confidence_threshold {} outside [0, 1]",
                goal.id, goal.confidence_threshold
            ));
        }
        goal.predicate
            .validate()
            .map_err(|e| format!("goal '{}': {}", goal.id, e))?;
    }
    Ok(())
}
