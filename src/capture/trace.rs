// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测轨迹回放 - 用固定时间戳重现现场的触发序列

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::automaton::{CaptureAutomaton, FireEvent, TickOutcome};
use crate::detection::{Detection, DetectionSet};
use crate::utils::{Clock, ManualClock};

/// 轨迹中的一帧 (检测已映射到显示坐标)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceFrame {
    pub t_ms: u64,
    #[serde(default)]
    pub detections: DetectionSet,
}

pub fn load_trace<P: AsRef<Path>>(path: P) -> Result<Vec<TraceFrame>> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read trace {}", path.display()))?;
    let frames: Vec<TraceFrame> = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse trace {}", path.display()))?;
    Ok(frames)
}

/// 按轨迹时间戳逐帧驱动状态机, 返回全部触发事件
pub fn replay(
    automaton: &mut CaptureAutomaton,
    frames: &[TraceFrame],
    mut on_fire: impl FnMut(&FireEvent),
) -> Vec<FireEvent> {
    let clock = ManualClock::new(0);
    let mut sink = |_: &str, _: &[Detection]| {};
    let mut events = Vec::new();
    for frame in frames {
        clock.set(frame.t_ms);
        if let TickOutcome::Fired(event) =
            automaton.tick(&frame.detections, clock.now_ms(), &mut sink)
        {
            on_fire(&event);
            events.push(event);
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CapturePlan;

    #[test]
    fn test_replay_default_plan() {
        let json = r#"[
            {"t_ms": 0, "detections": [{"class_id": 2, "label": "triangle", "score": 0.9, "bbox": {"x1": 10, "y1": 10, "x2": 60, "y2": 60}}]},
            {"t_ms": 40, "detections": [{"class_id": 2, "label": "triangle", "score": 0.9, "bbox": {"x1": 10, "y1": 10, "x2": 60, "y2": 60}}]},
            {"t_ms": 3000},
            {"t_ms": 6100, "detections": [{"class_id": 2, "label": "triangle", "score": 0.8, "bbox": {"x1": 10, "y1": 10, "x2": 60, "y2": 60}}]},
            {"t_ms": 6141, "detections": [{"class_id": 2, "label": "triangle", "score": 0.8, "bbox": {"x1": 10, "y1": 10, "x2": 60, "y2": 60}}]}
        ]"#;
        let frames: Vec<TraceFrame> = serde_json::from_str(json).unwrap();
        assert!(frames[2].detections.is_empty());

        let mut automaton = CaptureAutomaton::new(CapturePlan::two_phase(), 2000);
        let mut printed = 0;
        let events = replay(&mut automaton, &frames, |_| printed += 1);
        let ids: Vec<(&str, u64)> = events.iter().map(|e| (e.goal_id.as_str(), e.at_ms)).collect();
        assert_eq!(ids, vec![("without_glass_image", 40), ("with_glass_image", 6141)]);
        assert_eq!(printed, 2);
    }

    #[test]
    fn test_load_trace_errors() {
        assert!(load_trace("/nonexistent/trace.json").is_err());
    }
}
