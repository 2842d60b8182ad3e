// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 会话配置 - 通过JSON文件调整参数

use serde::{Deserialize, Serialize};
use std::fs;
use tracing::{info, warn};

use crate::capture::goal::{default_goals, validate_goals, CaptureGoal, CapturePlan};
use crate::detection::decoder::DecoderConfig;
use crate::detection::mapper::MapperConfig;
use crate::detection::{LabelTable, DEFAULT_LABELS};
use crate::error::PipelineError;

/// 会话参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    // === 检测参数 ===
    pub class_threshold: f32,            // 解码置信度阈值
    pub labels: Vec<String>,             // 类别表 (顺序与模型一致)
    pub nms_iou_threshold: Option<f32>,  // 密集网格NMS IOU (None=关闭)
    pub default_input_size: u32,         // 输入形状未知时的默认边长

    // === 坐标映射 ===
    pub normalized_tolerance: f32, // 归一化坐标判定阈值
    pub min_box_px: f32,           // 最小框宽高(像素)

    // === 拍摄 ===
    pub cooldown_ms: u64,                // 两次拍摄最小间隔
    pub max_ticks_per_sec: Option<u32>,  // 调度节流 (None=不限)
    pub guidance_label: Option<String>,  // 引导测距使用的标签
    pub plan: Vec<CaptureGoal>,          // 拍摄计划
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            // 检测参数
            class_threshold: 0.5,
            labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
            nms_iou_threshold: None,
            default_input_size: 320,

            // 坐标映射
            normalized_tolerance: 1.5,
            min_box_px: 5.0,

            // 拍摄
            cooldown_ms: 2000,
            max_ticks_per_sec: Some(15),
            guidance_label: Some("triangle".to_string()),
            plan: default_goals(),
        }
    }
}

impl SessionConfig {
    /// 从JSON文件加载配置
    ///
    /// 文件不存在时写出默认配置; 解析失败时使用默认值
    pub fn load(path: &str) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match Self::from_json_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path);
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                config.save(path);
                config
            }
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &str) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("❌ 保存配置失败: {}", e);
                } else {
                    info!("💾 配置已保存到 {}", path);
                }
            }
            Err(e) => warn!("❌ 序列化配置失败: {}", e),
        }
    }

    /// 启动前校验
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(0.0..=1.0).contains(&self.class_threshold) {
            return Err(PipelineError::Config(format!(
                "class_threshold {} outside [0, 1]",
                self.class_threshold
            )));
        }
        if self.labels.is_empty() {
            return Err(PipelineError::Config("label table is empty".into()));
        }
        if let Some(iou) = self.nms_iou_threshold {
            if !(0.0..=1.0).contains(&iou) {
                return Err(PipelineError::Config(format!(
                    "nms_iou_threshold {} outside [0, 1]",
                    iou
                )));
            }
        }
        for (name, value) in [
            ("normalized_tolerance", self.normalized_tolerance),
            ("min_box_px", self.min_box_px),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PipelineError::Config(format!(
                    "{} {} must be finite and >= 0",
                    name, value
                )));
            }
        }
        if self.default_input_size == 0 {
            return Err(PipelineError::Config("default_input_size must be > 0".into()));
        }
        if self.max_ticks_per_sec == Some(0) {
            return Err(PipelineError::Config("max_ticks_per_sec must be > 0".into()));
        }
        validate_goals(&self.plan).map_err(PipelineError::Config)
    }

    pub fn label_table(&self) -> LabelTable {
        LabelTable::new(self.labels.clone())
    }

    pub fn capture_plan(&self) -> Result<CapturePlan, PipelineError> {
        CapturePlan::new(self.plan.clone())
    }

    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            class_threshold: self.class_threshold,
            nms_iou_threshold: self.nms_iou_threshold,
        }
    }

    pub fn mapper_config(&self) -> MapperConfig {
        MapperConfig {
            normalized_tolerance: self.normalized_tolerance,
            min_box_px: self.min_box_px,
        }
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        println!("\n🎛️  当前会话配置:");
        println!("  检测置信度: {:.2}", self.class_threshold);
        println!("  类别数: {} ({})", self.labels.len(), self.labels.join(", "));
        match self.nms_iou_threshold {
            Some(iou) => println!("  NMS IOU: {:.2}", iou),
            None => println!("  NMS IOU: 关闭"),
        }
        println!("  归一化阈值: {:.2}, 最小框: {:.0}px", self.normalized_tolerance, self.min_box_px);
        println!("  拍摄冷却: {}ms", self.cooldown_ms);
        match self.max_ticks_per_sec {
            Some(n) => println!("  最大调度频率: {}/s", n),
            None => println!("  最大调度频率: 不限"),
        }
        println!("  拍摄计划:");
        for (i, goal) in self.plan.iter().enumerate() {
            println!(
                "    {}. {} (稳定{}帧, 阈值{:.2}, 间隔{}ms)",
                i + 1,
                goal.id,
                goal.required_stable_frames,
                goal.confidence_threshold,
                goal.min_gap_after_previous_ms
            );
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.label_table().label(2), "triangle");
        assert_eq!(config.capture_plan().unwrap(), CapturePlan::two_phase());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SessionConfig::from_json_str(r#"{"cooldown_ms": 500}"#).unwrap();
        assert_eq!(config.cooldown_ms, 500);
        assert_eq!(config.class_threshold, 0.5);
        assert_eq!(config.plan.len(), 2);
        assert!(SessionConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = SessionConfig::default();
        config.plan.clear();
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        let mut config = SessionConfig::default();
        config.class_threshold = 1.2;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.plan[1].id = config.plan[0].id.clone();
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.plan[0].required_stable_frames = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_mapper_knobs() {
        for (tolerance, min_box) in [(f32::NAN, 5.0), (-1.0, 5.0), (1.5, -3.0), (1.5, f32::INFINITY)] {
            let mut config = SessionConfig::default();
            config.normalized_tolerance = tolerance;
            config.min_box_px = min_box;
            assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
        }

        let mut config = SessionConfig::default();
        config.min_box_px = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("align_capture_cfg_{}.json", std::process::id()));
        let path = path.to_string_lossy().to_string();
        let _ = fs::remove_file(&path);

        // 不存在 → 写出默认值
        let config = SessionConfig::load(&path);
        assert_eq!(config, SessionConfig::default());
        assert!(fs::metadata(&path).is_ok());

        let mut changed = config.clone();
        changed.cooldown_ms = 3000;
        changed.save(&path);
        assert_eq!(SessionConfig::load(&path).cooldown_ms, 3000);
        let _ = fs::remove_file(&path);
    }
}
