// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 拍摄会话 (Capture session)
//! 职责: 帧 → 预处理 → 推理 (主检测器 + 可选辅助检测器) → 解码 → 坐标映射 → 拍摄状态机 → 回调

use std::time::Instant;

use tracing::{debug, info, warn};

use super::{Guidance, GuidanceSink, LogSink, TickReport};
use crate::capture::{AutomatonStats, CaptureAutomaton, CaptureSink};
use crate::config::SessionConfig;
use crate::detection::{
    CoordinateMapper, Detection, DetectionSet, MapTarget, OutputDecoder, Preprocessor,
};
use crate::error::PipelineError;
use crate::input::DecodedFrame;
use crate::models::{Detector, ModelSpec};
use crate::utils::{Clock, SystemClock};

/// 会话构建器
pub struct SessionBuilder {
    config: SessionConfig,
    detector: Option<Box<dyn Detector>>,
    auxiliary: Option<Box<dyn Detector>>,
    clock: Box<dyn Clock>,
    capture_sink: Option<Box<dyn CaptureSink + Send>>,
    guidance_sink: Option<Box<dyn GuidanceSink>>,
    log_sink: Option<Box<dyn LogSink>>,
}

impl SessionBuilder {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            detector: None,
            auxiliary: None,
            clock: Box::new(SystemClock::new()),
            capture_sink: None,
            guidance_sink: None,
            log_sink: None,
        }
    }

    pub fn detector<D: Detector + 'static>(mut self, detector: D) -> Self {
        self.detector = Some(Box::new(detector));
        self
    }

    pub fn boxed_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// 辅助检测器 (可选): 每帧与主检测器一起运行, 检测结果合并后进入状态机
    ///
    /// 辅助检测器推理或解码失败只记录日志, 不影响主检测器。
    pub fn auxiliary_detector<D: Detector + 'static>(mut self, detector: D) -> Self {
        self.auxiliary = Some(Box::new(detector));
        self
    }

    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn on_capture<F>(mut self, f: F) -> Self
    where
        F: FnMut(&str, &[Detection]) + Send + 'static,
    {
        self.capture_sink = Some(Box::new(f));
        self
    }

    pub fn capture_sink<S: CaptureSink + Send + 'static>(mut self, sink: S) -> Self {
        self.capture_sink = Some(Box::new(sink));
        self
    }

    pub fn on_guidance<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Guidance) + Send + 'static,
    {
        self.guidance_sink = Some(Box::new(f));
        self
    }

    pub fn on_log<F>(mut self, f: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.log_sink = Some(Box::new(f));
        self
    }

    /// 启动校验: 缺少检测器、输入形状不可读或拍摄计划为空都无法启动
    pub fn build(self) -> Result<Session, PipelineError> {
        let detector = self.detector.ok_or_else(|| {
            PipelineError::CapabilityUnavailable("no detector supplied".into())
        })?;
        let shape = detector.input_shape().map_err(|e| {
            PipelineError::CapabilityUnavailable(format!(
                "detector '{}' input shape unavailable: {:#}",
                detector.name(),
                e
            ))
        })?;
        if self.config.plan.is_empty() {
            return Err(PipelineError::CapabilityUnavailable(
                "capture plan is empty".into(),
            ));
        }
        self.config.validate()?;

        let spec = ModelSpec::from_input_shape(&shape, self.config.default_input_size);
        let auxiliary = match self.auxiliary {
            Some(aux) => Some(AuxiliaryStage::new(aux, self.config.default_input_size)?),
            None => None,
        };
        let plan = self.config.capture_plan()?;
        info!(
            "✅ 会话启动: 检测器={} 输入={:?} -> {}x{} {:?} | 目标={}",
            detector.name(),
            shape,
            spec.input_width,
            spec.input_height,
            spec.layout,
            plan.len()
        );

        let capture_sink = self.capture_sink.unwrap_or_else(|| {
            Box::new(|goal_id: &str, _: &[Detection]| {
                info!("📸 {} (no capture sink)", goal_id);
            })
        });

        Ok(Session {
            preprocessor: Preprocessor::new(spec),
            decoder: OutputDecoder::new(self.config.decoder_config(), self.config.label_table()),
            mapper: CoordinateMapper::new(self.config.mapper_config()),
            automaton: CaptureAutomaton::new(plan, self.config.cooldown_ms),
            config: self.config,
            spec,
            detector,
            auxiliary,
            clock: self.clock,
            capture_sink,
            guidance_sink: self.guidance_sink,
            log_sink: self.log_sink,
            ticks: 0,
        })
    }
}

/// 辅助检测器及其独立的输入规格
struct AuxiliaryStage {
    detector: Box<dyn Detector>,
    preprocessor: Preprocessor,
}

impl AuxiliaryStage {
    fn new(detector: Box<dyn Detector>, default_input_size: u32) -> Result<Self, PipelineError> {
        let shape = detector.input_shape().map_err(|e| {
            PipelineError::CapabilityUnavailable(format!(
                "auxiliary detector '{}' input shape unavailable: {:#}",
                detector.name(),
                e
            ))
        })?;
        let spec = ModelSpec::from_input_shape(&shape, default_input_size);
        info!(
            "✅ 辅助检测器: {} 输入={:?} -> {}x{} {:?}",
            detector.name(),
            shape,
            spec.input_width,
            spec.input_height,
            spec.layout
        );
        Ok(Self {
            detector,
            preprocessor: Preprocessor::new(spec),
        })
    }
}

/// 一个会话独占一份拍摄状态
pub struct Session {
    config: SessionConfig,
    spec: ModelSpec,
    detector: Box<dyn Detector>,
    auxiliary: Option<AuxiliaryStage>,
    preprocessor: Preprocessor,
    decoder: OutputDecoder,
    mapper: CoordinateMapper,
    automaton: CaptureAutomaton,
    clock: Box<dyn Clock>,
    capture_sink: Box<dyn CaptureSink + Send>,
    guidance_sink: Option<Box<dyn GuidanceSink>>,
    log_sink: Option<Box<dyn LogSink>>,
    ticks: u64,
}

impl Session {
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn model_spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn stats(&self) -> AutomatonStats {
        self.automaton.stats()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// 开始新的拍摄会话
    pub fn reset(&mut self) {
        self.automaton.reset();
    }

    /// 处理一帧
    ///
    /// 帧未就绪或推理失败时返回错误并跳过本 tick (状态机不变);
    /// 输出格式无法识别时记录日志并以空集合继续。
    /// 无论成功与否, 日志回调都会收到一行状态。
    pub fn tick(&mut self, frame: &DecodedFrame) -> Result<TickReport, PipelineError> {
        let result = self.run_tick(frame);
        let line = match &result {
            Ok(report) => report.summary(),
            Err(e) => format!("⏭️ skipped frame {} ({}): {}", frame.frame_id, e.kind(), e),
        };
        debug!("{}", line);
        self.emit_log(&line);
        result
    }

    fn run_tick(&mut self, frame: &DecodedFrame) -> Result<TickReport, PipelineError> {
        let start_total = Instant::now();

        // 1. 预处理
        let pre = self.preprocessor.run(frame)?;

        // 2. 辅助检测器 (失败不影响主检测器)
        let (auxiliary, auxiliary_error) = match self.run_auxiliary(frame) {
            Ok(set) => (set, None),
            Err(e) => {
                let line = format!("⚠️ 帧 {} 辅助检测器失败 ({}): {}", frame.frame_id, e.kind(), e);
                warn!("{}", line);
                self.emit_log(&line);
                (DetectionSet::empty(), Some(e.to_string()))
            }
        };

        // 3. 推理
        let t_infer = Instant::now();
        let output = self
            .detector
            .infer(pre.tensor)
            .map_err(|e| PipelineError::Inference(format!("{:#}", e)))?;
        let inference_ms = t_infer.elapsed().as_secs_f64() * 1000.0;

        // 4. 解码 (output 在此被消费并释放)
        let (raw, decode_error) = match self.decoder.decode(output) {
            Ok(set) => (set, None),
            Err(e) => {
                warn!("⚠️ 帧 {} 解码失败: {}", frame.frame_id, e);
                (DetectionSet::empty(), Some(e.to_string()))
            }
        };

        // 5. 映射到帧像素坐标, 辅助结果在前
        let target = MapTarget {
            dest_w: frame.width as f32,
            dest_h: frame.height as f32,
            x_ratio: pre.x_ratio,
            y_ratio: pre.y_ratio,
        };
        let main = self.mapper.map_set(&raw, &target);
        let detections: DetectionSet = if auxiliary.is_empty() {
            main
        } else {
            auxiliary
                .into_vec()
                .into_iter()
                .chain(main.into_vec())
                .collect()
        };

        // 6. 拍摄状态机
        let now_ms = self.clock.now_ms();
        let outcome = self
            .automaton
            .tick(&detections, now_ms, &mut *self.capture_sink);

        // 7. 引导
        let guidance = self.config.guidance_label.as_deref().and_then(|label| {
            detections.best(label).map(|d| Guidance {
                label: label.to_string(),
                measurement: d.bbox.width(),
            })
        });
        if let (Some(g), Some(sink)) = (&guidance, self.guidance_sink.as_mut()) {
            sink.on_guidance(g);
        }

        self.ticks += 1;
        Ok(TickReport {
            frame_id: frame.frame_id,
            now_ms,
            detections,
            outcome,
            guidance,
            decode_error,
            auxiliary_error,
            inference_ms,
            total_ms: start_total.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// 辅助检测器: 独立预处理、推理、解码, 按自身比例映射
    fn run_auxiliary(&mut self, frame: &DecodedFrame) -> Result<DetectionSet, PipelineError> {
        let Some(aux) = self.auxiliary.as_mut() else {
            return Ok(DetectionSet::empty());
        };
        let pre = aux.preprocessor.run(frame)?;
        let output = aux
            .detector
            .infer(pre.tensor)
            .map_err(|e| PipelineError::Inference(format!("{:#}", e)))?;
        let raw = self.decoder.decode(output)?;
        let target = MapTarget {
            dest_w: frame.width as f32,
            dest_h: frame.height as f32,
            x_ratio: pre.x_ratio,
            y_ratio: pre.y_ratio,
        };
        Ok(self.mapper.map_set(&raw, &target))
    }

    fn emit_log(&mut self, line: &str) {
        if let Some(sink) = self.log_sink.as_mut() {
            sink.log(line);
        }
    }
}
