// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 输出解码: 将不同导出格式的原始张量统一解码为检测集合
//
// 支持两种格式:
// - ThreeTensorNms: boxes[N*4] + scores[N] + classes[N], 模型内部已做NMS (类似YOLOv10端到端输出)
// - DenseAnchorGrid: [batch, 4+nc(+1), anchors], 需逐锚点取argmax (类似YOLOv8输出)

use std::sync::atomic::{AtomicBool, Ordering};

use ndarray::{s, Array, ArrayView2, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{BBox, Detection, DetectionSet, LabelTable};
use crate::error::PipelineError;
use crate::models::RawOutput;

const CXYWH_OFFSET: usize = 4;

/// 解码参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    pub class_threshold: f32,
    /// 密集网格的类别无关NMS (None=关闭)
    pub nms_iou_threshold: Option<f32>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            class_threshold: 0.5,
            nms_iou_threshold: None,
        }
    }
}

/// 识别出的输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    /// 三张量格式, 已经过NMS
    ThreeTensorNms { count: usize },
    /// 单张量密集锚点网格
    DenseAnchorGrid {
        channels: usize,
        anchors: usize,
        /// 形状为 [batch, anchors, channels]
        transposed: bool,
        objectness: bool,
        num_classes: usize,
    },
}

impl OutputLayout {
    /// 按张量个数与形状分类, 只做一次
    pub fn classify(output: &RawOutput, num_labels: usize) -> Result<Self, PipelineError> {
        let tensors = output.tensors();
        if tensors.len() >= 3 {
            let (boxes, scores, classes) = (&tensors[0], &tensors[1], &tensors[2]);
            let count = scores.len();
            if boxes.len() != count * 4 || classes.len() != count {
                return Err(PipelineError::Decode(format!(
                    "three-tensor output with mismatched sizes: boxes={}, scores={}, classes={}",
                    boxes.len(),
                    scores.len(),
                    classes.len()
                )));
            }
            return Ok(OutputLayout::ThreeTensorNms { count });
        }

        if tensors.len() == 1 && tensors[0].ndim() == 3 {
            let shape = tensors[0].shape();
            if shape[0] == 0 {
                return Err(PipelineError::Decode(format!("dense grid {:?} has an empty batch", shape)));
            }
            let (d1, d2) = (shape[1], shape[2]);
            let expected = |c: usize| c == CXYWH_OFFSET + num_labels || c == CXYWH_OFFSET + 1 + num_labels;

            // 通道维: 先按类别表匹配, 否则取较小的一维 (锚点数远大于通道数)
            let transposed = if expected(d1) {
                false
            } else if expected(d2) {
                true
            } else {
                d2 < d1
            };
            let (channels, anchors) = if transposed { (d2, d1) } else { (d1, d2) };
            if channels <= CXYWH_OFFSET {
                return Err(PipelineError::Decode(format!(
                    "dense grid {:?} has no class rows",
                    shape
                )));
            }

            let objectness = channels == CXYWH_OFFSET + 1 + num_labels;
            let num_classes = if objectness {
                num_labels
            } else {
                channels - CXYWH_OFFSET
            };
            return Ok(OutputLayout::DenseAnchorGrid {
                channels,
                anchors,
                transposed,
                objectness,
                num_classes,
            });
        }

        Err(PipelineError::Decode(format!(
            "{} tensor(s) with shapes {:?}",
            tensors.len(),
            output.shapes()
        )))
    }
}

/// 输出解码器
pub struct OutputDecoder {
    config: DecoderConfig,
    labels: LabelTable,
    class_mismatch_warned: AtomicBool,
}

impl OutputDecoder {
    pub fn new(config: DecoderConfig, labels: LabelTable) -> Self {
        Self {
            config,
            labels,
            class_mismatch_warned: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// 解码一次推理输出
    ///
    /// `output` 在此处被消费, 无论成功或失败, 返回前都会执行释放钩子。
    /// 坐标保持模型单位 (像素或归一化), 由 CoordinateMapper 负责映射。
    pub fn decode(&self, output: RawOutput) -> Result<DetectionSet, PipelineError> {
        let layout = OutputLayout::classify(&output, self.labels.len())?;
        debug!("🔎 输出格式: {:?}", layout);

        let set = match layout {
            OutputLayout::ThreeTensorNms { count } => self.decode_three_tensor(&output, count),
            OutputLayout::DenseAnchorGrid {
                channels,
                anchors,
                transposed,
                objectness,
                num_classes,
            } => {
                if num_classes != self.labels.len() {
                    self.warn_class_mismatch(num_classes);
                }
                let grid = output.tensors()[0].index_axis(Axis(0), 0);
                let grid = grid
                    .into_dimensionality::<ndarray::Ix2>()
                    .map_err(|e| PipelineError::Decode(e.to_string()))?;
                // 统一成 [channels, anchors]
                let grid = if transposed { grid.reversed_axes() } else { grid };
                debug_assert_eq!(grid.dim(), (channels, anchors));
                self.decode_dense_grid(grid, objectness, num_classes)
            }
        };
        Ok(set)
    }

    fn decode_three_tensor(&self, output: &RawOutput, count: usize) -> DetectionSet {
        let tensors = output.tensors();
        let boxes: Vec<f32> = tensors[0].iter().copied().collect();

        // 全零框 → 无检测
        if boxes.iter().all(|&v| v == 0.0) {
            return DetectionSet::empty();
        }

        let threshold = self.config.class_threshold;
        tensors[1]
            .iter()
            .zip(tensors[2].iter())
            .take(count)
            .enumerate()
            .filter(|&(_, (&score, &cls))| score >= threshold && cls.is_finite() && cls >= -0.5)
            .map(|(i, (&score, &cls))| {
                let class_id = cls.round() as usize;
                Detection {
                    class_id,
                    label: self.labels.label(class_id),
                    score,
                    bbox: BBox::new(boxes[i * 4], boxes[i * 4 + 1], boxes[i * 4 + 2], boxes[i * 4 + 3]),
                }
            })
            .collect()
    }

    fn decode_dense_grid(
        &self,
        grid: ArrayView2<f32>,
        objectness: bool,
        num_classes: usize,
    ) -> DetectionSet {
        let threshold = self.config.class_threshold;
        let cls_offset = if objectness {
            CXYWH_OFFSET + 1
        } else {
            CXYWH_OFFSET
        };

        let mut data: Vec<Detection> = Vec::new();
        for pred in grid.axis_iter(Axis(1)) {
            let bbox = pred.slice(s![0..CXYWH_OFFSET]);
            let clss = pred.slice(s![cls_offset..cls_offset + num_classes]);

            let (id, &class_score) = match clss
                .into_iter()
                .enumerate()
                .reduce(|max, x| if x.1 > max.1 { x } else { max })
            {
                Some(best) => best,
                None => continue,
            };

            let confidence = if objectness {
                class_score * pred[CXYWH_OFFSET]
            } else {
                class_score
            };
            if !(confidence >= threshold) {
                continue;
            }

            let (cx, cy, w, h) = (bbox[0], bbox[1], bbox[2], bbox[3]);
            if !(w > 0. && h > 0.) {
                continue;
            }

            data.push(Detection {
                class_id: id,
                label: self.labels.label(id),
                score: confidence,
                bbox: BBox::from_cxcywh(cx, cy, w, h),
            });
        }

        if let Some(iou) = self.config.nms_iou_threshold {
            non_max_suppression(&mut data, iou);
        }
        DetectionSet::new(data)
    }

    fn warn_class_mismatch(&self, num_classes: usize) {
        if !self.class_mismatch_warned.swap(true, Ordering::Relaxed) {
            warn!(
                "⚠️ 模型输出 {} 个类别, 类别表有 {} 个, 标签可能错位",
                num_classes,
                self.labels.len()
            );
        }
    }
}

/// 类别无关NMS, 按置信度降序保留
pub fn non_max_suppression(xs: &mut Vec<Detection>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.score.total_cmp(&b1.score));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].bbox.iou(&xs[index].bbox);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn decoder(threshold: f32) -> OutputDecoder {
        OutputDecoder::new(
            DecoderConfig {
                class_threshold: threshold,
                nms_iou_threshold: None,
            },
            LabelTable::default(),
        )
    }

    /// 按行构造 `[1, channels, anchors]` 网格
    fn dense_grid(rows: &[Vec<f32>]) -> Result<Array<f32, IxDyn>, ndarray::ShapeError> {
        let channels = rows.len();
        let anchors = rows.first().map(|r| r.len()).unwrap_or(0);
        let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Array::from_shape_vec(IxDyn(&[1, channels, anchors]), flat)
    }

    fn tensor(shape: &[usize], data: Vec<f32>) -> Array<f32, IxDyn> {
        Array::from_shape_vec(IxDyn(shape), data).unwrap()
    }

    #[test]
    fn test_three_tensor_all_zero_boxes_is_empty() {
        let out = RawOutput::new(vec![
            tensor(&[1, 2, 4], vec![0.; 8]),
            tensor(&[1, 2], vec![0.9, 0.8]),
            tensor(&[1, 2], vec![2., 3.]),
        ]);
        let set = decoder(0.5).decode(out).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_three_tensor_filters_and_labels() {
        let out = RawOutput::new(vec![
            tensor(&[3, 4], vec![0.1, 0.1, 0.3, 0.3, 10., 10., 50., 50., 1., 1., 2., 2.]),
            tensor(&[3], vec![0.9, 0.4, 0.7]),
            tensor(&[3], vec![1.9, 0., 8.]),
            tensor(&[1], vec![3.]),
        ]);
        let set = decoder(0.5).decode(out).unwrap();
        assert_eq!(set.len(), 2);
        let d0 = &set.as_slice()[0];
        assert_eq!((d0.class_id, d0.label.as_str()), (2, "triangle"));
        assert_eq!(d0.bbox, BBox::new(0.1, 0.1, 0.3, 0.3));
        assert_eq!(set.as_slice()[1].label, "unknown_8");
        assert!(set.iter().all(|d| d.score >= 0.5));
    }

    #[test]
    fn test_three_tensor_size_mismatch() {
        let out = RawOutput::new(vec![
            tensor(&[5], vec![1.; 5]),
            tensor(&[2], vec![0.9, 0.9]),
            tensor(&[2], vec![0., 0.]),
        ]);
        assert!(matches!(decoder(0.5).decode(out), Err(PipelineError::Decode(_))));
    }

    /// 11 = 4 + 1(objectness) + 6 类
    fn objectness_grid(anchors: usize) -> Array<f32, IxDyn> {
        let mut grid = Array::<f32, _>::zeros(IxDyn(&[1, 11, anchors]));
        // 锚点0: 类别2得分0.8, objectness 0.9 → 0.72
        // 锚点1: 类别0得分0.9, objectness 0.5 → 0.45
        // 锚点2: 得分足够但宽为0
        let cells: [(usize, [f32; 4], f32, usize, f32); 3] = [
            (0, [100., 100., 40., 20.], 0.9, 2, 0.8),
            (1, [200., 200., 30., 30.], 0.5, 0, 0.9),
            (2, [50., 50., 0., 30.], 1.0, 3, 0.99),
        ];
        for (a, xywh, obj, cls, score) in cells {
            for (c, v) in xywh.iter().enumerate() {
                grid[[0, c, a]] = *v;
            }
            grid[[0, 4, a]] = obj;
            grid[[0, 5 + cls, a]] = score;
        }
        grid
    }

    #[test]
    fn test_dense_grid_with_objectness() {
        let out = RawOutput::new(vec![objectness_grid(8400)]);
        let set = decoder(0.5).decode(out).unwrap();
        assert_eq!(set.len(), 1);
        let d = &set.as_slice()[0];
        assert_eq!(d.label, "triangle");
        assert!((d.score - 0.72).abs() < 1e-6);
        assert_eq!(d.bbox, BBox::new(80., 90., 120., 110.));

        // 阈值降到0.4 → 锚点1 (0.45) 也保留
        let set = decoder(0.4).decode(RawOutput::new(vec![objectness_grid(8400)])).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.iter().all(|d| d.score >= 0.4));
    }

    #[test]
    fn test_dense_grid_transposed() {
        let grid = objectness_grid(16);
        let transposed = grid
            .permuted_axes(IxDyn(&[0, 2, 1]))
            .as_standard_layout()
            .to_owned();
        assert_eq!(transposed.shape(), &[1, 16, 11]);
        let set = decoder(0.5).decode(RawOutput::new(vec![transposed])).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.as_slice()[0].bbox, BBox::new(80., 90., 120., 110.));
    }

    #[test]
    fn test_dense_grid_without_objectness() {
        let grid = dense_grid(&[
            vec![10., 60.],
            vec![10., 60.],
            vec![4., 8.],
            vec![4., 8.],
            vec![0.6, 0.1],
            vec![0.1, 0.2],
            vec![0.2, 0.3],
            vec![0.0, 0.1],
            vec![0.1, 0.1],
            vec![0.0, 0.1],
        ])
        .unwrap();
        let set = decoder(0.5).decode(RawOutput::new(vec![grid])).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.as_slice()[0].label, "left_square");
        assert!((set.as_slice()[0].score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_nms_on_dense_grid() {
        let grid = dense_grid(&[
            vec![50., 52., 300.],
            vec![50., 50., 300.],
            vec![20., 20., 20.],
            vec![20., 20., 20.],
            vec![0.9, 0.8, 0.7],
            vec![0.; 3],
            vec![0.; 3],
            vec![0.; 3],
            vec![0.; 3],
            vec![0.; 3],
        ])
        .unwrap();
        let dec = OutputDecoder::new(
            DecoderConfig {
                class_threshold: 0.5,
                nms_iou_threshold: Some(0.45),
            },
            LabelTable::default(),
        );
        let set = dec.decode(RawOutput::new(vec![grid])).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.as_slice()[0].score, 0.9);
        assert_eq!(set.as_slice()[1].score, 0.7);
    }

    #[test]
    fn test_unknown_layouts() {
        let dec = decoder(0.5);
        assert!(dec.decode(RawOutput::new(Vec::new())).is_err());
        assert!(dec
            .decode(RawOutput::new(vec![tensor(&[4, 4], vec![0.; 16])]))
            .is_err());
        assert!(dec
            .decode(RawOutput::new(vec![
                tensor(&[1, 10, 2], vec![0.; 20]),
                tensor(&[1], vec![0.])
            ]))
            .is_err());
        assert!(dec
            .decode(RawOutput::new(vec![tensor(&[1, 3, 2], vec![0.; 6])]))
            .is_err());
    }

    #[test]
    fn test_boxes_and_scores_without_classes_rejected() {
        let err = decoder(0.5)
            .decode(RawOutput::new(vec![
                tensor(&[1, 1, 4], vec![10., 10., 50., 50.]),
                tensor(&[1, 1], vec![0.9]),
            ]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn test_release_runs_on_error_path() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let out = RawOutput::new(vec![tensor(&[2, 2], vec![0.; 4])]).with_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(decoder(0.5).decode(out).is_err());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_nms_keeps_highest() {
        let det = |score: f32, x: f32| Detection {
            class_id: 0,
            label: "a".into(),
            score,
            bbox: BBox::new(x, 0., x + 10., 10.),
        };
        let mut xs = vec![det(0.5, 0.), det(0.9, 1.), det(0.7, 50.)];
        non_max_suppression(&mut xs, 0.5);
        let scores: Vec<f32> = xs.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }
}
