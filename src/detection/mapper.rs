// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 坐标映射: 模型坐标 → 显示坐标

use serde::{Deserialize, Serialize};

use super::types::{BBox, Detection, DetectionSet};

/// 映射参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// 四个坐标绝对值都不超过此值时视为归一化坐标
    pub normalized_tolerance: f32,
    /// 宽或高不大于此值的框丢弃
    pub min_box_px: f32,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            normalized_tolerance: 1.5,
            min_box_px: 5.0,
        }
    }
}

/// 目标显示区域及预处理比例
///
/// `x_ratio`/`y_ratio` 为每个显示像素对应的模型像素数 (见 Preprocessor)。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapTarget {
    pub dest_w: f32,
    pub dest_h: f32,
    pub x_ratio: f32,
    pub y_ratio: f32,
}

/// 坐标映射器 (纯函数, 无内部状态)
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateMapper {
    config: MapperConfig,
}

impl CoordinateMapper {
    pub fn new(config: MapperConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn is_normalized(&self, bbox: &BBox) -> bool {
        bbox.max_abs() <= self.config.normalized_tolerance
    }

    /// 映射单个框; 过小的框返回 `None`
    pub fn map_box(&self, bbox: &BBox, target: &MapTarget) -> Option<BBox> {
        let (x1, y1, x2, y2) = if self.is_normalized(bbox) {
            (
                bbox.x1 * target.dest_w,
                bbox.y1 * target.dest_h,
                bbox.x2 * target.dest_w,
                bbox.y2 * target.dest_h,
            )
        } else {
            (
                bbox.x1 / target.x_ratio,
                bbox.y1 / target.y_ratio,
                bbox.x2 / target.x_ratio,
                bbox.y2 / target.y_ratio,
            )
        };

        // 先排序再裁剪到显示区域
        let mapped = BBox::new(
            x1.min(x2).max(0.),
            y1.min(y2).max(0.),
            x1.max(x2).min(target.dest_w),
            y1.max(y2).min(target.dest_h),
        );

        if mapped.width() > self.config.min_box_px && mapped.height() > self.config.min_box_px {
            Some(mapped)
        } else {
            None
        }
    }

    /// 映射整个检测集合, 保持顺序
    pub fn map_set(&self, set: &DetectionSet, target: &MapTarget) -> DetectionSet {
        set.iter()
            .filter_map(|d| {
                self.map_box(&d.bbox, target).map(|bbox| Detection {
                    bbox,
                    ..d.clone()
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> MapTarget {
        // 640x480 帧, 补边到 640x640, 缩放到 320 → 0.5 模型像素/显示像素
        MapTarget {
            dest_w: 640.,
            dest_h: 480.,
            x_ratio: 0.5,
            y_ratio: 0.5,
        }
    }

    #[test]
    fn test_normalized_box() {
        let mapper = CoordinateMapper::default();
        let b = mapper.map_box(&BBox::new(0.1, 0.2, 0.5, 0.6), &target()).unwrap();
        assert!((b.x1 - 64.).abs() < 1e-3);
        assert!((b.y1 - 96.).abs() < 1e-3);
        assert!((b.x2 - 320.).abs() < 1e-3);
        assert!((b.y2 - 288.).abs() < 1e-3);
    }

    #[test]
    fn test_model_pixel_box() {
        let mapper = CoordinateMapper::default();
        let b = mapper.map_box(&BBox::new(10., 20., 110., 70.), &target()).unwrap();
        assert_eq!(b, BBox::new(20., 40., 220., 140.));
    }

    #[test]
    fn test_tolerance_boundary() {
        let mapper = CoordinateMapper::default();
        // 1.5 仍视为归一化, 1.51 视为像素
        assert!(mapper.is_normalized(&BBox::new(0., 0., 1.5, 1.5)));
        assert!(!mapper.is_normalized(&BBox::new(0., 0., 1.51, 1.)));
        assert!(mapper.is_normalized(&BBox::new(-1.2, 0., 1., 1.)));
    }

    #[test]
    fn test_clamp_and_reorder() {
        let mapper = CoordinateMapper::default();
        let b = mapper
            .map_box(&BBox::new(400., 300., -20., -10.), &target())
            .unwrap();
        assert_eq!(b, BBox::new(0., 0., 640., 480.));
    }

    #[test]
    fn test_small_boxes_dropped() {
        let mapper = CoordinateMapper::default();
        // 宽度正好 5px → 丢弃
        assert!(mapper.map_box(&BBox::new(10., 10., 12.5, 40.), &target()).is_none());
        assert!(mapper.map_box(&BBox::new(10., 10., 13., 40.), &target()).is_some());
        // 完全在显示区域外 → 裁剪后宽度为0
        assert!(mapper.map_box(&BBox::new(700., 10., 900., 40.), &target()).is_none());
    }

    #[test]
    fn test_map_set_is_pure() {
        let mapper = CoordinateMapper::new(MapperConfig {
            normalized_tolerance: 1.5,
            min_box_px: 1.,
        });
        let set = DetectionSet::new(vec![
            Detection {
                class_id: 2,
                label: "triangle".into(),
                score: 0.8,
                bbox: BBox::new(0.1, 0.1, 0.2, 0.2),
            },
            Detection {
                class_id: 3,
                label: "glass".into(),
                score: 0.9,
                bbox: BBox::new(0.1, 0.1, 0.1, 0.1),
            },
        ]);
        let a = mapper.map_set(&set, &target());
        let b = mapper.map_set(&set, &target());
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
        assert_eq!(a.as_slice()[0].label, "triangle");
    }
}
