// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测数据结构定义
/// Data structures for the detection pipeline
use serde::{Deserialize, Serialize};

// ========== 公共常量 ==========

/// 默认类别表 (必须与模型训练时的类别顺序一致)
pub const DEFAULT_LABELS: [&str; 6] = [
    "left_square",
    "right_square",
    "triangle",
    "glass",
    "left_circle",
    "right_circle",
];

// ========== 数据结构 ==========

/// 检测框 (角点形式, 坐标空间由所处阶段决定: 模型像素/归一化/显示像素)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// 中心点形式 → 角点形式
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.,
            y1: cy - h / 2.,
            x2: cx + w / 2.,
            y2: cy + h / 2.,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.) * self.height().max(0.)
    }

    /// 四个坐标绝对值的最大值
    pub fn max_abs(&self) -> f32 {
        self.x1
            .abs()
            .max(self.y1.abs())
            .max(self.x2.abs())
            .max(self.y2.abs())
    }

    pub fn intersection_area(&self, another: &BBox) -> f32 {
        let l = self.x1.max(another.x1);
        let r = self.x2.min(another.x2);
        let t = self.y1.max(another.y1);
        let b = self.y2.min(another.y2);
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn iou(&self, another: &BBox) -> f32 {
        let union = self.area() + another.area() - self.intersection_area(another);
        if union <= 0. {
            return 0.;
        }
        self.intersection_area(another) / union
    }
}

/// 单个检测结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    pub score: f32,
    pub bbox: BBox,
}

/// 一次解码得到的检测集合 (有序, 可为空)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionSet(Vec<Detection>);

impl DetectionSet {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self(detections)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Detection> {
        self.0
    }

    /// 指定标签的最高分检测
    pub fn best(&self, label: &str) -> Option<&Detection> {
        self.0
            .iter()
            .filter(|d| d.label == label)
            .reduce(|max, d| if d.score > max.score { d } else { max })
    }

    /// 最高分
    pub fn max_score(&self) -> f32 {
        self.0.iter().map(|d| d.score).fold(0.0, f32::max)
    }

    /// `label(87%)` 形式的摘要
    pub fn summary(&self) -> String {
        self.0
            .iter()
            .map(|d| format!("{}({}%)", d.label, (d.score * 100.).round() as i32))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromIterator<Detection> for DetectionSet {
    fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// 类别表: class_id → 标签
///
/// 类别表独立于模型文件维护, 模型重新训练后类别顺序变化会导致标签错位;
/// 表外的 id 一律标为 `unknown_<id>`, 不做取模映射。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn label(&self, class_id: usize) -> String {
        match self.names.get(class_id) {
            Some(name) => name.clone(),
            None => format!("unknown_{}", class_id),
        }
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::new(DEFAULT_LABELS.iter().map(|s| s.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, score: f32) -> Detection {
        Detection {
            class_id: 0,
            label: label.to_string(),
            score,
            bbox: BBox::new(0., 0., 10., 10.),
        }
    }

    #[test]
    fn test_cxcywh() {
        let b = BBox::from_cxcywh(50., 40., 20., 10.);
        assert_eq!(b, BBox::new(40., 35., 60., 45.));
        assert_eq!(b.width(), 20.);
        assert_eq!(b.height(), 10.);
    }

    #[test]
    fn test_iou() {
        let a = BBox::new(0., 0., 10., 10.);
        let b = BBox::new(5., 0., 15., 10.);
        assert!((a.iou(&b) - 50. / 150.).abs() < 1e-6);
        assert_eq!(a.iou(&BBox::new(20., 20., 30., 30.)), 0.);
    }

    #[test]
    fn test_labels() {
        let table = LabelTable::default();
        assert_eq!(table.len(), 6);
        assert_eq!(table.label(2), "triangle");
        assert_eq!(table.label(9), "unknown_9");
    }

    #[test]
    fn test_best_and_summary() {
        let set = DetectionSet::new(vec![det("triangle", 0.6), det("triangle", 0.9), det("glass", 0.7)]);
        assert_eq!(set.best("triangle").unwrap().score, 0.9);
        assert!(set.best("left_square").is_none());
        assert_eq!(set.max_score(), 0.9);
        assert_eq!(set.summary(), "triangle(60%), triangle(90%), glass(70%)");
    }
}
