// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测流水线 (Detection pipeline)
///
/// 单个 tick 内的数据流:
/// - Preprocessor:     帧 → 张量 + 缩放比例
/// - OutputDecoder:    原始输出 → DetectionSet (模型坐标)
/// - CoordinateMapper: 模型坐标 → 显示坐标
pub mod decoder;
pub mod mapper;
pub mod preprocess;
pub mod types;

pub use decoder::{non_max_suppression, DecoderConfig, OutputDecoder, OutputLayout};
pub use mapper::{CoordinateMapper, MapTarget, MapperConfig};
pub use preprocess::{Preprocessed, Preprocessor};
pub use types::{BBox, Detection, DetectionSet, LabelTable, DEFAULT_LABELS};
