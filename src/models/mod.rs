// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测器接口与模型输入描述
///
/// # 架构说明
///
/// 权重加载、推理后端选择 (WebGL/ORT/TensorRT 等) 都在本 crate 之外完成,
/// 调用方只需实现 [`Detector`] trait:
///
/// ```text
/// 预处理张量 → Detector::infer → RawOutput (一个或多个原始张量)
///                                      ↓
///                            OutputDecoder 解码为 DetectionSet
/// ```
///
/// [`ModelSpec`] 在会话启动时由检测器声明的输入形状推导一次,之后不再改变。
pub mod spec;
pub mod output;

pub use output::RawOutput;
pub use spec::{ModelSpec, TensorLayout};

use ndarray::{Array, IxDyn};

/// 统一的检测器接口
///
/// 所有推理后端都应实现此 trait
pub trait Detector: Send {
    /// 声明的输入形状 (例如 `[1, 640, 640, 3]` 或 `[1, 3, 320, 320]`)
    ///
    /// 动态维度用 `-1` 表示
    fn input_shape(&self) -> anyhow::Result<Vec<i64>>;

    /// 推理: 执行模型前向传播
    ///
    /// # Arguments
    /// * `xs` - 预处理后的张量, 形状符合 `ModelSpec`
    ///
    /// # Returns
    /// * `RawOutput` - 模型原始输出(未解码)
    fn infer(&mut self, xs: Array<f32, IxDyn>) -> anyhow::Result<RawOutput>;

    /// 后端名称,用于日志
    fn name(&self) -> &str {
        "detector"
    }
}
