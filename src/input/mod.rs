// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频输入 (Video Input)
///
/// 摄像头采集由外部负责,这里只定义帧结构与帧源接口
/// - DecodedFrame:     RGBA 帧数据
/// - FrameSource:      按需取帧
/// - StillFrameSource: 静态图片帧源 (离线调试)
pub mod frame;
pub mod still;

pub use frame::{DecodedFrame, FrameSource};
pub use still::StillFrameSource;
