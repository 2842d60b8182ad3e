// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 帧与帧源 (Frames and frame sources)

use std::sync::Arc;

/// 已解码帧 (帧源 → 检测流水线)
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    pub rgba_data: Arc<Vec<u8>>, // 使用Arc共享数据,避免复制
    pub width: u32,
    pub height: u32,
    pub frame_id: u64, // 帧序号
}

impl DecodedFrame {
    pub fn new(rgba_data: Vec<u8>, width: u32, height: u32, frame_id: u64) -> Self {
        Self {
            rgba_data: Arc::new(rgba_data),
            width,
            height,
            frame_id,
        }
    }

    /// 从 RGBA 图像构建
    pub fn from_rgba_image(img: image::RgbaImage, frame_id: u64) -> Self {
        let (width, height) = img.dimensions();
        Self::new(img.into_raw(), width, height, frame_id)
    }

    /// 宽高均为正且缓冲区完整
    pub fn is_ready(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.rgba_data.len() >= self.width as usize * self.height as usize * 4
    }
}

/// 帧源: 按需提供当前帧
///
/// 摄像头采集、设备切换都在帧源外部完成,这里只负责交出最新一帧。
pub trait FrameSource: Send {
    /// 当前帧; 视频尚未就绪时返回 `None`
    fn current_frame(&mut self) -> Option<DecodedFrame>;
}

impl<F> FrameSource for F
where
    F: FnMut() -> Option<DecodedFrame> + Send,
{
    fn current_frame(&mut self) -> Option<DecodedFrame> {
        self()
    }
}
