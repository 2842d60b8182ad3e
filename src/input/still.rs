// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 静态图片帧源 - 用于离线调试与测试

use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;

use super::frame::{DecodedFrame, FrameSource};

/// 反复输出同一张图片的帧源
pub struct StillFrameSource {
    frame: DecodedFrame,
    next_id: u64,
}

impl StillFrameSource {
    pub fn new(img: &DynamicImage) -> Self {
        Self {
            frame: DecodedFrame::from_rgba_image(img.to_rgba8(), 0),
            next_id: 0,
        }
    }

    /// 从图片文件加载
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let img = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Self::new(&img))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.frame.width, self.frame.height)
    }
}

impl FrameSource for StillFrameSource {
    fn current_frame(&mut self) -> Option<DecodedFrame> {
        let mut frame = self.frame.clone();
        frame.frame_id = self.next_id;
        self.next_id += 1;
        Some(frame)
    }
}
