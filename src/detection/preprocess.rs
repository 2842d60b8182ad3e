// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 预处理: RGBA帧 → 方形补边 → 双线性缩放 → 归一化张量

use fast_image_resize as fr;
use ndarray::{Array, Axis, IxDyn};
use tracing::debug;

use crate::error::PipelineError;
use crate::input::DecodedFrame;
use crate::models::{ModelSpec, TensorLayout};

/// 预处理结果
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub tensor: Array<f32, IxDyn>,
    /// 模型像素 / 帧像素 (水平)
    pub x_ratio: f32,
    /// 模型像素 / 帧像素 (垂直)
    pub y_ratio: f32,
}

/// 预处理器
///
/// 补边画布、目标图像和缩放器跨帧复用, 只在帧尺寸或输入尺寸变化时重新分配。
pub struct Preprocessor {
    spec: ModelSpec,
    canvas: fr::images::Image<'static>,
    dst: fr::images::Image<'static>,
    resizer: fr::Resizer,
    options: fr::ResizeOptions,
}

impl Preprocessor {
    pub fn new(spec: ModelSpec) -> Self {
        Self {
            spec,
            canvas: fr::images::Image::new(1, 1, fr::PixelType::U8x3),
            dst: fr::images::Image::new(spec.input_width, spec.input_height, fr::PixelType::U8x3),
            resizer: fr::Resizer::new(),
            options: fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        }
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn run(&mut self, frame: &DecodedFrame) -> Result<Preprocessed, PipelineError> {
        if !frame.is_ready() {
            return Err(PipelineError::Readiness(format!(
                "frame {} is {}x{} with {} bytes",
                frame.frame_id,
                frame.width,
                frame.height,
                frame.rgba_data.len()
            )));
        }

        // 1. 左上角对齐补边到 max(w,h) 方形画布, 右侧/下侧填黑
        let side = frame.width.max(frame.height);
        if self.canvas.width() != side {
            debug!("🧩 预处理画布重新分配: {}x{}", side, side);
            self.canvas = fr::images::Image::new(side, side, fr::PixelType::U8x3);
        }
        let (w, side_us) = (frame.width as usize, side as usize);
        let canvas = self.canvas.buffer_mut();
        canvas.fill(0);
        for (y, row) in frame
            .rgba_data
            .chunks_exact(w * 4)
            .take(frame.height as usize)
            .enumerate()
        {
            let offset = y * side_us * 3;
            let dst_row = &mut canvas[offset..offset + w * 3];
            for (dst, src) in dst_row.chunks_exact_mut(3).zip(row.chunks_exact(4)) {
                dst.copy_from_slice(&src[..3]); // 跳过 Alpha 通道
            }
        }

        // 2. 双线性缩放到模型输入尺寸
        if self.dst.width() != self.spec.input_width || self.dst.height() != self.spec.input_height {
            self.dst = fr::images::Image::new(
                self.spec.input_width,
                self.spec.input_height,
                fr::PixelType::U8x3,
            );
        }
        self.resizer
            .resize(&self.canvas, &mut self.dst, &self.options)
            .map_err(|e| PipelineError::Readiness(format!("resize failed: {}", e)))?;

        // 3. 归一化到 [0,1], 按布局转置, 按需增加 batch 维
        let (h, w) = (self.spec.input_height as usize, self.spec.input_width as usize);
        let data: Vec<f32> = self.dst.buffer().iter().map(|&v| v as f32 / 255.0).collect();
        let hwc = Array::from_shape_vec((h, w, 3), data)
            .map_err(|e| PipelineError::Readiness(e.to_string()))?;
        let mut tensor = match self.spec.layout {
            TensorLayout::ChannelsLast => hwc.into_dyn(),
            TensorLayout::ChannelsFirst => hwc
                .permuted_axes([2, 0, 1])
                .as_standard_layout()
                .into_owned()
                .into_dyn(),
        };
        if self.spec.batched {
            tensor = tensor.insert_axis(Axis(0));
        }

        Ok(Preprocessed {
            tensor,
            x_ratio: self.spec.input_width as f32 / side as f32,
            y_ratio: self.spec.input_height as f32 / side as f32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> DecodedFrame {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        DecodedFrame::new(data, width, height, 0)
    }

    fn spec(shape: &[i64]) -> ModelSpec {
        ModelSpec::from_input_shape(shape, 320)
    }

    #[test]
    fn test_shape_and_ratios() {
        let mut pre = Preprocessor::new(spec(&[1, 3, 320, 320]));
        let out = pre.run(&solid_frame(640, 480, [255, 255, 255])).unwrap();
        assert_eq!(out.tensor.shape(), &[1, 3, 320, 320]);
        assert_eq!(out.x_ratio, 0.5);
        assert_eq!(out.y_ratio, 0.5);
    }

    #[test]
    fn test_bottom_padding_is_black() {
        let mut pre = Preprocessor::new(spec(&[1, 64, 64, 3]));
        let out = pre.run(&solid_frame(64, 32, [255, 0, 0])).unwrap();
        assert_eq!(out.tensor.shape(), &[1, 64, 64, 3]);
        // 上半部分为红色, 下半部分为补边
        assert!((out.tensor[[0, 4, 10, 0]] - 1.0).abs() < 1e-3);
        assert!(out.tensor[[0, 4, 10, 1]].abs() < 1e-3);
        assert!(out.tensor[[0, 60, 10, 0]].abs() < 1e-3);
        assert!(out.tensor.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_unbatched_channels_first() {
        let mut pre = Preprocessor::new(spec(&[3, 32, 48]));
        let out = pre.run(&solid_frame(100, 50, [0, 255, 0])).unwrap();
        assert_eq!(out.tensor.shape(), &[3, 32, 48]);
        assert!((out.x_ratio - 0.48).abs() < 1e-6);
        assert!((out.y_ratio - 0.32).abs() < 1e-6);
        assert!((out.tensor[[1, 2, 2]] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_buffers_reused_across_sizes() {
        let mut pre = Preprocessor::new(spec(&[1, 32, 32, 3]));
        assert!(pre.run(&solid_frame(40, 20, [9, 9, 9])).is_ok());
        assert!(pre.run(&solid_frame(20, 60, [9, 9, 9])).is_ok());
        let out = pre.run(&solid_frame(20, 60, [9, 9, 9])).unwrap();
        assert!((out.y_ratio - 32. / 60.).abs() < 1e-6);
    }

    #[test]
    fn test_not_ready() {
        let mut pre = Preprocessor::new(spec(&[1, 32, 32, 3]));
        let err = pre.run(&DecodedFrame::new(Vec::new(), 0, 0, 3)).unwrap_err();
        assert!(matches!(err, PipelineError::Readiness(_)));
        let short = DecodedFrame::new(vec![0; 10], 4, 4, 4);
        assert!(pre.run(&short).is_err());
    }
}
