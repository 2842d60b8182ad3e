// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 模型输入描述: 由检测器声明的输入形状推导

/// 输入张量通道排布
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// NCHW / CHW
    ChannelsFirst,
    /// NHWC / HWC
    ChannelsLast,
}

/// 模型输入规格 (会话内不可变)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub input_height: u32,
    pub input_width: u32,
    pub layout: TensorLayout,
    pub batched: bool,
}

impl ModelSpec {
    /// 从声明的输入形状推导
    ///
    /// - 秩4: `[N,3,H,W]` 且最后一维不是3 → 通道优先, 否则 `[N,H,W,C]`
    /// - 秩3: `[3,H,W]` 同理, 无 batch 维
    /// - 其他秩, 或高宽为动态维 (<=0) → 回退到 `default_size` 方形 NHWC
    pub fn from_input_shape(shape: &[i64], default_size: u32) -> Self {
        let fallback = Self {
            input_height: default_size,
            input_width: default_size,
            layout: TensorLayout::ChannelsLast,
            batched: true,
        };

        let (dims, batched) = match shape.len() {
            4 => (&shape[1..], true),
            3 => (shape, false),
            _ => return fallback,
        };

        let channels_first = dims[0] == 3 && dims[2] != 3;
        let (h, w) = if channels_first {
            (dims[1], dims[2])
        } else {
            (dims[0], dims[1])
        };
        if h <= 0 || w <= 0 {
            return Self { batched, ..fallback };
        }

        Self {
            input_height: h as u32,
            input_width: w as u32,
            layout: if channels_first {
                TensorLayout::ChannelsFirst
            } else {
                TensorLayout::ChannelsLast
            },
            batched,
        }
    }

    /// 预处理输出张量的形状
    pub fn tensor_shape(&self) -> Vec<usize> {
        let (h, w) = (self.input_height as usize, self.input_width as usize);
        let mut shape = match self.layout {
            TensorLayout::ChannelsFirst => vec![3, h, w],
            TensorLayout::ChannelsLast => vec![h, w, 3],
        };
        if self.batched {
            shape.insert(0, 1);
        }
        shape
    }
}
