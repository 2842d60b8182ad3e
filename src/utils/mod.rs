// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 工具模块
/// Utility modules
pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};
