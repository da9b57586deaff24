//! # HCM 活动日志模块
//!
//! 工作流引擎对外发布的结构化活动事件，包括：
//! - 事件类型与事件信封定义
//! - 事件接收端抽象与内存实现
//! - 尽力而为的事件发布器（发布失败不影响主操作）

pub mod events;
pub mod logger;

pub use events::{ActivityEvent, ActivityEventType};
pub use logger::{ActivityLogger, ActivitySink, MemoryActivitySink, TracingActivitySink};
