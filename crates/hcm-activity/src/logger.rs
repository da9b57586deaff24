//! 活动事件发布器
//!
//! 发布是尽力而为的旁路通道：接收端失败只记录日志，
//! 绝不回滚触发事件的病例变更。

use crate::events::ActivityEvent;
use async_trait::async_trait;
use hcm_core::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 活动事件接收端
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn deliver(&self, event: &ActivityEvent) -> Result<()>;
}

/// 内存接收端，用于测试和演示
#[derive(Debug, Default)]
pub struct MemoryActivitySink {
    events: RwLock<Vec<ActivityEvent>>,
}

impl MemoryActivitySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已接收的全部事件
    pub async fn recorded(&self) -> Vec<ActivityEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl ActivitySink for MemoryActivitySink {
    async fn deliver(&self, event: &ActivityEvent) -> Result<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

/// 结构化日志接收端
///
/// 把事件写入 tracing 日志流，是服务进程的默认接收端。
#[derive(Debug, Default)]
pub struct TracingActivitySink;

#[async_trait]
impl ActivitySink for TracingActivitySink {
    async fn deliver(&self, event: &ActivityEvent) -> Result<()> {
        info!(
            event = event.event_type.as_str(),
            case_id = %event.case_id,
            user_id = %event.user_id,
            hospital_id = %event.hospital_id,
            "activity"
        );
        Ok(())
    }
}

/// 活动事件发布器
#[derive(Clone, Default)]
pub struct ActivityLogger {
    sinks: Arc<RwLock<Vec<Arc<dyn ActivitySink>>>>,
}

impl ActivityLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册接收端
    pub async fn register(&self, sink: Arc<dyn ActivitySink>) {
        self.sinks.write().await.push(sink);
    }

    /// 发布事件到所有接收端
    ///
    /// 单个接收端失败不影响其他接收端，也不向调用方传播。
    pub async fn emit(&self, event: ActivityEvent) {
        let sinks = self.sinks.read().await;
        debug!(
            "Emitting activity event {} for case {}",
            event.event_type.as_str(),
            event.case_id
        );

        for sink in sinks.iter() {
            if let Err(e) = sink.deliver(&event).await {
                warn!(
                    "Activity sink failed for event {} on case {}: {}",
                    event.event_type.as_str(),
                    event.case_id,
                    e
                );
            }
        }
    }
}
