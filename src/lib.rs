//! # HCM
//!
//! 多租户医院病例管理系统的门面crate，重新导出核心模块
//! 供演示程序和下游集成使用。

pub use hcm_activity;
pub use hcm_core;
pub use hcm_workflow;
