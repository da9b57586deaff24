//! # HCM 管理模块
//!
//! 提供统一的配置管理功能，支持文件与环境变量叠加、验证和持久化。

pub mod config;

pub use config::{
    ConfigManager, DatabaseConfig, HcmConfig, LoggingConfig, ServerConfig, StorageConfig,
    WorkflowConfig,
};
