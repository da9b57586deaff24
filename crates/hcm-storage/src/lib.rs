//! # HCM 文档存储模块
//!
//! 病例文档的内容寻址存储：本地文件系统与S3对象存储两种后端。
//! 工作流引擎只登记存储返回的路径，不接触文档字节。

pub mod storage;

pub use storage::{DocumentStorage, LocalDocumentStorage, S3DocumentStorage};
