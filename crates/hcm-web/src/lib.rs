//! # HCM Web模块
//!
//! 病例管理的HTTP层：操作者身份提取、请求处理器和路由装配。
//! 认证本身由上游中间层完成，这里只消费解析好的身份三元组。

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::{acting_user_middleware, ApiError};
pub use server::{AppState, WebServer};
