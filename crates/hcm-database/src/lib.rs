//! # HCM 数据库模块
//!
//! 基于 PostgreSQL 的持久化层：表结构、行模型、查询操作，
//! 以及 CaseStore 的事务性实现。

pub mod connection;
pub mod models;
pub mod queries;
pub mod store;

pub use connection::DatabasePool;
pub use queries::DatabaseQueries;
pub use store::PgStore;
