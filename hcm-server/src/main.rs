//! HCM服务器主程序

use clap::Parser;
use hcm_activity::{ActivityLogger, TracingActivitySink};
use hcm_admin::config::StorageBackend;
use hcm_admin::ConfigManager;
use hcm_database::{DatabasePool, DatabaseQueries, PgStore};
use hcm_storage::{DocumentStorage, LocalDocumentStorage, S3DocumentStorage};
use hcm_web::{AppState, WebServer};
use hcm_workflow::CaseWorkflowEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// HCM服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "hcm-server")]
#[command(about = "HCM (Hospital Case Management) 病例管理服务器")]
struct Args {
    /// 服务器端口（覆盖配置文件）
    #[arg(short, long)]
    port: Option<u16>,

    /// 配置文件路径
    #[arg(short, long, default_value = "config/hcm")]
    config: String,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    info!("启动HCM服务器...");

    // 加载配置
    let config_manager = ConfigManager::new(&args.config)?;
    let config = config_manager.get_config().await;

    info!("HCM服务器配置:");
    info!("  服务名称: {}", config.server.name);
    info!("  监听地址: {}:{}", config.server.host, config.server.port);
    info!("  数据库最大连接数: {}", config.database.max_connections);

    // 数据库连接与建表
    let pool = DatabasePool::connect(
        &config.database.connection_string,
        config.database.max_connections,
    )
    .await?;

    if config.database.auto_migrate {
        DatabaseQueries::new(&pool).create_tables().await?;
    }

    // 文档存储后端
    let storage: Arc<dyn DocumentStorage> = match config.storage.backend {
        StorageBackend::Local => {
            let root = config
                .storage
                .local_root
                .clone()
                .unwrap_or_else(|| "./data/documents".to_string());
            Arc::new(LocalDocumentStorage::new(&root))
        }
        StorageBackend::S3 => {
            let bucket = config
                .storage
                .s3_bucket
                .clone()
                .ok_or_else(|| anyhow::anyhow!("S3 storage requires a bucket name"))?;
            let region = config
                .storage
                .s3_region
                .clone()
                .unwrap_or_else(|| "us-east-1".to_string());
            Arc::new(S3DocumentStorage::new(&bucket, &region)?)
        }
    };

    // 活动事件发布到结构化日志
    let activity = ActivityLogger::new();
    activity.register(Arc::new(TracingActivitySink)).await;

    // 工作流引擎
    let store = Arc::new(PgStore::new(pool));
    let engine = Arc::new(CaseWorkflowEngine::new(store, activity));

    // 启动HTTP服务
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", config.server.host, port).parse()?;

    let state = AppState { engine, storage };
    let server = WebServer::new(addr, state, config.server.enable_cors);
    server.serve().await?;

    Ok(())
}
