mod app_state;
mod config;
mod handlers;
mod parsers;
mod routes;
mod task;
mod utils;

use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::utils::parser_registry::ParserRegistry;
use app_state::AppState;
use config::Config;
use task::TaskStore;

/// 过期任务的清理间隔
const CLEANUP_INTERVAL_SECS: u64 = 5 * 60;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    // 初始化解析器注册表
    let parser_registry = Arc::new(ParserRegistry::new(config.load_threads));
    for ext in parser_registry.supported_extensions() {
        info!("已注册的解析器: .{}", ext);
    }

    let task_store = Arc::new(TaskStore::with_ttl(config.task_ttl()));
    let app_state = web::Data::new(AppState {
        parser_registry,
        resource_dir: config.resource_dir.clone(),
        task_store: task_store.clone(),
    });

    // 定期清理过期任务，避免长期占用内存
    let cleanup_store = task_store.clone();
    actix_web::rt::spawn(async move {
        let mut interval =
            actix_web::rt::time::interval(std::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let cleaned_count = cleanup_store.cleanup_expired();
            if cleaned_count > 0 {
                info!(
                    "[清理任务] 清理了 {} 个过期任务，当前剩余: {} 个任务",
                    cleaned_count,
                    cleanup_store.task_count()
                );
            }
        }
    });

    info!("服务器启动在 http://{}:{}", config.host, config.port);
    info!("资源目录: {}", config.resource_dir);
    info!("加载线程数: {}", config.load_threads);
    info!("任务 TTL: {} 分钟", task_store.default_ttl().as_secs() / 60);

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
