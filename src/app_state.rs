use std::sync::Arc;

use crate::task::TaskStore;
use crate::utils::parser_registry::ParserRegistry;

/// 全局应用状态，负责在各个 handler 之间共享解析器、资源目录与任务存储
pub struct AppState {
    pub parser_registry: Arc<ParserRegistry>,
    pub resource_dir: String,
    pub task_store: Arc<TaskStore>,
}

impl AppState {
    /// 资源目录下的文件路径
    ///
    /// 文件名只能是资源目录下的单个文件名，含路径分隔符或为 `.`/`..` 时返回 None。
    pub fn resource_path(&self, file: &str) -> Option<String> {
        if file.is_empty() || file == "." || file == ".." || file.contains(['/', '\\']) {
            return None;
        }
        Some(format!("{}/{}", self.resource_dir, file))
    }
}
