use std::time::Duration;

use clap::Parser;

/// 服务配置，可通过命令行参数或环境变量设置
#[derive(Debug, Clone, Parser)]
#[command(name = "pfb-backend", about = "PFB 体素网格数据服务", long_about = None)]
pub struct Config {
    /// 资源目录，请求中的文件名相对于该目录
    #[arg(long, env = "PFB_RESOURCE_DIR", default_value = "test/resource")]
    pub resource_dir: String,

    #[arg(long, env = "PFB_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "PFB_PORT", default_value_t = 8080)]
    pub port: u16,

    /// 全量加载时的线程数
    #[arg(long, env = "PFB_LOAD_THREADS", default_value_t = 4)]
    pub load_threads: usize,

    /// 任务过期时间（分钟）
    #[arg(long, env = "PFB_TASK_TTL_MINUTES", default_value_t = 30)]
    pub task_ttl_minutes: u64,
}

impl Config {
    pub fn task_ttl(&self) -> Duration {
        Duration::from_secs(self.task_ttl_minutes * 60)
    }
}
