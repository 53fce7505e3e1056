use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use pfb_backend::VoxelGrid;
use serde::Serialize;
use uuid::Uuid;

/// 一个 chunk 对应文件中的一个子网格
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkDescriptor {
    /// 子网格在文件中的顺序
    pub index: usize,
    /// 子网格起点 [x, y, z]（点索引）
    pub start: [usize; 3],
    /// 子网格大小 [nx, ny, nz]
    pub extent: [usize; 3],
}

impl ChunkDescriptor {
    /// chunk 中的元素个数
    pub fn element_count(&self) -> usize {
        self.extent[0] * self.extent[1] * self.extent[2]
    }

    /// 从完整网格中复制出该子网格的数据，x 最快
    pub fn extract(&self, grid: &VoxelGrid) -> Vec<f64> {
        let [nx, ny, _] = grid.shape;
        let [sx, sy, sz] = self.start;
        let [ex, ey, ez] = self.extent;
        let mut values = Vec::with_capacity(self.element_count());
        for z in sz..sz + ez {
            for y in sy..sy + ey {
                let row = z * nx * ny + y * nx + sx;
                values.extend_from_slice(&grid.data[row..row + ex]);
            }
        }
        values
    }
}

/// 任务数据，存储分块的体素网格数据
/// 使用 HashMap 独立存储每个 chunk，允许单独释放
pub struct TaskData {
    /// 网格维度 [nx, ny, nz]
    pub shape: [usize; 3],
    /// 分块描述列表
    pub chunks: Vec<ChunkDescriptor>,
    /// 每个 chunk 的数据，key 是 chunk_index
    /// 当 chunk 被请求后，对应的数据会被移除以释放内存
    /// None 表示 chunk 正在解析中，Some(Vec) 表示已就绪
    pub chunk_data: RwLock<HashMap<usize, Option<Vec<f64>>>>,
    /// 后台解析失败时的错误信息
    pub failure: RwLock<Option<String>>,
    /// 任务创建时间，用于 TTL 过期检查
    pub created_at: Instant,
    /// 文件路径，用于后台解析
    pub file_path: String,
}

impl TaskData {
    /// 创建新的 TaskData（预处理阶段，chunk 尚未解析）
    pub fn new(shape: [usize; 3], chunks: Vec<ChunkDescriptor>, file_path: String) -> Self {
        let mut chunk_data = HashMap::new();
        // 初始化所有 chunk 为 None（表示正在解析中）
        for descriptor in &chunks {
            chunk_data.insert(descriptor.index, None);
        }

        Self {
            shape,
            chunks,
            chunk_data: RwLock::new(chunk_data),
            failure: RwLock::new(None),
            created_at: Instant::now(),
            file_path,
        }
    }

    /// 设置指定 chunk 的数据（后台解析完成后调用）
    pub fn set_chunk(&self, chunk_index: usize, data: Vec<f64>) {
        self.chunk_data.write().insert(chunk_index, Some(data));
    }

    /// 将完整网格按 chunk 描述切分后全部存入
    pub fn fill_from_grid(&self, grid: &VoxelGrid) {
        for descriptor in &self.chunks {
            self.set_chunk(descriptor.index, descriptor.extract(grid));
        }
    }

    /// 记录后台解析失败
    pub fn mark_failed(&self, message: String) {
        *self.failure.write() = Some(message);
    }

    pub fn failure(&self) -> Option<String> {
        self.failure.read().clone()
    }

    /// 获取并移除指定 chunk 的数据（用于请求后释放内存）
    /// 返回 None 如果：
    /// - chunk 不存在
    /// - chunk 正在解析中（还未就绪）
    /// - chunk 已被请求
    pub fn take_chunk(&self, chunk_index: usize) -> Option<Vec<f64>> {
        let mut chunk_data = self.chunk_data.write();
        // 尚未就绪的 chunk 保留占位，不能被移除
        match chunk_data.get(&chunk_index) {
            Some(Some(_)) => chunk_data.remove(&chunk_index).flatten(),
            _ => None,
        }
    }

    /// 检查指定 chunk 是否已就绪
    pub fn is_chunk_ready(&self, chunk_index: usize) -> bool {
        self.chunk_data
            .read()
            .get(&chunk_index)
            .map(|opt| opt.is_some())
            .unwrap_or(false)
    }

    /// 获取剩余的 chunk 数量
    pub fn remaining_chunk_count(&self) -> usize {
        self.chunk_data.read().len()
    }
}

pub struct TaskStore {
    tasks: RwLock<HashMap<String, Arc<TaskData>>>,
    /// TTL（Time-To-Live）过期时间
    default_ttl: Duration,
}

impl TaskStore {
    /// 创建带自定义 TTL 的 TaskStore
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            default_ttl: ttl,
        }
    }

    pub fn insert(&self, data: TaskData) -> String {
        let task_id = Uuid::new_v4().to_string();
        self.tasks.write().insert(task_id.clone(), Arc::new(data));
        task_id
    }

    pub fn get(&self, task_id: &str) -> Option<Arc<TaskData>> {
        self.tasks.read().get(task_id).cloned()
    }

    /// 清理过期的任务
    /// 返回清理的任务数量
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut tasks = self.tasks.write();
        let before_count = tasks.len();

        tasks.retain(|_, task| {
            // 保留未过期的任务
            now.duration_since(task.created_at) < self.default_ttl
        });

        before_count - tasks.len()
    }

    /// 获取当前任务数量
    pub fn task_count(&self) -> usize {
        self.tasks.read().len()
    }

    /// 获取默认 TTL
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}
