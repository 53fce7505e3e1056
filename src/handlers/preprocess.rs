use std::time::Instant;

use actix_web::{HttpResponse, Responder, get, post, web};
use pfb_backend::pfb::{PfbHeader, Topology};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::app_state::AppState;
use crate::handlers::{error_response, invalid_file_name};
use crate::task::{ChunkDescriptor, TaskData};

/// 查询参数与请求体共用，`file` 为资源目录下的文件名，例如 "press.init.pfb"
#[derive(Deserialize)]
pub struct PreprocessRequest {
    pub file: String,
}

#[derive(Serialize, Clone)]
pub struct PreprocessResponse {
    pub task_id: String,
    pub file: String,
    /// 处理该文件的解析器名称
    pub parser: &'static str,
    pub file_size: u64,
    pub shape: [usize; 3],
    pub header: PfbHeader,
    pub topology: Topology,
    pub data_length: usize,
    pub chunks: Vec<ChunkDescriptor>,
}

/// 例如: /voxel-grid?file=press.init.pfb
#[get("/voxel-grid")]
pub async fn get_voxel_grid(
    data: web::Data<AppState>,
    query: web::Query<PreprocessRequest>,
) -> impl Responder {
    match run_preprocess(data.get_ref(), &query.file) {
        Ok(resp) => HttpResponse::Ok().json(resp),
        Err(err) => err,
    }
}

#[post("/voxel-grid/preprocess")]
pub async fn preprocess_voxel_grid(
    data: web::Data<AppState>,
    payload: web::Json<PreprocessRequest>,
) -> impl Responder {
    match run_preprocess(data.get_ref(), &payload.file) {
        Ok(resp) => HttpResponse::Ok().json(resp),
        Err(err) => err,
    }
}

/// 预处理体素网格文件：快速创建任务并启动后台加载
///
/// ## 功能概述
/// 1. 读取文件头并扫描子网格头得到分块拓扑（不读取体素数据）
/// 2. 获取文件大小
/// 3. 每个子网格对应一个 chunk
/// 4. 创建任务存储（task_id）
/// 5. 启动后台任务多线程加载整个文件并按子网格切分
///
/// ## 参数
/// - `app_state`: 应用全局状态，包含解析器注册表、资源目录、任务存储等
/// - `file`: 资源目录下的文件名（如 "press.init.pfb"）
///
/// ## 返回
/// - `Ok(PreprocessResponse)`: 预处理成功，返回 task_id、文件头、拓扑、chunks 等信息
/// - `Err(HttpResponse)`: 预处理失败，返回相应的 HTTP 错误响应
pub fn run_preprocess(app_state: &AppState, file: &str) -> Result<PreprocessResponse, HttpResponse> {
    let Some(file_path) = app_state.resource_path(file) else {
        return Err(invalid_file_name(file));
    };

    // ==================== 步骤 1: 查找匹配的解析器 ====================
    let Some((parser, _)) = app_state.parser_registry.find_parser_for_file(&file_path) else {
        let supported = app_state.parser_registry.supported_extensions();
        return Err(HttpResponse::BadRequest().json(serde_json::json!({
            "error": "不支持的文件格式",
            "file": file,
            "supported_extensions": supported,
        })));
    };

    info!("[预处理] 使用 {} 处理 {}", parser.name(), file);

    // ==================== 步骤 2: 获取文件大小 ====================
    let file_size = match std::fs::metadata(&file_path) {
        Ok(metadata) => metadata.len(),
        Err(e) => {
            return Err(HttpResponse::NotFound().json(serde_json::json!({
                "error": "文件不存在或无法访问",
                "file": file,
                "details": e.to_string(),
            })));
        }
    };

    // ==================== 步骤 3: 读取文件头与分块布局 ====================
    let layout = parser
        .get_layout_from_file(&file_path)
        .map_err(|e| error_response("读取文件布局失败", file, &e))?;
    let shape = layout.shape();

    // ==================== 步骤 4: 创建任务存储 ====================
    let task_data = TaskData::new(shape, layout.chunks.clone(), file_path.clone());
    let task_id = app_state.task_store.insert(task_data);
    let Some(task) = app_state.task_store.get(&task_id) else {
        return Err(HttpResponse::InternalServerError().json(serde_json::json!({
            "error": "创建任务失败",
        })));
    };

    // ==================== 步骤 5: 后台加载并切分 ====================
    // 加载是阻塞 I/O，放到阻塞线程池里执行，不阻塞预处理响应
    let parser_registry = app_state.parser_registry.clone();
    let task_id_clone = task_id.clone();
    actix_web::rt::spawn(async move {
        let task_ref = task.clone();
        let joined = actix_web::rt::task::spawn_blocking(move || {
            let parse_start = Instant::now();
            let Some((parser, _)) = parser_registry.find_parser_for_file(&task_ref.file_path)
            else {
                return Err("找不到解析器".to_string());
            };
            let grid = parser
                .parse_from_file(&task_ref.file_path)
                .map_err(|e| e.to_string())?;
            let parse_duration = parse_start.elapsed();

            task_ref.fill_from_grid(&grid);
            Ok((parse_duration, parse_start.elapsed() - parse_duration))
        })
        .await;

        match joined {
            Ok(Ok((parse_duration, split_duration))) => info!(
                "[后台加载] 任务 {} 完成：加载 {}ms，切分 {} 个 chunk {}ms",
                task_id_clone,
                parse_duration.as_millis(),
                task.chunks.len(),
                split_duration.as_millis()
            ),
            Ok(Err(message)) => {
                error!("[后台加载] 任务 {} 失败: {}", task_id_clone, message);
                task.mark_failed(message);
            }
            Err(e) => {
                error!("[后台加载] 任务 {} 异常退出: {}", task_id_clone, e);
                task.mark_failed(e.to_string());
            }
        }
    });

    // ==================== 步骤 6: 构造并返回预处理响应 ====================
    Ok(PreprocessResponse {
        task_id,
        file: file.to_string(),
        parser: parser.name(),
        file_size,
        shape,
        header: layout.header,
        topology: layout.topology,
        data_length: shape.iter().product(),
        chunks: layout.chunks,
    })
}
