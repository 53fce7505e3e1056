use actix_web::{HttpResponse, Responder, get, http::header::ContentType, web};
use byteorder::{ByteOrder, LittleEndian};
use serde::Deserialize;

use crate::app_state::AppState;

#[derive(Deserialize)]
pub struct ChunkQuery {
    pub task_id: String,
    pub chunk_index: usize,
}

fn format_triple([a, b, c]: [usize; 3]) -> String {
    format!("{a},{b},{c}")
}

/// 获取预处理任务中的一个子网格，返回小端 f64 字节流
/// 每个 chunk 只能被请求一次，请求后立即释放
#[get("/voxel-grid/chunk")]
pub async fn get_voxel_chunk(
    data: web::Data<AppState>,
    query: web::Query<ChunkQuery>,
) -> impl Responder {
    let Some(task) = data.task_store.get(&query.task_id) else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "无效的 task_id",
            "task_id": query.task_id,
        }));
    };

    let Some(descriptor) = task.chunks.get(query.chunk_index) else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "无效的 chunk_index",
            "chunk_index": query.chunk_index,
        }));
    };

    if let Some(failure) = task.failure() {
        return HttpResponse::InternalServerError().json(serde_json::json!({
            "error": "后台加载失败",
            "task_id": query.task_id,
            "details": failure,
            "status": "failed",
        }));
    }

    // 检查 chunk 是否已就绪（后台解析是否完成）
    if !task.is_chunk_ready(query.chunk_index) {
        // 已被请求过的 chunk 不再有占位
        if !task.chunk_data.read().contains_key(&query.chunk_index) {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "chunk 已被请求或不存在",
                "task_id": query.task_id,
                "chunk_index": query.chunk_index,
            }));
        }
        return HttpResponse::Accepted().json(serde_json::json!({
            "error": "chunk 正在解析中，请稍后重试",
            "task_id": query.task_id,
            "chunk_index": query.chunk_index,
            "status": "processing",
        }));
    }

    // 获取并移除 chunk 数据（请求后立即释放内存）
    let Some(chunk_values) = task.take_chunk(query.chunk_index) else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "chunk 已被请求或不存在",
            "task_id": query.task_id,
            "chunk_index": query.chunk_index,
        }));
    };

    let mut bytes = vec![0u8; chunk_values.len() * std::mem::size_of::<f64>()];
    LittleEndian::write_f64_into(&chunk_values, &mut bytes);

    HttpResponse::Ok()
        .content_type(ContentType::octet_stream())
        .append_header(("X-Chunk-Index", descriptor.index.to_string()))
        .append_header(("X-Chunk-Start", format_triple(descriptor.start)))
        .append_header(("X-Chunk-Extent", format_triple(descriptor.extent)))
        .append_header(("X-Chunk-Length", chunk_values.len().to_string()))
        .append_header(("X-Chunk-Task", query.task_id.clone()))
        .append_header(("X-Grid-Shape", format_triple(task.shape)))
        .append_header(("X-Chunks-Remaining", task.remaining_chunk_count().to_string()))
        .body(bytes)
}
