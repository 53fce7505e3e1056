use actix_web::{HttpResponse, Responder, get, web};

use crate::app_state::AppState;

/// 根路径健康检查/服务说明
#[get("/")]
pub async fn hello(data: web::Data<AppState>) -> impl Responder {
    let supported = data.parser_registry.supported_extensions();
    HttpResponse::Ok().json(serde_json::json!({
        "message": "PFB 体素网格数据服务",
        "endpoints": [
            "GET /voxel-grid?file=<filename>",
            "POST /voxel-grid/preprocess",
            "GET /voxel-grid/chunk?task_id=<id>&chunk_index=<index>",
            "GET /voxel-grid/point?file=<filename>&x=<x>&y=<y>&z=<z>",
        ],
        "supported_extensions": supported,
        "resource_dir": data.resource_dir,
        "active_tasks": data.task_store.task_count(),
    }))
}
