pub mod chunk;
pub mod health;
pub mod point;
pub mod preprocess;

pub use chunk::get_voxel_chunk;
pub use health::hello;
pub use point::get_voxel_point;
pub use preprocess::{get_voxel_grid, preprocess_voxel_grid};

use actix_web::HttpResponse;
use pfb_backend::PfbError;
use tracing::warn;

/// 将引擎错误转换为 HTTP 响应
pub fn error_response(message: &str, file: &str, err: &PfbError) -> HttpResponse {
    warn!("{message}: {file}: {err}");
    let body = serde_json::json!({
        "error": message,
        "file": file,
        "details": err.to_string(),
    });
    match err {
        PfbError::Open { .. } => HttpResponse::NotFound().json(body),
        PfbError::InvalidArgument(_) => HttpResponse::BadRequest().json(body),
        _ => HttpResponse::InternalServerError().json(body),
    }
}

/// 文件名不是资源目录下的单个文件时的响应
pub fn invalid_file_name(file: &str) -> HttpResponse {
    warn!("拒绝非法文件名: {file}");
    HttpResponse::BadRequest().json(serde_json::json!({
        "error": "文件名只能是资源目录下的单个文件",
        "file": file,
    }))
}
