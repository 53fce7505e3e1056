use actix_web::{HttpResponse, Responder, get, web};
use serde::Deserialize;

use crate::app_state::AppState;
use crate::handlers::{error_response, invalid_file_name};

#[derive(Deserialize)]
pub struct PointQuery {
    pub file: String,
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

/// 直接从文件读取单个点，不加载整个网格
/// 例如: /voxel-grid/point?file=press.init.pfb&x=1&y=2&z=3
#[get("/voxel-grid/point")]
pub async fn get_voxel_point(
    data: web::Data<AppState>,
    query: web::Query<PointQuery>,
) -> impl Responder {
    let Some(file_path) = data.resource_path(&query.file) else {
        return invalid_file_name(&query.file);
    };
    let Some((parser, _)) = data.parser_registry.find_parser_for_file(&file_path) else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "不支持的文件格式",
            "file": query.file,
            "supported_extensions": data.parser_registry.supported_extensions(),
        }));
    };

    let point = [query.x, query.y, query.z];
    match parser.read_point(&file_path, point) {
        Ok(value) => HttpResponse::Ok().json(serde_json::json!({
            "file": query.file,
            "point": point,
            "value": value,
        })),
        Err(e) => error_response("读取数据点失败", &query.file, &e),
    }
}
