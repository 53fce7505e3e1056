use pfb_backend::Result;
use pfb_backend::VoxelGrid;
use pfb_backend::pfb::{PfbHeader, Topology};

use crate::task::ChunkDescriptor;

/// 文件的元数据与分块布局（不含体素数据）
#[derive(Debug, Clone)]
pub struct GridLayout {
    pub header: PfbHeader,
    pub topology: Topology,
    /// 每个子网格对应一个 chunk，按文件中的顺序排列
    pub chunks: Vec<ChunkDescriptor>,
}

impl GridLayout {
    pub fn shape(&self) -> [usize; 3] {
        [self.header.nx, self.header.ny, self.header.nz]
    }
}

/// 体素网格解析器 trait
/// 不同文件格式需要实现这个 trait
pub trait VoxelGridParser: Send + Sync {
    /// 获取支持的文件扩展名（不含点号），例如: "pfb"
    fn supported_extensions(&self) -> Vec<&'static str>;

    /// 检查文件扩展名是否被支持
    fn supports(&self, extension: &str) -> bool {
        self.supported_extensions()
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }

    /// 从文件路径解析完整的体素网格数据
    fn parse_from_file(&self, file_path: &str) -> Result<VoxelGrid>;

    /// 快速获取文件的元数据与分块布局（不读取体素数据）
    /// 用于预处理阶段快速返回基本信息
    fn get_layout_from_file(&self, file_path: &str) -> Result<GridLayout>;

    /// 直接从文件读取单个点
    fn read_point(&self, file_path: &str, point: [usize; 3]) -> Result<f64>;

    /// 获取解析器名称（用于日志和错误信息）
    fn name(&self) -> &'static str;
}
