mod pfb;

pub use pfb::PfbParser;

/// 获取所有可用的解析器
pub fn get_all_parsers(load_threads: usize) -> Vec<Box<dyn crate::utils::parser::VoxelGridParser>> {
    vec![Box::new(PfbParser::new(load_threads))]
}
