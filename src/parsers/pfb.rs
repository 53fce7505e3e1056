use pfb_backend::pfb::PfbDataset;
use pfb_backend::{Result, VoxelGrid};

use crate::task::ChunkDescriptor;
use crate::utils::parser::{GridLayout, VoxelGridParser};

/// ParFlow 二进制文件（.pfb）解析器
pub struct PfbParser {
    /// 全量加载时的线程数，至少为 1
    load_threads: usize,
}

impl PfbParser {
    pub fn new(load_threads: usize) -> Self {
        PfbParser {
            load_threads: load_threads.max(1),
        }
    }

    /// 打开文件并读取文件头与分块拓扑，并确认文件长度与文件头一致
    fn open(&self, file_path: &str) -> Result<PfbDataset<'static>> {
        let mut dataset = PfbDataset::with_path(file_path);
        dataset.load_header()?;
        dataset.load_pqr()?;
        dataset.verify_file_length()?;
        Ok(dataset)
    }
}

impl VoxelGridParser for PfbParser {
    fn supported_extensions(&self) -> Vec<&'static str> {
        vec!["pfb"]
    }

    fn name(&self) -> &'static str {
        "PFB Parser"
    }

    fn parse_from_file(&self, file_path: &str) -> Result<VoxelGrid> {
        let mut dataset = self.open(file_path)?;
        dataset.load_data_threaded(self.load_threads)?;
        dataset.close();
        dataset.into_voxel_grid()
    }

    fn get_layout_from_file(&self, file_path: &str) -> Result<GridLayout> {
        let dataset = self.open(file_path)?;
        let topology = dataset.topology();

        // 每个子网格就是一个 chunk
        let chunks = (0..topology.num_subgrids())
            .filter_map(|index| {
                let grid = topology.unflatten(index)?;
                Some(ChunkDescriptor {
                    index,
                    start: dataset.subgrid_start(grid),
                    extent: dataset.subgrid_size(grid),
                })
            })
            .collect();

        Ok(GridLayout {
            header: *dataset.header(),
            topology,
            chunks,
        })
    }

    fn read_point(&self, file_path: &str, [x, y, z]: [usize; 3]) -> Result<f64> {
        let mut dataset = self.open(file_path)?;
        dataset.file_read_point(x, y, z)
    }
}
