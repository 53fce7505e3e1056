pub mod error;
pub mod pfb;
pub mod voxel_grid;

pub use error::{PfbError, Result};
pub use pfb::{Difference, GridData, PfbDataset, Topology};
pub use voxel_grid::VoxelGrid;
