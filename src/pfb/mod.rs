//! ParFlow 二进制网格（PFB）格式
//!
//! 大端、按 P×Q×R 分块存储的三维 `f64` 数组。文件由 64 字节文件头和
//! `P*Q*R` 个子网格组成，每个子网格有 36 字节的头，随后是按 x 最快顺序存放的数据。

pub mod codec;
pub mod compare;
pub mod dataset;
pub mod geometry;
pub mod header;
pub mod loader;
pub mod metadata;
pub mod threaded;
pub mod writer;

pub use compare::Difference;
pub use dataset::{GridData, LoadState, PfbDataset};
pub use geometry::{Axis, AxisPartition, Topology, block_extent, block_offset};
pub use header::{PfbHeader, SubgridHeader};
pub use writer::{dist_path, read_offsets_file, write_offsets_file};
