use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// PFB 读写过程中的统一结果类型
pub type Result<T> = std::result::Result<T, PfbError>;

/// PFB 引擎错误
///
/// 打开失败、头部损坏、数据损坏、写入失败各自独立，调用方可以据此决定
/// 是否还能信任 dataset 中的字段或缓冲区。
#[derive(Debug, Error)]
pub enum PfbError {
    #[error("无法打开文件 {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("文件头损坏 {path}: {source}")]
    HeaderCorrupt {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("子网格数据损坏 {path}: {source}")]
    DataCorrupt {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("写入失败 {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("无效参数: {0}")]
    InvalidArgument(String),

    #[error("尚未读取文件头，请先调用 load_header")]
    HeaderNotLoaded,

    #[error("尚未确定分块拓扑 (P,Q,R)，请先调用 load_pqr")]
    TopologyUnknown,

    #[error("数据尚未加载")]
    NoData,

    #[error("子网格布局与拓扑不一致: {0}")]
    InconsistentTopology(String),

    #[error("子网格 {index} 超出网格范围: start {start:?}, extent {extent:?}")]
    SubgridOutOfBounds {
        index: usize,
        start: [i32; 3],
        extent: [i32; 3],
    },

    #[error("数据量不匹配: shape {shape:?} 需要 {expected} 个元素，但提供了 {actual} 个")]
    ShapeMismatch {
        shape: [usize; 3],
        expected: usize,
        actual: usize,
    },

    #[error("加载线程 {0} 异常退出")]
    WorkerPanicked(usize),
}
