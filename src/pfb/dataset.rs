use std::fs::File;
use std::io::{self, BufReader};
use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};

use crate::error::{PfbError, Result};
use crate::voxel_grid::VoxelGrid;

use super::geometry::{Axis, AxisPartition, Topology};
use super::header::{FILE_HEADER_SIZE, PfbHeader, SUBGRID_HEADER_SIZE, VALUE_SIZE};

/// 数据缓冲区的归属
///
/// `Owned` 由 dataset 自己分配并在替换或析构时释放；
/// `Borrowed` 是调用方提供的缓冲区，dataset 只持有引用。
#[derive(Debug, Default)]
pub enum GridData<'a> {
    #[default]
    Unset,
    Owned(Vec<f64>),
    Borrowed(&'a mut [f64]),
}

impl GridData<'_> {
    pub fn as_slice(&self) -> Option<&[f64]> {
        match self {
            GridData::Unset => None,
            GridData::Owned(v) => Some(v),
            GridData::Borrowed(s) => Some(s),
        }
    }

    pub fn as_mut_slice(&mut self) -> Option<&mut [f64]> {
        match self {
            GridData::Unset => None,
            GridData::Owned(v) => Some(v),
            GridData::Borrowed(s) => Some(s),
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, GridData::Owned(_))
    }
}

/// dataset 当前完成到哪一步
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadState {
    Closed,
    HeaderLoaded,
    TopologyKnown,
    DataLoaded,
}

/// 一个 PFB 文件（或一块内存网格）的句柄
///
/// 持有文件头信息、分块拓扑和扁平数据缓冲。扁平索引为
/// `z * nx * ny + y * nx + x`，与文件中每个子网格的行顺序一致。
///
/// 修改任何头字段都会让 dataset 与磁盘上的文件不再一致，需要重新
/// `load_header` 才能恢复。
#[derive(Debug, Default)]
pub struct PfbDataset<'a> {
    pub(crate) path: Option<PathBuf>,
    pub(crate) reader: Option<BufReader<File>>,
    pub(crate) header: PfbHeader,
    pub(crate) topology: Topology,
    pub(crate) header_loaded: bool,
    pub(crate) topology_known: bool,
    pub(crate) data: GridData<'a>,
}

impl<'a> PfbDataset<'a> {
    /// 空 dataset，所有几何字段为 0，没有数据
    pub fn new() -> Self {
        Self::default()
    }

    /// 只记录路径，不做任何 I/O
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// 包装调用方提供的缓冲区（不拥有），间距默认 1.0，原点 0.0，拓扑 1×1×1
    pub fn from_slice(data: &'a mut [f64], nx: usize, ny: usize, nz: usize) -> Result<Self> {
        let expected = nx.checked_mul(ny).and_then(|n| n.checked_mul(nz));
        if expected != Some(data.len()) {
            return Err(PfbError::ShapeMismatch {
                shape: [nx, ny, nz],
                expected: expected.unwrap_or(usize::MAX),
                actual: data.len(),
            });
        }
        Ok(Self::with_grid_data(GridData::Borrowed(data), [nx, ny, nz]))
    }

    /// 接管一个体素网格的数据，间距默认 1.0，原点 0.0，拓扑 1×1×1
    pub fn from_voxel_grid(grid: VoxelGrid) -> Self {
        Self::with_grid_data(GridData::Owned(grid.data), grid.shape)
    }

    fn with_grid_data(data: GridData<'a>, [nx, ny, nz]: [usize; 3]) -> Self {
        Self {
            header: PfbHeader {
                nx,
                ny,
                nz,
                dx: 1.0,
                dy: 1.0,
                dz: 1.0,
                num_subgrids: 1,
                ..PfbHeader::default()
            },
            topology_known: true,
            data,
            ..Self::default()
        }
    }

    pub fn filename(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn state(&self) -> LoadState {
        if self.data.as_slice().is_some() {
            LoadState::DataLoaded
        } else if self.topology_known {
            LoadState::TopologyKnown
        } else if self.header_loaded {
            LoadState::HeaderLoaded
        } else {
            LoadState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// 关闭文件句柄，内存中的数据保留
    pub fn close(&mut self) {
        self.reader = None;
    }

    pub fn header(&self) -> &PfbHeader {
        &self.header
    }

    pub fn x(&self) -> f64 {
        self.header.x
    }

    pub fn set_x(&mut self, x: f64) {
        self.header.x = x;
    }

    pub fn y(&self) -> f64 {
        self.header.y
    }

    pub fn set_y(&mut self, y: f64) {
        self.header.y = y;
    }

    pub fn z(&self) -> f64 {
        self.header.z
    }

    pub fn set_z(&mut self, z: f64) {
        self.header.z = z;
    }

    pub fn nx(&self) -> usize {
        self.header.nx
    }

    pub fn set_nx(&mut self, nx: usize) {
        self.header.nx = nx;
    }

    pub fn ny(&self) -> usize {
        self.header.ny
    }

    pub fn set_ny(&mut self, ny: usize) {
        self.header.ny = ny;
    }

    pub fn nz(&self) -> usize {
        self.header.nz
    }

    pub fn set_nz(&mut self, nz: usize) {
        self.header.nz = nz;
    }

    pub fn dx(&self) -> f64 {
        self.header.dx
    }

    pub fn set_dx(&mut self, dx: f64) {
        self.header.dx = dx;
    }

    pub fn dy(&self) -> f64 {
        self.header.dy
    }

    pub fn set_dy(&mut self, dy: f64) {
        self.header.dy = dy;
    }

    pub fn dz(&self) -> f64 {
        self.header.dz
    }

    pub fn set_dz(&mut self, dz: f64) {
        self.header.dz = dz;
    }

    pub fn num_subgrids(&self) -> usize {
        self.header.num_subgrids
    }

    pub fn set_num_subgrids(&mut self, num_subgrids: usize) {
        self.header.num_subgrids = num_subgrids;
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn p(&self) -> usize {
        self.topology.p
    }

    pub fn q(&self) -> usize {
        self.topology.q
    }

    pub fn r(&self) -> usize {
        self.topology.r
    }

    /// 覆盖分块拓扑，不修改 num_subgrids
    pub fn set_topology(&mut self, topology: Topology) {
        self.topology = topology;
        self.topology_known = true;
    }

    pub fn data(&self) -> Option<&[f64]> {
        self.data.as_slice()
    }

    pub fn data_mut(&mut self) -> Option<&mut [f64]> {
        self.data.as_mut_slice()
    }

    /// 替换数据缓冲，之前拥有的缓冲会被释放
    pub fn set_data(&mut self, data: GridData<'a>) {
        self.data = data;
    }

    pub fn is_data_owner(&self) -> bool {
        self.data.is_owned()
    }

    /// 转换为独立的体素网格，借用的数据会被复制
    pub fn into_voxel_grid(self) -> Result<VoxelGrid> {
        let shape = [self.header.nx, self.header.ny, self.header.nz];
        let data = match self.data {
            GridData::Unset => return Err(PfbError::NoData),
            GridData::Owned(v) => v,
            GridData::Borrowed(s) => s.to_vec(),
        };
        VoxelGrid::new(shape, data)
    }

    /// 带边界检查的取值
    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<f64> {
        if x >= self.header.nx || y >= self.header.ny || z >= self.header.nz {
            return None;
        }
        self.data().and_then(|d| d.get(self.flatten_index([x, y, z])).copied())
    }

    pub fn flatten_index(&self, [x, y, z]: [usize; 3]) -> usize {
        z * self.header.nx * self.header.ny + y * self.header.nx + x
    }

    /// 扁平索引 -> [x, y, z]，越界返回 None
    pub fn unflatten_index(&self, index: usize) -> Option<[usize; 3]> {
        let [nx, ny] = [self.header.nx, self.header.ny];
        if index >= self.header.element_count()? {
            return None;
        }
        Some([index % nx, (index / nx) % ny, index / (nx * ny)])
    }

    pub fn flatten_grid_index(&self, grid: [usize; 3]) -> usize {
        self.topology.flatten(grid)
    }

    pub fn unflatten_grid_index(&self, index: usize) -> Option<[usize; 3]> {
        self.topology.unflatten(index)
    }

    /// 某个轴按当前拓扑的分块方式
    pub fn partition(&self, axis: Axis) -> AxisPartition {
        match axis {
            Axis::X => AxisPartition::new(self.header.nx, self.topology.p),
            Axis::Y => AxisPartition::new(self.header.ny, self.topology.q),
            Axis::Z => AxisPartition::new(self.header.nz, self.topology.r),
        }
    }

    fn partitions(&self) -> [AxisPartition; 3] {
        [Axis::X, Axis::Y, Axis::Z].map(|axis| self.partition(axis))
    }

    /// 点所在子网格的索引
    pub fn subgrid_index_of_point(&self, point: [usize; 3]) -> [usize; 3] {
        let parts = self.partitions();
        [0, 1, 2].map(|i| parts[i].index_of(point[i]))
    }

    /// 子网格在各轴上的起始点索引
    pub fn subgrid_start(&self, grid: [usize; 3]) -> [usize; 3] {
        let parts = self.partitions();
        [0, 1, 2].map(|i| parts[i].start(grid[i]))
    }

    /// 子网格在各轴上的大小
    pub fn subgrid_size(&self, grid: [usize; 3]) -> [usize; 3] {
        let parts = self.partitions();
        [0, 1, 2].map(|i| parts[i].size(grid[i]))
    }

    /// 文件中位于该子网格之前的数据元素个数
    ///
    /// 前置条件：已 `load_header` 且 `load_pqr`
    pub fn subgrid_offset_elements(&self, grid: [usize; 3]) -> u64 {
        let [nx, ny] = [self.header.nx, self.header.ny];
        let [sx, sy, sz] = self.subgrid_start(grid);
        let [_, ey, ez] = self.subgrid_size(grid);
        // 之前的完整 z 层 + 本层之前的完整 y 行 + 本行之前的子网格
        (nx * ny * sz + nx * sy * ez + sx * ey * ez) as u64
    }

    /// 文件开头到该子网格头的字节偏移
    ///
    /// 前置条件：已 `load_header` 且 `load_pqr`
    pub fn subgrid_offset(&self, grid: [usize; 3]) -> u64 {
        FILE_HEADER_SIZE
            + SUBGRID_HEADER_SIZE * self.topology.flatten(grid) as u64
            + VALUE_SIZE * self.subgrid_offset_elements(grid)
    }

    /// 文件开头到某个点的字节偏移
    ///
    /// 前置条件：已 `load_header` 且 `load_pqr`
    pub fn point_offset(&self, point: [usize; 3]) -> u64 {
        let grid = self.subgrid_index_of_point(point);
        let [sx, sy, sz] = self.subgrid_start(grid);
        let [ex, ey, _] = self.subgrid_size(grid);
        let [x, y, z] = point;
        let local = (z - sz) * ex * ey + (y - sy) * ex + (x - sx);
        self.subgrid_offset(grid) + SUBGRID_HEADER_SIZE + VALUE_SIZE * local as u64
    }

    /// 确认文件长度足以容纳文件头声明的全部子网格，返回数据元素个数
    ///
    /// 在分配缓冲之前调用：损坏的文件头可能声明远超文件实际大小的网格。
    pub fn verify_file_length(&self) -> Result<usize> {
        let path = self.require_path()?;
        let (count, expected) = self.declared_size()?;
        let actual = std::fs::metadata(path)
            .map_err(|source| PfbError::Open {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        if actual < expected {
            return Err(PfbError::DataCorrupt {
                path: path.to_path_buf(),
                source: io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("文件只有 {actual} 字节，文件头声明需要 {expected} 字节"),
                ),
            });
        }
        Ok(count)
    }

    /// 文件头声明的数据元素个数和完整文件字节数，溢出视为文件损坏
    pub(crate) fn declared_size(&self) -> Result<(usize, u64)> {
        let header = &self.header;
        header
            .element_count()
            .zip(header.file_size())
            .ok_or_else(|| PfbError::DataCorrupt {
                path: self.path.clone().unwrap_or_default(),
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "文件头声明的网格 {}x{}x{}（{} 个子网格）过大",
                        header.nx, header.ny, header.nz, header.num_subgrids
                    ),
                ),
            })
    }

    pub(crate) fn require_path(&self) -> Result<&Path> {
        self.path.as_deref().ok_or_else(|| {
            PfbError::InvalidArgument("dataset 没有关联的文件路径".to_string())
        })
    }

    pub(crate) fn require_header(&self) -> Result<()> {
        if self.header_loaded {
            Ok(())
        } else {
            Err(PfbError::HeaderNotLoaded)
        }
    }

    pub(crate) fn require_topology(&self) -> Result<()> {
        self.require_header()?;
        if !self.topology_known {
            return Err(PfbError::TopologyUnknown);
        }
        if self.topology.num_subgrids() != self.header.num_subgrids {
            return Err(PfbError::InconsistentTopology(format!(
                "P*Q*R = {} 但文件中有 {} 个子网格",
                self.topology.num_subgrids(),
                self.header.num_subgrids
            )));
        }
        Ok(())
    }

    /// 返回当前文件句柄，close 之后会按路径重新打开
    pub(crate) fn reader(&mut self) -> Result<&mut BufReader<File>> {
        self.require_header()?;
        if self.reader.is_none() {
            let reader = open_reader(self.require_path()?)?;
            self.reader = Some(reader);
        }
        self.reader.as_mut().ok_or(PfbError::HeaderNotLoaded)
    }
}

pub(crate) fn open_reader(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| PfbError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// 热路径取值，不做额外检查
///
/// # Panics
///
/// 数据未加载或索引越界时 panic，需要检查时用 [`PfbDataset::get`]。
impl Index<[usize; 3]> for PfbDataset<'_> {
    type Output = f64;

    fn index(&self, point: [usize; 3]) -> &f64 {
        let index = self.flatten_index(point);
        &self.data.as_slice().unwrap_or_default()[index]
    }
}

impl IndexMut<[usize; 3]> for PfbDataset<'_> {
    fn index_mut(&mut self, point: [usize; 3]) -> &mut f64 {
        let index = self.flatten_index(point);
        &mut self.data.as_mut_slice().unwrap_or_default()[index]
    }
}
