//! 顺序加载与随机访问
//!
//! 全量加载按子网格头中记录的起点和大小摆放数据，不依赖 P/Q/R；
//! 单点和单个子网格的随机读取则依赖 `load_pqr` 得到的拓扑计算偏移。

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{PfbError, Result};

use super::codec::{read_f64, read_f64_row};
use super::dataset::{GridData, PfbDataset};
use super::geometry::Topology;
use super::header::{FILE_HEADER_SIZE, PfbHeader, SubgridHeader};

/// 子网格在整个网格中的局部起点
///
/// 头中的起点是绝对坐标，以第一个子网格的起点为基准换算；越界时报错。
fn local_start(
    sub: &SubgridHeader,
    base: [i32; 3],
    header: &PfbHeader,
    index: usize,
) -> Result<[usize; 3]> {
    let limits = [header.nx, header.ny, header.nz];
    let extent = sub.extent_usize();
    let mut start = [0usize; 3];
    for axis in 0..3 {
        let local = i64::from(sub.start[axis]) - i64::from(base[axis]);
        if local < 0 || local as usize + extent[axis] > limits[axis] {
            return Err(PfbError::SubgridOutOfBounds {
                index,
                start: sub.start,
                extent: sub.extent,
            });
        }
        start[axis] = local as usize;
    }
    Ok(start)
}

fn data_corrupt(path: &Path) -> impl Fn(std::io::Error) -> PfbError + '_ {
    move |source| PfbError::DataCorrupt {
        path: path.to_path_buf(),
        source,
    }
}

impl PfbDataset<'_> {
    /// 将整个文件的数据读入内存，dataset 成为数据的拥有者
    pub fn load_data(&mut self) -> Result<()> {
        let path: PathBuf = self.require_path()?.to_path_buf();
        self.require_header()?;
        let len = self.verify_file_length()?;
        let header = self.header;
        let corrupt = data_corrupt(&path);
        let reader = self.reader()?;

        reader
            .seek(SeekFrom::Start(FILE_HEADER_SIZE))
            .map_err(&corrupt)?;

        let (nx, ny) = (header.nx, header.ny);
        let mut data = vec![0.0; len];
        let mut base = None;

        for index in 0..header.num_subgrids {
            let sub = SubgridHeader::read_from(reader).map_err(&corrupt)?;
            let base = *base.get_or_insert(sub.start);
            let [x0, y0, z0] = local_start(&sub, base, &header, index)?;
            let [ex, ey, ez] = sub.extent_usize();
            debug!("子网格 {index}: 起点 ({x0}, {y0}, {z0}), 大小 {ex}x{ey}x{ez}");

            for k in 0..ez {
                for j in 0..ey {
                    let offset = (z0 + k) * nx * ny + (y0 + j) * nx + x0;
                    read_f64_row(reader, &mut data[offset..offset + ex]).map_err(&corrupt)?;
                }
            }
        }

        info!(
            "已加载 {}: {}x{}x{}",
            path.display(),
            header.nx,
            header.ny,
            header.nz
        );
        self.data = GridData::Owned(data);
        Ok(())
    }

    /// 只加载 XY 平面上的一个矩形区域（z 方向完整）
    ///
    /// 加载完成后 dataset 变为只含该区域的单块网格：原点变为裁剪起点，
    /// nx/ny 变为裁剪大小，子网格数和拓扑都变为 1。
    ///
    /// 前置条件：同一水平层内的子网格共享相同的 z 起点和大小。
    pub fn load_clip(
        &mut self,
        clip_x: usize,
        clip_y: usize,
        extent_x: usize,
        extent_y: usize,
    ) -> Result<()> {
        self.require_header()?;
        let header = self.header;
        if extent_x == 0
            || extent_y == 0
            || clip_x + extent_x > header.nx
            || clip_y + extent_y > header.ny
        {
            return Err(PfbError::InvalidArgument(format!(
                "裁剪区域 ({clip_x}, {clip_y}) + {extent_x}x{extent_y} 超出 {}x{} 网格",
                header.nx, header.ny
            )));
        }

        let path: PathBuf = self.require_path()?.to_path_buf();
        self.verify_file_length()?;
        let corrupt = data_corrupt(&path);
        let reader = self.reader()?;
        reader
            .seek(SeekFrom::Start(FILE_HEADER_SIZE))
            .map_err(&corrupt)?;

        let plane = extent_x * extent_y;
        let mut data = vec![0.0; plane * header.nz];
        let mut row = Vec::new();
        let mut base = None;

        for index in 0..header.num_subgrids {
            let sub = SubgridHeader::read_from(reader).map_err(&corrupt)?;
            let base = *base.get_or_insert(sub.start);
            let [sx, sy, sz] = local_start(&sub, base, &header, index)?;
            let [ex, ey, ez] = sub.extent_usize();

            let lo_x = sx.max(clip_x);
            let hi_x = (sx + ex).min(clip_x + extent_x);
            let lo_y = sy.max(clip_y);
            let hi_y = (sy + ey).min(clip_y + extent_y);

            if lo_x >= hi_x || lo_y >= hi_y {
                let skip = sub.data_bytes().map_err(&corrupt)?;
                reader.seek_relative(skip).map_err(&corrupt)?;
                continue;
            }

            row.resize(ex, 0.0);
            for k in 0..ez {
                for j in 0..ey {
                    read_f64_row(reader, &mut row).map_err(&corrupt)?;
                    let gy = sy + j;
                    if gy < lo_y || gy >= hi_y {
                        continue;
                    }
                    let dst = (sz + k) * plane + (gy - clip_y) * extent_x + (lo_x - clip_x);
                    data[dst..dst + (hi_x - lo_x)].copy_from_slice(&row[lo_x - sx..hi_x - sx]);
                }
            }
        }

        info!(
            "已裁剪加载 {}: 起点 ({clip_x}, {clip_y}), 大小 {extent_x}x{extent_y}x{}",
            path.display(),
            header.nz
        );

        self.header.x = clip_x as f64;
        self.header.y = clip_y as f64;
        self.header.nx = extent_x;
        self.header.ny = extent_y;
        self.header.num_subgrids = 1;
        self.set_topology(Topology::default());
        self.data = GridData::Owned(data);
        Ok(())
    }

    /// 直接从文件读取单个点，不加载整个网格
    pub fn file_read_point(&mut self, x: usize, y: usize, z: usize) -> Result<f64> {
        self.require_topology()?;
        self.declared_size()?;
        self.check_point([x, y, z])?;
        let offset = self.point_offset([x, y, z]);
        let path = self.require_path()?.to_path_buf();
        let corrupt = data_corrupt(&path);

        let reader = self.reader()?;
        reader.seek(SeekFrom::Start(offset)).map_err(&corrupt)?;
        read_f64(reader).map_err(&corrupt)
    }

    /// 读取包含该点的子网格
    pub fn file_read_subgrid_at_point_index(
        &mut self,
        x: usize,
        y: usize,
        z: usize,
    ) -> Result<Vec<f64>> {
        self.require_topology()?;
        self.check_point([x, y, z])?;
        let grid = self.subgrid_index_of_point([x, y, z]);
        self.file_read_subgrid_at_grid_index(grid[0], grid[1], grid[2])
    }

    /// 读取指定子网格的全部数据，按 x 最快的局部顺序排列
    pub fn file_read_subgrid_at_grid_index(
        &mut self,
        grid_x: usize,
        grid_y: usize,
        grid_z: usize,
    ) -> Result<Vec<f64>> {
        self.require_topology()?;
        let topology = self.topology;
        if grid_x >= topology.p || grid_y >= topology.q || grid_z >= topology.r {
            return Err(PfbError::InvalidArgument(format!(
                "子网格索引 ({grid_x}, {grid_y}, {grid_z}) 超出拓扑 {}x{}x{}",
                topology.p, topology.q, topology.r
            )));
        }

        self.verify_file_length()?;
        let grid = [grid_x, grid_y, grid_z];
        let offset = self.subgrid_offset(grid);
        let expected = self.subgrid_size(grid);
        let index = topology.flatten(grid);
        let path = self.require_path()?.to_path_buf();

        let reader = self.reader()?;
        read_subgrid_at(reader, &path, offset, index, expected)
    }

    fn check_point(&self, [x, y, z]: [usize; 3]) -> Result<()> {
        if x >= self.header.nx || y >= self.header.ny || z >= self.header.nz {
            return Err(PfbError::InvalidArgument(format!(
                "点 ({x}, {y}, {z}) 超出 {}x{}x{} 网格",
                self.header.nx, self.header.ny, self.header.nz
            )));
        }
        Ok(())
    }
}

/// 定位到子网格头，校验其大小与拓扑一致后读出全部数据
pub(crate) fn read_subgrid_at<R: Read + Seek>(
    reader: &mut R,
    path: &Path,
    offset: u64,
    index: usize,
    expected: [usize; 3],
) -> Result<Vec<f64>> {
    let corrupt = data_corrupt(path);
    reader.seek(SeekFrom::Start(offset)).map_err(&corrupt)?;
    let sub = SubgridHeader::read_from(reader).map_err(&corrupt)?;
    check_subgrid_extent(&sub, index, expected)?;

    let [ex, ey, ez] = expected;
    let mut values = vec![0.0; ex * ey * ez];
    read_f64_row(reader, &mut values).map_err(&corrupt)?;
    Ok(values)
}

pub(crate) fn check_subgrid_extent(
    sub: &SubgridHeader,
    index: usize,
    expected: [usize; 3],
) -> Result<()> {
    if sub.extent_usize() != expected {
        return Err(PfbError::InconsistentTopology(format!(
            "子网格 {index} 的大小为 {:?}，按拓扑应为 {expected:?}",
            sub.extent
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pfb::header::encode_raw_file;

    fn header(nx: usize, ny: usize, nz: usize, num_subgrids: usize) -> PfbHeader {
        PfbHeader {
            nx,
            ny,
            nz,
            dx: 1.0,
            dy: 1.0,
            dz: 1.0,
            num_subgrids,
            ..PfbHeader::default()
        }
    }

    fn write_raw(dir: &Path, bytes: Vec<u8>) -> PfbDataset<'static> {
        let path = dir.join("raw.pfb");
        std::fs::write(&path, bytes).unwrap();
        let mut ds = PfbDataset::with_path(path);
        ds.load_header().unwrap();
        ds
    }

    fn is_data_corrupt(result: Result<impl std::fmt::Debug>) -> bool {
        matches!(result, Err(PfbError::DataCorrupt { .. }))
    }

    #[test]
    fn oversized_header_in_short_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        for extent in [i32::MAX, 65536] {
            let n = extent as usize;
            // 100 字节：文件头 + 一个子网格头，没有数据
            let bytes = encode_raw_file(&header(n, n, n, 1), &[([0; 3], [extent; 3])], Some(0));
            assert_eq!(bytes.len(), 100);
            let mut ds = write_raw(dir.path(), bytes);
            ds.load_pqr().unwrap();

            assert!(is_data_corrupt(ds.load_data()));
            assert!(is_data_corrupt(ds.load_data_threaded(2)));
            assert!(is_data_corrupt(ds.load_clip(0, 0, 1, 1)));
            assert!(is_data_corrupt(ds.file_read_point(0, 0, 0)));
            assert!(is_data_corrupt(ds.file_read_subgrid_at_grid_index(0, 0, 0)));
            assert!(ds.data().is_none());
        }
    }

    #[test]
    fn subgrid_outside_grid_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let subgrids = [([0, 0, 0], [2, 1, 1]), ([3, 0, 0], [2, 1, 1])];
        let mut ds = write_raw(
            dir.path(),
            encode_raw_file(&header(4, 1, 1, 2), &subgrids, None),
        );
        let err = ds.load_data().unwrap_err();
        assert!(matches!(err, PfbError::SubgridOutOfBounds { index: 1, .. }));
    }

    #[test]
    fn absolute_starts_are_relative_to_first_subgrid() {
        let dir = tempfile::tempdir().unwrap();
        let subgrids = [([10, 20, 5], [2, 1, 1]), ([12, 20, 5], [1, 1, 1])];
        let mut ds = write_raw(
            dir.path(),
            encode_raw_file(&header(3, 1, 1, 2), &subgrids, None),
        );
        ds.load_data().unwrap();
        assert_eq!(ds.data(), Some(&[0.0; 3][..]));
    }

    #[test]
    fn clip_requires_header() {
        let mut ds = PfbDataset::with_path("never-opened.pfb");
        assert!(matches!(
            ds.load_clip(0, 0, 1, 1),
            Err(PfbError::HeaderNotLoaded)
        ));
    }

    #[test]
    fn random_access_requires_topology() {
        let dir = tempfile::tempdir().unwrap();
        let subgrids = [([0, 0, 0], [2, 1, 1])];
        let mut ds = write_raw(
            dir.path(),
            encode_raw_file(&header(2, 1, 1, 1), &subgrids, None),
        );
        assert!(matches!(
            ds.file_read_point(0, 0, 0),
            Err(PfbError::TopologyUnknown)
        ));
        ds.load_pqr().unwrap();
        assert_eq!(ds.file_read_point(1, 0, 0).unwrap(), 0.0);
    }
}
