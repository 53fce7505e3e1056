//! 写出与重新分块
//!
//! 子网格按 z、y、x 嵌套顺序（z 最外层）写出，每个子网格的范围由 dataset 的全局
//! 尺寸和目标拓扑经 [`block_offset`]/[`block_extent`] 计算得到。

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{PfbError, Result};

use super::codec::write_f64_row;
use super::dataset::{PfbDataset, open_reader};
use super::geometry::{AxisPartition, Topology};
use super::header::{
    FILE_HEADER_SIZE, PfbHeader, SUBGRID_HEADER_SIZE, SUBGRID_REFINEMENT, SubgridHeader,
    VALUE_SIZE, to_i32,
};

/// 重新分块时伴随输出的偏移文件路径：`<out>.dist`
pub fn dist_path(out: &Path) -> PathBuf {
    let mut name = out.as_os_str().to_owned();
    name.push(".dist");
    PathBuf::from(name)
}

/// 写出偏移文件，每行一个十进制字节偏移
pub fn write_offsets_file(path: &Path, offsets: &[u64]) -> Result<()> {
    let failed = |source| PfbError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(failed)?);
    for offset in offsets {
        writeln!(writer, "{offset}").map_err(failed)?;
    }
    writer.flush().map_err(failed)
}

/// 读取偏移文件
pub fn read_offsets_file(path: &Path) -> Result<Vec<u64>> {
    let reader: BufReader<File> = open_reader(path)?;
    let corrupt = |source| PfbError::DataCorrupt {
        path: path.to_path_buf(),
        source,
    };
    let mut offsets = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(corrupt)?;
        let offset = line.trim().parse::<u64>().map_err(|e| {
            corrupt(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("无法解析偏移 '{line}': {e}"),
            ))
        })?;
        offsets.push(offset);
    }
    Ok(offsets)
}

impl PfbDataset<'_> {
    /// 以当前拓扑写出文件
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write_file_with_offsets(path, self.topology).map(|_| ())
    }

    /// 以指定拓扑写出文件，返回每个子网格写完之后的累计字节偏移
    ///
    /// 返回值长度为 `P*Q*R + 1`，第一项恒为 0。写入失败时目标文件可能只写了一部分。
    pub fn write_file_with_offsets(
        &self,
        path: impl AsRef<Path>,
        topology: Topology,
    ) -> Result<Vec<u64>> {
        let path = path.as_ref();
        let data = self.data().ok_or(PfbError::NoData)?;
        let header = PfbHeader {
            num_subgrids: topology.num_subgrids(),
            ..self.header
        };
        let expected = header.element_count();
        if expected != Some(data.len()) {
            return Err(PfbError::ShapeMismatch {
                shape: [header.nx, header.ny, header.nz],
                expected: expected.unwrap_or(usize::MAX),
                actual: data.len(),
            });
        }
        if topology.p > header.nx || topology.q > header.ny || topology.r > header.nz {
            return Err(PfbError::InvalidArgument(format!(
                "拓扑 {}x{}x{} 大于网格 {}x{}x{}",
                topology.p, topology.q, topology.r, header.nx, header.ny, header.nz
            )));
        }

        let failed = |source| PfbError::Write {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = BufWriter::new(File::create(path).map_err(failed)?);
        header.write_to(&mut writer).map_err(failed)?;

        let axis_x = AxisPartition::new(header.nx, topology.p);
        let axis_y = AxisPartition::new(header.ny, topology.q);
        let axis_z = AxisPartition::new(header.nz, topology.r);
        let origin = [header.x as i32, header.y as i32, header.z as i32];
        let (nx, ny) = (header.nx, header.ny);

        let mut offsets = Vec::with_capacity(topology.num_subgrids() + 1);
        offsets.push(0);
        let mut position = FILE_HEADER_SIZE;
        // 余数块排在最前，第一块就是最宽的
        let mut scratch = Vec::with_capacity(axis_x.size(0) * VALUE_SIZE as usize);

        for gz in 0..topology.r {
            for gy in 0..topology.q {
                for gx in 0..topology.p {
                    let start = [axis_x.start(gx), axis_y.start(gy), axis_z.start(gz)];
                    let extent = [axis_x.size(gx), axis_y.size(gy), axis_z.size(gz)];
                    let [sx, sy, sz] = start;
                    let [ex, ey, ez] = extent;

                    let mut sub_start = [0i32; 3];
                    let mut sub_extent = [0i32; 3];
                    for axis in 0..3 {
                        sub_start[axis] = origin[axis] + to_i32(start[axis]).map_err(failed)?;
                        sub_extent[axis] = to_i32(extent[axis]).map_err(failed)?;
                    }
                    SubgridHeader {
                        start: sub_start,
                        extent: sub_extent,
                        refinement: SUBGRID_REFINEMENT,
                    }
                    .write_to(&mut writer)
                    .map_err(failed)?;

                    for z in sz..sz + ez {
                        for y in sy..sy + ey {
                            let row = z * nx * ny + y * nx + sx;
                            write_f64_row(&mut writer, &data[row..row + ex], &mut scratch)
                                .map_err(failed)?;
                        }
                    }

                    position += SUBGRID_HEADER_SIZE + VALUE_SIZE * (ex * ey * ez) as u64;
                    offsets.push(position);
                }
            }
        }
        writer.flush().map_err(failed)?;

        info!(
            "已写出 {}: {}x{}x{}, 拓扑 {}x{}x{}, {position} 字节",
            path.display(),
            header.nx,
            header.ny,
            header.nz,
            topology.p,
            topology.q,
            topology.r
        );
        Ok(offsets)
    }

    /// 重新分块：读取源文件全部数据，以新拓扑写到 `out`，并写出 `<out>.dist` 偏移文件
    ///
    /// 完成后 dataset 描述的是 `out`：路径、子网格数和拓扑都与新文件一致，
    /// 随后的随机读取直接作用在新文件上。
    pub fn dist_file(&mut self, topology: Topology, out: impl AsRef<Path>) -> Result<Vec<u64>> {
        let out = out.as_ref();
        self.load_header()?;
        self.load_data()?;

        let offsets = self.write_file_with_offsets(out, topology)?;
        write_offsets_file(&dist_path(out), &offsets)?;

        self.reader = None;
        self.path = Some(out.to_path_buf());
        self.set_num_subgrids(topology.num_subgrids());
        self.set_topology(topology);
        Ok(offsets)
    }
}
