//! 多线程全量加载
//!
//! 输出缓冲在派发前按 (z, y) 行、再按 x 方向的块边界切成互不重叠的片段，
//! 每个子网格拿到属于自己的全部片段。子网格按扁平索引连续分给各个线程，
//! 每个线程用自己的文件句柄读取，因此不需要任何锁。

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;
use std::thread;

use tracing::{debug, info};

use crate::error::{PfbError, Result};

use super::codec::read_f64_row;
use super::dataset::{GridData, PfbDataset, open_reader};
use super::geometry::{Axis, block_extent};
use super::header::SubgridHeader;
use super::loader::check_subgrid_extent;

/// 一个子网格的读取任务
struct SubgridJob<'d> {
    index: usize,
    offset: u64,
    extent: [usize; 3],
    /// 按文件中的顺序（z 外层、y 内层）排列，每行长度为 extent[0]
    rows: Vec<&'d mut [f64]>,
}

impl PfbDataset<'_> {
    /// 与 [`PfbDataset::load_data`] 结果相同，但使用 `num_threads` 个线程并行读取
    ///
    /// 前置条件：已 `load_pqr`。任一线程出错时，按 join 顺序返回第一个错误，
    /// 此时缓冲区内容不可信，dataset 的数据保持不变。
    pub fn load_data_threaded(&mut self, num_threads: usize) -> Result<()> {
        if num_threads < 1 {
            return Err(PfbError::InvalidArgument(format!(
                "线程数必须 >= 1，得到 {num_threads}"
            )));
        }
        self.require_topology()?;
        let path = self.require_path()?.to_path_buf();
        let len = self.verify_file_length()?;

        let mut data = vec![0.0; len];
        let jobs = self.subgrid_jobs(&mut data)?;

        let readers = (0..num_threads)
            .map(|_| open_reader(&path))
            .collect::<Result<Vec<_>>>()?;

        let batches = split_batches(jobs, num_threads);

        let results: Vec<Result<()>> = thread::scope(|scope| {
            let handles: Vec<_> = readers
                .into_iter()
                .zip(batches)
                .enumerate()
                .map(|(worker, (mut reader, batch))| {
                    let path = path.as_path();
                    scope.spawn(move || {
                        debug!("加载线程 {worker} 负责 {} 个子网格", batch.len());
                        read_batch(&mut reader, path, batch)
                    })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(worker, handle)| {
                    handle
                        .join()
                        .unwrap_or(Err(PfbError::WorkerPanicked(worker)))
                })
                .collect()
        });

        for result in results {
            result?;
        }

        info!(
            "已使用 {num_threads} 个线程加载 {}: {}x{}x{}",
            path.display(),
            self.header.nx,
            self.header.ny,
            self.header.nz
        );
        self.data = GridData::Owned(data);
        Ok(())
    }

    /// 将输出缓冲切成按子网格归属的行片段，按文件顺序返回所有任务
    fn subgrid_jobs<'d>(&self, data: &'d mut [f64]) -> Result<Vec<SubgridJob<'d>>> {
        let [nx, ny] = [self.header.nx, self.header.ny];
        let topology = self.topology;
        let axis_x = self.partition(Axis::X);

        let mut segments: Vec<Option<&'d mut [f64]>> =
            Vec::with_capacity(data.len() / nx.max(1) * topology.p);
        if nx > 0 {
            for row in data.chunks_mut(nx) {
                let mut rest = row;
                for gx in 0..topology.p {
                    let (segment, tail) =
                        std::mem::take(&mut rest).split_at_mut(axis_x.size(gx));
                    segments.push(Some(segment));
                    rest = tail;
                }
            }
        }

        let mut jobs = Vec::with_capacity(topology.num_subgrids());
        for index in 0..topology.num_subgrids() {
            let grid = topology.unflatten(index).ok_or_else(|| {
                PfbError::InconsistentTopology(format!("子网格索引 {index} 超出拓扑"))
            })?;
            let [sx, sy, sz] = self.subgrid_start(grid);
            let extent = self.subgrid_size(grid);
            let [_, ey, ez] = extent;

            let mut rows = Vec::with_capacity(ey * ez);
            for z in sz..sz + ez {
                for y in sy..sy + ey {
                    let slot = (z * ny + y) * topology.p + grid[0];
                    let segment =
                        segments.get_mut(slot).and_then(Option::take).ok_or_else(|| {
                            PfbError::InconsistentTopology(format!(
                                "子网格 {index} 的第 ({sx}, {y}, {z}) 行无法分配"
                            ))
                        })?;
                    rows.push(segment);
                }
            }

            jobs.push(SubgridJob {
                index,
                offset: self.subgrid_offset(grid),
                extent,
                rows,
            });
        }
        Ok(jobs)
    }
}

/// 按扁平索引连续分配，余数分给前面的线程，每个线程内保持文件顺序
fn split_batches(jobs: Vec<SubgridJob<'_>>, workers: usize) -> Vec<Vec<SubgridJob<'_>>> {
    let total = jobs.len();
    let mut jobs = jobs.into_iter();
    (0..workers)
        .map(|worker| {
            jobs.by_ref()
                .take(block_extent(total, workers, worker))
                .collect()
        })
        .collect()
}

fn read_batch(
    reader: &mut BufReader<File>,
    path: &Path,
    batch: Vec<SubgridJob<'_>>,
) -> Result<()> {
    let corrupt = |source| PfbError::DataCorrupt {
        path: path.to_path_buf(),
        source,
    };
    for job in batch {
        reader
            .seek(SeekFrom::Start(job.offset))
            .map_err(corrupt)?;
        let sub = SubgridHeader::read_from(reader).map_err(corrupt)?;
        check_subgrid_extent(&sub, job.index, job.extent)?;
        for row in job.rows {
            read_f64_row(reader, row).map_err(corrupt)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pfb::geometry::Topology;

    #[test]
    fn rejects_zero_threads_before_touching_files() {
        let mut ds = PfbDataset::with_path("does-not-exist.pfb");
        let err = ds.load_data_threaded(0).unwrap_err();
        assert!(matches!(err, PfbError::InvalidArgument(_)));
    }

    #[test]
    fn jobs_cover_every_cell_exactly_once() {
        let mut ds = PfbDataset::new();
        ds.set_nx(8);
        ds.set_ny(8);
        ds.set_nz(3);
        ds.set_topology(Topology::new(3, 3, 2).unwrap());

        let mut data = vec![0.0; 8 * 8 * 3];
        {
            let jobs = ds.subgrid_jobs(&mut data).unwrap();
            assert_eq!(jobs.len(), 18);
            for job in jobs {
                let [ex, ey, ez] = job.extent;
                assert_eq!(job.rows.len(), ey * ez);
                for row in job.rows {
                    assert_eq!(row.len(), ex);
                    for v in row.iter_mut() {
                        *v += 1.0;
                    }
                }
            }
        }
        assert!(data.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn batches_give_remainder_to_first_workers() {
        let mut ds = PfbDataset::new();
        ds.set_nx(4);
        ds.set_ny(4);
        ds.set_nz(1);
        ds.set_topology(Topology::new(4, 4, 1).unwrap());

        let mut data = vec![0.0; 16];
        let jobs = ds.subgrid_jobs(&mut data).unwrap();
        let batches = split_batches(jobs, 3);
        let indices: Vec<Vec<usize>> = batches
            .iter()
            .map(|b| b.iter().map(|job| job.index).collect())
            .collect();
        assert_eq!(
            indices,
            [
                (0..6).collect::<Vec<_>>(),
                (6..11).collect(),
                (11..16).collect()
            ]
        );

        let jobs = ds.subgrid_jobs(&mut data).unwrap();
        let batches = split_batches(jobs, 40);
        assert_eq!(batches.len(), 40);
        assert!(batches[16..].iter().all(Vec::is_empty));
    }

    #[test]
    fn job_rows_land_on_subgrid_cells() {
        let mut ds = PfbDataset::new();
        ds.set_nx(5);
        ds.set_ny(4);
        ds.set_nz(1);
        ds.set_topology(Topology::new(2, 2, 1).unwrap());

        let mut data = vec![0.0; 20];
        {
            let jobs = ds.subgrid_jobs(&mut data).unwrap();
            // 文件顺序中的第二个子网格是 x 方向第二块：x 从 3 开始，宽 2
            for row in jobs.into_iter().nth(1).unwrap().rows {
                row.fill(7.0);
            }
        }
        let marked: Vec<usize> = (0..20).filter(|&i| data[i] == 7.0).collect();
        assert_eq!(marked, [3, 4, 8, 9]);
    }

    /// 8x8x2 网格按 3x3x1 分块写入文件，返回已 load_pqr 的句柄
    fn written_8x8x2(dir: &Path) -> PfbDataset<'static> {
        let data = (0..128).map(f64::from).collect();
        let mut src = PfbDataset::from_voxel_grid(
            crate::voxel_grid::VoxelGrid::new([8, 8, 2], data).unwrap(),
        );
        src.set_topology(Topology::new(3, 3, 1).unwrap());
        let path = dir.join("grid.pfb");
        src.write_file(&path).unwrap();

        let mut ds = PfbDataset::with_path(path);
        ds.load_header().unwrap();
        ds.load_pqr().unwrap();
        ds
    }

    /// 改写第 `index` 个子网格头中 x 方向的大小
    fn patch_extent_x(ds: &PfbDataset<'_>, index: usize, extent_x: i32) {
        let grid = ds.unflatten_grid_index(index).unwrap();
        let at = (ds.subgrid_offset(grid) + 12) as usize;
        let path = ds.filename().unwrap();
        let mut bytes = std::fs::read(path).unwrap();
        bytes[at..at + 4].copy_from_slice(&extent_x.to_be_bytes());
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn truncated_file_fails_before_spawning_workers() {
        let dir = tempfile::tempdir().unwrap();
        let mut ds = written_8x8x2(dir.path());
        let path = ds.filename().unwrap().to_path_buf();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 100]).unwrap();

        let err = ds.load_data_threaded(4).unwrap_err();
        assert!(matches!(err, PfbError::DataCorrupt { .. }));
        assert!(ds.data().is_none());
    }

    #[test]
    fn subgrid_header_disagreeing_with_topology_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut ds = written_8x8x2(dir.path());
        patch_extent_x(&ds, 4, 2);

        let err = ds.load_data_threaded(2).unwrap_err();
        assert!(matches!(err, PfbError::InconsistentTopology(_)));
    }

    #[test]
    fn first_error_in_worker_order_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut ds = written_8x8x2(dir.path());
        // 9 个子网格分给 4 个线程：[0, 1, 2] [3, 4] [5, 6] [7, 8]
        patch_extent_x(&ds, 6, -1);
        patch_extent_x(&ds, 1, 1);

        let err = ds.load_data_threaded(4).unwrap_err();
        assert!(matches!(err, PfbError::InconsistentTopology(_)));

        // 只剩后一个线程出错时返回它的错误
        patch_extent_x(&ds, 1, 3);
        let err = ds.load_data_threaded(4).unwrap_err();
        assert!(matches!(err, PfbError::DataCorrupt { .. }));
        assert!(ds.data().is_none());
    }
}
