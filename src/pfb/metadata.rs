//! 文件头与分块拓扑的读取
//!
//! PFB 格式没有显式记录 P/Q/R，只能依次读取每个子网格头，根据子网格大小的
//! 累加在哪里“换行”“换层”来反推。

use std::io::{Seek, SeekFrom};

use tracing::{debug, info};

use crate::error::{PfbError, Result};

use super::dataset::{PfbDataset, open_reader};
use super::geometry::Topology;
use super::header::{FILE_HEADER_SIZE, PfbHeader, SubgridHeader};

impl PfbDataset<'_> {
    /// 打开文件并读取 64 字节文件头，不读取子网格头和数据
    ///
    /// 失败时文件句柄会被关闭，头字段不可信。
    pub fn load_header(&mut self) -> Result<()> {
        self.reader = None;
        self.header_loaded = false;
        self.topology_known = false;

        let path = self.require_path()?.to_path_buf();
        let mut reader = open_reader(&path)?;
        let header = PfbHeader::read_from(&mut reader)
            .map_err(|source| PfbError::HeaderCorrupt { path: path.clone(), source })?;

        debug!(
            "读取文件头 {}: {}x{}x{}, {} 个子网格",
            path.display(),
            header.nx,
            header.ny,
            header.nz,
            header.num_subgrids
        );

        self.header = header;
        self.reader = Some(reader);
        self.header_loaded = true;
        Ok(())
    }

    /// 扫描所有子网格头，重建 P/Q/R
    ///
    /// 使用独立的文件句柄扫描，dataset 自己的句柄位置不受影响。
    pub fn load_pqr(&mut self) -> Result<()> {
        self.require_header()?;
        let path = self.require_path()?.to_path_buf();
        let header = self.header;
        let corrupt = |source| PfbError::HeaderCorrupt {
            path: path.clone(),
            source,
        };

        let mut cursor = open_reader(&path)?;
        cursor
            .seek(SeekFrom::Start(FILE_HEADER_SIZE))
            .map_err(corrupt)?;

        let (mut p, mut q, mut r) = (0usize, 0usize, 0usize);
        let (mut width, mut height) = (0usize, 0usize);

        for index in 0..header.num_subgrids {
            let sub = SubgridHeader::read_from(&mut cursor).map_err(corrupt)?;
            let [ex, ey, _] = sub.extent_usize();

            // 只在第一层的第一行里数 x 方向的块数
            if q == 0 && r == 0 {
                p += 1;
            }
            width += ex;
            if width > header.nx {
                return Err(PfbError::InconsistentTopology(format!(
                    "子网格 {index} 之后 x 方向累计宽度 {width} 超过 nx={}",
                    header.nx
                )));
            }
            if width == header.nx {
                width = 0;
                if r == 0 {
                    q += 1;
                }
                height += ey;
                if height > header.ny {
                    return Err(PfbError::InconsistentTopology(format!(
                        "子网格 {index} 之后 y 方向累计高度 {height} 超过 ny={}",
                        header.ny
                    )));
                }
                if height == header.ny {
                    height = 0;
                    r += 1;
                }
            }

            // 最后一个子网格之后不再跳过数据，避免越过文件末尾
            if index + 1 < header.num_subgrids {
                let skip = sub.data_bytes().map_err(corrupt)?;
                cursor.seek_relative(skip).map_err(corrupt)?;
            }
        }

        let product = p.checked_mul(q).and_then(|n| n.checked_mul(r));
        if width != 0 || height != 0 || product != Some(header.num_subgrids) {
            return Err(PfbError::InconsistentTopology(format!(
                "无法由 {} 个子网格推出拓扑 (P={p}, Q={q}, R={r})",
                header.num_subgrids
            )));
        }
        let topology = Topology::new(p, q, r)
            .map_err(|e| PfbError::InconsistentTopology(e.to_string()))?;

        info!("{} 的分块拓扑为 {p}x{q}x{r}", path.display());
        self.set_topology(topology);
        Ok(())
    }
}
