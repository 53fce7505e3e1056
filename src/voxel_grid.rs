use crate::error::{PfbError, Result};

/// 体素网格数据结构
/// 表示三维规则网格上的标量场数据
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid {
    /// 网格维度 [nx, ny, nz]
    pub shape: [usize; 3],
    /// 数据数组，x 变化最快，y 其次，z 最慢
    /// 索引计算: index = k * nx * ny + j * nx + i
    pub data: Vec<f64>,
}

impl VoxelGrid {
    /// 创建新的体素网格，数据长度必须等于 nx * ny * nz
    pub fn new(shape: [usize; 3], data: Vec<f64>) -> Result<Self> {
        let [nx, ny, nz] = shape;
        let expected = nx.checked_mul(ny).and_then(|n| n.checked_mul(nz));

        if expected != Some(data.len()) {
            return Err(PfbError::ShapeMismatch {
                shape,
                expected: expected.unwrap_or(usize::MAX),
                actual: data.len(),
            });
        }

        Ok(VoxelGrid { shape, data })
    }

    /// 带边界检查的取值
    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<f64> {
        let [nx, ny, nz] = self.shape;
        if i >= nx || j >= ny || k >= nz {
            return None;
        }
        self.data.get(k * nx * ny + j * nx + i).copied()
    }
}
