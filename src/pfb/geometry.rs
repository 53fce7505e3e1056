//! 分块几何
//!
//! 总长度 `extent` 沿某个轴被切成 `blocks` 块时，每块的大小为 `extent / blocks`，
//! 余数 `extent % blocks` 分配给最前面的若干块（每块多 1）。所有偏移计算都基于这一规则。

use serde::{Deserialize, Serialize};

use crate::error::{PfbError, Result};

/// 第 `block_index` 块的长度
///
/// `block_count` 必须 >= 1，调用方负责保证。
pub fn block_extent(extent: usize, block_count: usize, block_index: usize) -> usize {
    let base = extent / block_count;
    let rem = extent % block_count;
    if block_index < rem { base + 1 } else { base }
}

/// 第 `block_index` 块的起始位置，与 [`block_extent`] 一致
pub fn block_offset(extent: usize, block_count: usize, block_index: usize) -> usize {
    let base = extent / block_count;
    let rem = extent % block_count;
    block_index * base + block_index.min(rem)
}

/// 坐标轴
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// 单个轴上的分块方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisPartition {
    pub extent: usize,
    pub blocks: usize,
}

impl AxisPartition {
    pub fn new(extent: usize, blocks: usize) -> Self {
        Self { extent, blocks }
    }

    /// 子网格 `block` 在该轴上的长度
    pub fn size(&self, block: usize) -> usize {
        block_extent(self.extent, self.blocks, block)
    }

    /// 子网格 `block` 在该轴上的起始点索引
    pub fn start(&self, block: usize) -> usize {
        block_offset(self.extent, self.blocks, block)
    }

    /// 普通（非余数）块的大小
    pub fn normal_block_size(&self) -> usize {
        self.extent / self.blocks
    }

    /// 余数块的个数，也就是普通块开始的网格索引
    pub fn normal_block_start_index(&self) -> usize {
        self.extent % self.blocks
    }

    /// 普通块开始的点索引，没有余数块时为 0
    pub fn normal_block_start(&self) -> usize {
        self.normal_block_start_index() * (self.normal_block_size() + 1)
    }

    /// 点索引 `point` 所在子网格的索引，是 [`Self::start`] 的逆运算
    pub fn index_of(&self, point: usize) -> usize {
        let normal_start = self.normal_block_start();
        if point < normal_start {
            point / (self.normal_block_size() + 1)
        } else {
            // normal_start < extent 时 normal_block_size 必然 >= 1
            self.normal_block_start_index() + (point - normal_start) / self.normal_block_size()
        }
    }
}

/// 分块拓扑 P×Q×R
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub p: usize,
    pub q: usize,
    pub r: usize,
}

impl Topology {
    /// 创建拓扑，任一方向块数为 0 都是无效拓扑
    pub fn new(p: usize, q: usize, r: usize) -> Result<Self> {
        if p == 0 || q == 0 || r == 0 {
            return Err(PfbError::InvalidArgument(format!(
                "分块数必须 >= 1，得到 P={p}, Q={q}, R={r}"
            )));
        }
        if p.checked_mul(q).and_then(|n| n.checked_mul(r)).is_none() {
            return Err(PfbError::InvalidArgument(format!(
                "分块数 P={p}, Q={q}, R={r} 的乘积溢出"
            )));
        }
        Ok(Self { p, q, r })
    }

    pub fn num_subgrids(&self) -> usize {
        self.p * self.q * self.r
    }

    /// 子网格三维索引 -> 文件中的枚举顺序（z 最外层，x 最内层）
    pub fn flatten(&self, [gx, gy, gz]: [usize; 3]) -> usize {
        gz * self.p * self.q + gy * self.p + gx
    }

    /// 文件中的枚举顺序 -> 子网格三维索引，越界返回 None
    pub fn unflatten(&self, index: usize) -> Option<[usize; 3]> {
        if index >= self.num_subgrids() {
            return None;
        }
        let layer = self.p * self.q;
        Some([index % self.p, (index % layer) / self.p, index / layer])
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self { p: 1, q: 1, r: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_sizes_sum_to_extent() {
        for extent in 0..64 {
            for count in 1..20 {
                let total: usize = (0..count).map(|i| block_extent(extent, count, i)).sum();
                assert_eq!(total, extent, "extent={extent} count={count}");
            }
        }
    }

    #[test]
    fn offsets_accumulate_extents() {
        for extent in 0..64 {
            for count in 1..20 {
                assert_eq!(block_offset(extent, count, 0), 0);
                for i in 0..count - 1 {
                    assert_eq!(
                        block_offset(extent, count, i + 1),
                        block_offset(extent, count, i) + block_extent(extent, count, i)
                    );
                }
            }
        }
    }

    #[test]
    fn remainder_blocks_come_first() {
        let sizes: Vec<usize> = (0..3).map(|i| block_extent(8, 3, i)).collect();
        assert_eq!(sizes, [3, 3, 2]);
        let sizes: Vec<usize> = (0..4).map(|i| block_extent(41, 4, i)).collect();
        assert_eq!(sizes, [11, 10, 10, 10]);
    }

    #[test]
    fn index_of_is_consistent_with_start_and_size() {
        for extent in 1..50 {
            for blocks in 1..=extent.min(12) {
                let axis = AxisPartition::new(extent, blocks);
                let mut previous = 0;
                for point in 0..extent {
                    let block = axis.index_of(point);
                    assert!(block >= previous, "index_of 应单调不减");
                    assert!(block < blocks);
                    assert!(axis.start(block) <= point);
                    assert!(point < axis.start(block) + axis.size(block));
                    previous = block;
                }
            }
        }
    }

    #[test]
    fn index_of_with_more_blocks_than_points() {
        let axis = AxisPartition::new(3, 5);
        assert_eq!(axis.normal_block_size(), 0);
        assert_eq!(axis.normal_block_start(), 3);
        assert_eq!(
            (0..3).map(|p| axis.index_of(p)).collect::<Vec<_>>(),
            [0, 1, 2]
        );
    }

    #[test]
    fn normal_block_helpers() {
        let axis = AxisPartition::new(41, 4);
        assert_eq!(axis.normal_block_size(), 10);
        assert_eq!(axis.normal_block_start_index(), 1);
        assert_eq!(axis.normal_block_start(), 11);

        let even = AxisPartition::new(40, 4);
        assert_eq!(even.normal_block_start_index(), 0);
        assert_eq!(even.normal_block_start(), 0);
    }

    #[test]
    fn subgrid_index_round_trip() {
        let topo = Topology::new(4, 3, 2).unwrap();
        for i in 0..topo.num_subgrids() {
            let g = topo.unflatten(i).unwrap();
            assert_eq!(topo.flatten(g), i);
        }
        assert_eq!(topo.unflatten(24), None);
        assert_eq!(topo.unflatten(5), Some([1, 1, 0]));
    }

    #[test]
    fn zero_block_count_is_rejected() {
        assert!(Topology::new(0, 1, 1).is_err());
        assert!(Topology::new(1, 1, 0).is_err());
        assert!(Topology::new(usize::MAX, 2, 1).is_err());
    }
}
