use serde::Serialize;

use super::dataset::PfbDataset;
use super::geometry::Axis;

/// 两个 dataset 的第一处差异
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum Difference {
    None,
    Origin(Axis),
    Spacing(Axis),
    Extent(Axis),
    /// 元数据相同但数据不同，记录第一个不同点的 [x, y, z]
    Data([usize; 3]),
}

impl Difference {
    pub fn is_none(&self) -> bool {
        matches!(self, Difference::None)
    }
}

impl PfbDataset<'_> {
    /// 依次比较原点、间距、尺寸，最后逐元素比较数据
    ///
    /// 前置条件：两边数据都已加载；未加载的一方按空数据处理。
    pub fn compare(&self, other: &PfbDataset<'_>) -> Difference {
        let (a, b) = (self.header(), other.header());
        let axes = [Axis::X, Axis::Y, Axis::Z];

        let origin = [(a.x, b.x), (a.y, b.y), (a.z, b.z)];
        if let Some(i) = origin.iter().position(|(l, r)| l != r) {
            return Difference::Origin(axes[i]);
        }
        let spacing = [(a.dx, b.dx), (a.dy, b.dy), (a.dz, b.dz)];
        if let Some(i) = spacing.iter().position(|(l, r)| l != r) {
            return Difference::Spacing(axes[i]);
        }
        let extent = [(a.nx, b.nx), (a.ny, b.ny), (a.nz, b.nz)];
        if let Some(i) = extent.iter().position(|(l, r)| l != r) {
            return Difference::Extent(axes[i]);
        }

        let left = self.data().unwrap_or_default();
        let right = other.data().unwrap_or_default();
        let first = left
            .iter()
            .zip(right)
            .position(|(l, r)| l != r)
            .or_else(|| (left.len() != right.len()).then(|| left.len().min(right.len())));

        match first {
            Some(index) => Difference::Data(self.unflatten_index(index).unwrap_or([0, 0, 0])),
            None => Difference::None,
        }
    }
}
