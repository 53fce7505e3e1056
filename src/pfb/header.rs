//! 文件头与子网格头
//!
//! 文件头固定 64 字节：
//! `X Y Z` (f64) · `NX NY NZ` (i32) · `DX DY DZ` (f64) · `num_subgrids` (i32)
//!
//! 每个子网格前有 36 字节的头：
//! `ix iy iz` (i32，绝对起点) · `nx ny nz` (i32，子网格大小) · `rx ry rz` (i32，保留字段)

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use super::codec::{read_f64, read_i32, write_f64, write_i32};

pub const FILE_HEADER_SIZE: u64 = 64;
pub const SUBGRID_HEADER_SIZE: u64 = 36;
pub const VALUE_SIZE: u64 = 8;

/// 写出子网格头时保留字段使用的值
pub const SUBGRID_REFINEMENT: [i32; 3] = [1, 1, 1];

/// PFB 文件头
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PfbHeader {
    /// 计算网格左下角坐标
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// 各轴点数
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// 各轴网格间距
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub num_subgrids: usize,
}

impl PfbHeader {
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let x = read_f64(reader)?;
        let y = read_f64(reader)?;
        let z = read_f64(reader)?;
        let nx = read_count(reader)?;
        let ny = read_count(reader)?;
        let nz = read_count(reader)?;
        let dx = read_f64(reader)?;
        let dy = read_f64(reader)?;
        let dz = read_f64(reader)?;
        let num_subgrids = read_count(reader)?;
        Ok(Self {
            x,
            y,
            z,
            nx,
            ny,
            nz,
            dx,
            dy,
            dz,
            num_subgrids,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_f64(writer, self.x)?;
        write_f64(writer, self.y)?;
        write_f64(writer, self.z)?;
        write_i32(writer, to_i32(self.nx)?)?;
        write_i32(writer, to_i32(self.ny)?)?;
        write_i32(writer, to_i32(self.nz)?)?;
        write_f64(writer, self.dx)?;
        write_f64(writer, self.dy)?;
        write_f64(writer, self.dz)?;
        write_i32(writer, to_i32(self.num_subgrids)?)
    }

    /// 网格总点数，乘积溢出时返回 None
    pub fn element_count(&self) -> Option<usize> {
        self.nx.checked_mul(self.ny)?.checked_mul(self.nz)
    }

    /// 按文件头推算的完整文件字节数：文件头 + 每个子网格头 + 全部数据
    ///
    /// 溢出时返回 None。
    pub fn file_size(&self) -> Option<u64> {
        let values = u64::try_from(self.element_count()?).ok()?;
        let subgrids = u64::try_from(self.num_subgrids).ok()?;
        SUBGRID_HEADER_SIZE
            .checked_mul(subgrids)?
            .checked_add(VALUE_SIZE.checked_mul(values)?)?
            .checked_add(FILE_HEADER_SIZE)
    }
}

/// 子网格头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubgridHeader {
    pub start: [i32; 3],
    pub extent: [i32; 3],
    pub refinement: [i32; 3],
}

impl SubgridHeader {
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut fields = [0i32; 9];
        for field in &mut fields {
            *field = read_i32(reader)?;
        }
        let header = Self {
            start: [fields[0], fields[1], fields[2]],
            extent: [fields[3], fields[4], fields[5]],
            refinement: [fields[6], fields[7], fields[8]],
        };
        if header.extent.iter().any(|&e| e < 0) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("子网格大小为负: {:?}", header.extent),
            ));
        }
        Ok(header)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for value in self
            .start
            .iter()
            .chain(&self.extent)
            .chain(&self.refinement)
        {
            write_i32(writer, *value)?;
        }
        Ok(())
    }

    /// 子网格大小（已在读取时校验非负）
    pub fn extent_usize(&self) -> [usize; 3] {
        self.extent.map(|e| e.max(0) as usize)
    }

    /// 子网格数据部分的字节数，可直接用于相对 seek
    pub fn data_bytes(&self) -> io::Result<i64> {
        let [nx, ny, nz] = self.extent.map(|e| i64::from(e.max(0)));
        nx.checked_mul(ny)
            .and_then(|n| n.checked_mul(nz))
            .and_then(|n| n.checked_mul(VALUE_SIZE as i64))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("子网格大小 {:?} 的数据字节数溢出", self.extent),
                )
            })
    }
}

fn read_count<R: Read>(reader: &mut R) -> io::Result<usize> {
    let value = read_i32(reader)?;
    usize::try_from(value).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("文件头中的计数为负: {value}"),
        )
    })
}

pub(crate) fn to_i32(value: usize) -> io::Result<i32> {
    i32::try_from(value).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{value} 超出 32 位整数范围"),
        )
    })
}

/// 测试用：按给定的文件头和子网格头拼出原始文件字节，数据部分填 0
///
/// `data_values` 为每个子网格实际写入的值个数，None 表示按子网格大小写满。
#[cfg(test)]
pub(crate) fn encode_raw_file(
    header: &PfbHeader,
    subgrids: &[([i32; 3], [i32; 3])],
    data_values: Option<usize>,
) -> Vec<u8> {
    let mut buf = Vec::new();
    header.write_to(&mut buf).unwrap();
    for &(start, extent) in subgrids {
        SubgridHeader {
            start,
            extent,
            refinement: SUBGRID_REFINEMENT,
        }
        .write_to(&mut buf)
        .unwrap();
        let count = data_values.unwrap_or_else(|| extent.iter().map(|&e| e as usize).product());
        buf.resize(buf.len() + count * VALUE_SIZE as usize, 0);
    }
    buf
}
