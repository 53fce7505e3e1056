//! 大端字节序编解码
//!
//! PFB 文件中所有 4 字节整数与 8 字节双精度均以大端存储。主机字节序在编译期由
//! `byteorder` 确定，小端主机上每个字段都会做一次字节翻转，大端主机上原样透传。

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};

pub fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    reader.read_i32::<BigEndian>()
}

pub fn write_i32<W: Write>(writer: &mut W, value: i32) -> io::Result<()> {
    writer.write_i32::<BigEndian>(value)
}

pub fn read_f64<R: Read>(reader: &mut R) -> io::Result<f64> {
    reader.read_f64::<BigEndian>()
}

pub fn write_f64<W: Write>(writer: &mut W, value: f64) -> io::Result<()> {
    writer.write_f64::<BigEndian>(value)
}

/// 读取一整行连续的双精度值，直接写入目标切片
pub fn read_f64_row<R: Read>(reader: &mut R, dst: &mut [f64]) -> io::Result<()> {
    reader.read_f64_into::<BigEndian>(dst)
}

/// 将一整行双精度值经 scratch 缓冲转换为大端后一次写出
/// scratch 会被复用，容量足够时不会重新分配
pub fn write_f64_row<W: Write>(writer: &mut W, row: &[f64], scratch: &mut Vec<u8>) -> io::Result<()> {
    scratch.resize(row.len() * 8, 0);
    BigEndian::write_f64_into(row, scratch);
    writer.write_all(scratch)
}
