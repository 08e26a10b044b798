//! # 磁盘数据结构层
//!
//! flat-fs 的磁盘布局（编译期固定，没有超级块）：
//! 块位图(1块) | inode位图(1块) | inode表(8块) | 数据块区域
//!
//! 位图中的块编号都是卷内的**绝对**块号，
//! 格式化时把元数据区各块标记为已分配。

use core::mem;

use crate::BLOCK_SIZE;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{DiskInode, InodeKind, DIRECT_COUNT, MAX_FILE_SIZE};

/// 文件项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{DirEntry, NAME_MAX_LEN};

/// 块位图所在块
pub const BLOCK_BITMAP_BLOCK: usize = 0;
/// inode位图所在块
pub const INODE_BITMAP_BLOCK: usize = 1;
/// inode表的起始块
pub const INODE_TABLE_START_BLOCK: usize = 2;
/// inode表占据块数
pub const INODE_TABLE_BLOCKS: usize = 8;
/// 数据块区域的起始块
pub const DATA_AREA_START_BLOCK: usize = INODE_TABLE_START_BLOCK + INODE_TABLE_BLOCKS;

pub const INODE_SIZE: usize = mem::size_of::<DiskInode>();
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
/// 全卷 inode 槽位总数
pub const INODE_COUNT: usize = INODE_TABLE_BLOCKS * INODES_PER_BLOCK;
