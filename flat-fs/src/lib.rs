#![no_std]

extern crate alloc;

/* flat-fs 的整体架构，自上而下 */

// 操作层：路径解析与 create/read/write/link 等文件操作
mod vfs;

// 磁盘卷管理层
mod fs;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 块缓存层：内存上的磁盘块数据缓存
mod block_cache;

pub use self::{
    fs::{FileSystem, InodeId, ROOT},
    layout::{DIRECT_COUNT, DirEntry, INODE_COUNT, MAX_FILE_SIZE, NAME_MAX_LEN},
};

pub const BLOCK_SIZE: usize = 512;
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;

type DataBlock = [u8; BLOCK_SIZE];
