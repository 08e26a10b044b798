//! 索引节点的盘上结构。
//!
//! 只有直接索引：一个inode至多指向 [`DIRECT_COUNT`] 个数据块，
//! 文件大小的硬上限即 [`MAX_FILE_SIZE`]。
//! `reserved` 槽位留给将来的间接索引扩展，当前不读不写。

use alloc::vec::Vec;

use vfs::Error;

use crate::block_cache::CacheManager;
use crate::BLOCK_SIZE;
use crate::DataBlock;

/// 直接索引块的编号数量
pub const DIRECT_COUNT: usize = 10;
/// 保留槽位数量
const RESERVED_COUNT: usize = 3;
/// 文件内容的字节上限
pub const MAX_FILE_SIZE: usize = DIRECT_COUNT * BLOCK_SIZE;

/// inode 记录，恒为64字节，在inode表内按ID定址
#[derive(Debug, Default)]
#[repr(C)]
pub struct DiskInode {
    /// 类型标签的原始值；0是未初始化槽位，其余非法值视为损坏
    kind: u32,
    // 不用usize是为了严控布局
    pub size: u32,
    /// 硬链接个数
    pub links: u32,
    /// 直接索引块，包含 DIRECT_COUNT 个块编号
    direct: [u32; DIRECT_COUNT],
    #[allow(dead_code)]
    reserved: [u32; RESERVED_COUNT],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum InodeKind {
    Directory = 1,
    File = 2,
}

impl DiskInode {
    #[inline]
    pub fn init(&mut self, kind: InodeKind) {
        *self = Self {
            kind: kind as u32,
            links: 1,
            ..Default::default()
        }
    }

    /// 校验类型标签；非法标签报告 [`Error::Corrupted`] 而不是中止进程
    pub fn kind(&self) -> Result<InodeKind, Error> {
        match self.kind {
            k if k == InodeKind::Directory as u32 => Ok(InodeKind::Directory),
            k if k == InodeKind::File as u32 => Ok(InodeKind::File),
            _ => Err(Error::Corrupted),
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory as u32
    }

    /// 逻辑块索引对应的数据块ID
    #[inline]
    pub fn block_id(&self, block_index: usize) -> u32 {
        self.direct[block_index]
    }

    #[inline]
    pub fn set_block_id(&mut self, block_index: usize, block_id: u32) {
        self.direct[block_index] = block_id;
    }

    /// 从指定位置(字节偏移)读出数据填充`buf`，返回读出的字节数。
    /// 偏移在文件末尾之后时读出0字节。
    pub fn read_at(&self, offset: usize, buf: &mut [u8], cache: &CacheManager) -> usize {
        let mut start = offset;
        // MAX_FILE_SIZE 同时挡住损坏的超界 size
        let end = (start + buf.len()).min(self.size as usize).min(MAX_FILE_SIZE);

        if start >= end {
            return 0;
        }

        // 已读取多少字节
        let mut read_size = 0;
        loop {
            // 当前块的逻辑索引
            let block_index = start / BLOCK_SIZE;
            // 当前块的末地址(字节)
            let current_block_end = ((block_index + 1) * BLOCK_SIZE).min(end);
            let block_read_size = current_block_end - start;
            let dest = &mut buf[read_size..read_size + block_read_size];

            cache
                .get(self.block_id(block_index) as usize)
                .lock()
                .map(0, |data_block: &DataBlock| {
                    // 绝对地址 % 块大小 = 块内偏移
                    let src = &data_block[start % BLOCK_SIZE..start % BLOCK_SIZE + block_read_size];
                    dest.copy_from_slice(src);
                });

            read_size += block_read_size;

            if current_block_end == end {
                break;
            }

            start = current_block_end;
        }

        read_size
    }

    /// 往指定位置写入`buf`，返回写入的字节数。
    /// 调用者须先把 `size` 扩到覆盖写入区间，并挂好所需的直接索引块。
    pub fn write_at(&mut self, offset: usize, buf: &[u8], cache: &CacheManager) -> usize {
        let mut start = offset;
        let end = (start + buf.len()).min(self.size as usize).min(MAX_FILE_SIZE);

        if start >= end {
            return 0;
        }

        let mut written_size = 0;
        loop {
            let block_index = start / BLOCK_SIZE;
            let current_block_end = ((block_index + 1) * BLOCK_SIZE).min(end);
            let block_write_size = current_block_end - start;

            cache
                .get(self.block_id(block_index) as usize)
                .lock()
                .map_mut(0, |data_block: &mut DataBlock| {
                    let src = &buf[written_size..written_size + block_write_size];
                    let dest =
                        &mut data_block[start % BLOCK_SIZE..start % BLOCK_SIZE + block_write_size];
                    dest.copy_from_slice(src);
                });

            written_size += block_write_size;

            if current_block_end == end {
                break;
            }

            start = current_block_end;
        }

        written_size
    }

    /// 清空内容：收回全部在用数据块的ID并复位索引槽与大小。
    /// 返回的块由调用者归还给位图。
    pub fn clear(&mut self) -> Vec<u32> {
        let used = Self::count_blocks(self.size).min(DIRECT_COUNT);
        let drop_data_blocks = self.direct[..used].to_vec();

        self.direct.fill(0);
        self.size = 0;

        drop_data_blocks
    }

    /// 计算容纳指定数据量需要多少个数据块
    #[inline]
    pub fn count_blocks(size: u32) -> usize {
        (size as usize).div_ceil(BLOCK_SIZE)
    }
}
