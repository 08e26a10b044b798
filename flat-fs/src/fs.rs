//! # 磁盘卷管理层
//!
//! 构建出磁盘的布局并使用：位图分配、inode表定址、格式化与挂载。
//! 卷的全部状态都由 [`FileSystem`] 对象持有，没有进程级的可变全局。

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use derive_more::{From, Into};
use vfs::{Error, Result};

use crate::block_cache::CacheManager;
use crate::layout::*;
use crate::{BLOCK_BITS, DataBlock};

/// inode 编号；0号槽位永久保留，1号是根目录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, From, Into)]
#[repr(transparent)]
pub struct InodeId(u16);

/// 根目录
pub const ROOT: InodeId = InodeId(1);

pub struct FileSystem {
    pub(crate) cache: CacheManager,
    pub(crate) block_bitmap: Bitmap,
    pub(crate) inode_bitmap: Bitmap,
}

impl FileSystem {
    /// 格式化整个卷并挂载：清零所有块、预留元数据区、建出空的根目录
    pub fn format(dev: Arc<dyn BlockDevice>) -> Result<Self> {
        let total_blocks = Self::check_geometry(&dev)?;
        let cache = CacheManager::new(dev);

        for block_id in 0..total_blocks {
            cache
                .get(block_id)
                .lock()
                .map_mut(0, |data_block: &mut DataBlock| data_block.fill(0));
        }

        let fs = Self {
            block_bitmap: Bitmap::new(BLOCK_BITMAP_BLOCK, 1, total_blocks),
            inode_bitmap: Bitmap::new(INODE_BITMAP_BLOCK, 1, INODE_COUNT),
            cache,
        };

        // 元数据区各块标记为已分配；升序分配恰好给出 0..DATA_AREA_START_BLOCK
        for block_id in 0..DATA_AREA_START_BLOCK {
            let allocated = fs.block_bitmap.alloc(&fs.cache);
            debug_assert_eq!(Some(block_id as u32), allocated);
        }

        // 0号inode保留不用，1号是根目录
        let reserved = fs.inode_bitmap.alloc(&fs.cache);
        debug_assert_eq!(Some(0), reserved);
        let root = fs.inode_bitmap.alloc(&fs.cache);
        debug_assert_eq!(Some(1), root);
        fs.on_disk_mut(ROOT, |root_inode| root_inode.init(InodeKind::Directory));

        fs.cache.sync_all();
        log::info!("formatted volume: {total_blocks} blocks");

        Ok(fs)
    }

    /// 挂载一个已格式化的卷。
    /// 没有超级块可校验，以「根目录inode已分配且确为目录」判定卷合法。
    pub fn open(dev: Arc<dyn BlockDevice>) -> Result<Self> {
        let total_blocks = Self::check_geometry(&dev)?;
        let cache = CacheManager::new(dev);

        let fs = Self {
            block_bitmap: Bitmap::new(BLOCK_BITMAP_BLOCK, 1, total_blocks),
            inode_bitmap: Bitmap::new(INODE_BITMAP_BLOCK, 1, INODE_COUNT),
            cache,
        };

        if !fs.is_live(ROOT) || !fs.on_disk(ROOT, |root_inode| root_inode.is_dir()) {
            return Err(Error::Corrupted);
        }

        log::info!("mounted volume: {total_blocks} blocks");
        Ok(fs)
    }

    /// 卷的几何约束：装得下元数据区，且一个位图块能覆盖全卷
    fn check_geometry(dev: &Arc<dyn BlockDevice>) -> Result<usize> {
        let total_blocks = dev.block_count();
        if total_blocks <= DATA_AREA_START_BLOCK || total_blocks > BLOCK_BITS {
            return Err(Error::InvalidArgument);
        }
        Ok(total_blocks)
    }
}

impl FileSystem {
    /// 在磁盘上分配新的inode槽位并返回其ID
    pub(crate) fn alloc_inode(&mut self) -> Result<InodeId> {
        self.inode_bitmap
            .alloc(&self.cache)
            .map(|id| InodeId(id as u16))
            .ok_or(Error::OutOfSpace)
    }

    pub(crate) fn dealloc_inode(&mut self, id: InodeId) {
        self.inode_bitmap.dealloc(&self.cache, id.0 as u32);
    }

    /// 在磁盘上分配一批数据块，全有或全无：
    /// 空间不足时已取得的块全部退还，盘上状态不变
    pub(crate) fn alloc_blocks(&mut self, count: usize) -> Result<Vec<u32>> {
        let mut block_ids = Vec::with_capacity(count);
        for _ in 0..count {
            match self.block_bitmap.alloc(&self.cache) {
                Some(block_id) => block_ids.push(block_id),
                None => {
                    for block_id in block_ids {
                        self.block_bitmap.dealloc(&self.cache, block_id);
                    }
                    return Err(Error::OutOfSpace);
                }
            }
        }

        log::debug!("allocated data blocks: {block_ids:?}");
        Ok(block_ids)
    }

    #[inline]
    pub(crate) fn alloc_block(&mut self) -> Result<u32> {
        self.alloc_blocks(1).map(|block_ids| block_ids[0])
    }

    /// 归还数据块；释放即清零，复用的块从不携带旧内容
    pub(crate) fn dealloc_block(&mut self, block_id: u32) {
        self.cache
            .get(block_id as usize)
            .lock()
            .map_mut(0, |data_block: &mut DataBlock| data_block.fill(0));
        self.block_bitmap.dealloc(&self.cache, block_id);
    }

    /// inode是否已分配；仅对有效编号发问
    pub(crate) fn is_live(&self, id: InodeId) -> bool {
        self.inode_bitmap.is_set(&self.cache, id.0 as u32)
    }

    /// 编号有效性；位图之前的第一道关
    pub(crate) fn check_id(id: InodeId) -> Result<()> {
        if (id.0 as usize) < INODE_COUNT {
            Ok(())
        } else {
            Err(Error::InvalidArgument)
        }
    }

    /// 通过ID获取inode在磁盘上的位置：**块ID**以及**块内偏移**
    fn disk_inode_pos(id: InodeId) -> (usize, usize) {
        let id = id.0 as usize;
        let block_id = INODE_TABLE_START_BLOCK + id / INODES_PER_BLOCK;
        let block_inoffset = id % INODES_PER_BLOCK * INODE_SIZE;

        (block_id, block_inoffset)
    }

    /// 读取inode对磁盘的映射并处理
    pub(crate) fn on_disk<V>(&self, id: InodeId, f: impl FnOnce(&DiskInode) -> V) -> V {
        let (block_id, block_offset) = Self::disk_inode_pos(id);
        self.cache.get(block_id).lock().map(block_offset, f)
    }

    /// 以某种方式修改inode对磁盘的映射
    pub(crate) fn on_disk_mut<V>(&self, id: InodeId, f: impl FnOnce(&mut DiskInode) -> V) -> V {
        let (block_id, block_offset) = Self::disk_inode_pos(id);
        self.cache.get(block_id).lock().map_mut(block_offset, f)
    }
}
