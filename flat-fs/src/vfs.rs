//! # 操作层
//!
//! 文件系统对外的操作面。除 [`FileSystem::lookup`] 接收路径外，
//! 其余操作都以 `lookup` 解析出的 [`InodeId`] 为对象。
//!
//! 每个会改动盘上状态的操作结束前都把缓存全量写回，
//! 元数据从不只活在内存里；失败的操作不留任何盘上痕迹。

use alloc::vec::Vec;

use vfs::{Error, Result, Stat, StatKind};

use crate::BLOCK_SIZE;
use crate::fs::{FileSystem, InodeId, ROOT};
use crate::layout::{DIRECT_COUNT, DirEntry, DiskInode, InodeKind, MAX_FILE_SIZE, NAME_MAX_LEN};

impl FileSystem {
    /// 从根目录起逐个分量解析路径。
    /// 缺失的分量不算错误，解析结果为空；中途遇到文件则是错误。
    pub fn lookup(&self, path: &str) -> Result<Option<InodeId>> {
        if !path.starts_with('/') {
            return Err(Error::InvalidArgument);
        }

        let mut current = ROOT;
        // 连续的斜杠当作一个；路径语法校验是宿主前端的职责
        for name in path.split('/').filter(|name| !name.is_empty()) {
            if !self.is_live(current) {
                return Err(Error::Corrupted);
            }
            match self.on_disk(current, |inode| inode.kind())? {
                InodeKind::Directory => {}
                InodeKind::File => return Err(Error::NotADirectory),
            }

            match self.dir_search(current, name) {
                Some(next) => {
                    self.check_entry(next)?;
                    current = next;
                }
                None => return Ok(None),
            }
        }

        Ok(Some(current))
    }

    /// 查询inode的属性
    pub fn stat(&self, id: InodeId) -> Result<Stat> {
        Self::check_id(id)?;
        if !self.is_live(id) {
            return Err(Error::NotFound);
        }

        self.on_disk(id, |inode| {
            let size = inode.size;
            Ok(match inode.kind()? {
                InodeKind::Directory => Stat {
                    kind: StatKind::DIR,
                    size,
                    entries: Some(size / DirEntry::SIZE as u32),
                    // 目录的链接数固定表现为2
                    links: 2,
                },
                InodeKind::File => Stat {
                    kind: StatKind::FILE,
                    size,
                    entries: None,
                    links: inode.links,
                },
            })
        })
    }

    /// 从指定位置读文件内容，返回读出的字节数；
    /// 偏移在文件末尾之后时读出0字节
    pub fn read_at(&self, id: InodeId, offset: usize, buf: &mut [u8]) -> Result<usize> {
        self.require_file(id)?;
        Ok(self.on_disk(id, |inode| inode.read_at(offset, buf, &self.cache)))
    }

    /// 往指定位置写文件内容。
    ///
    /// 越过文件末尾的偏移被压回末尾，不会造出空洞；
    /// 需要的新块在写入第一个字节之前全部取得，
    /// 空间不足时整个写入不生效。
    pub fn write_at(&mut self, id: InodeId, offset: usize, buf: &[u8]) -> Result<()> {
        self.require_file(id)?;

        let size = self.on_disk(id, |inode| inode.size) as usize;
        let offset = offset.min(size);
        let end = offset + buf.len();
        if end > MAX_FILE_SIZE {
            return Err(Error::CapacityExceeded);
        }

        let blocks_used = DiskInode::count_blocks(size as u32);
        let blocks_needed = DiskInode::count_blocks(end as u32).max(blocks_used);
        log::debug!(
            "write: count={}, offset={offset}, size={size}, used={blocks_used}, new={}",
            buf.len(),
            blocks_needed - blocks_used,
        );

        if buf.is_empty() {
            return Ok(());
        }

        let new_blocks = self.alloc_blocks(blocks_needed - blocks_used)?;

        self.on_disk_mut(id, |inode| {
            for (i, block_id) in new_blocks.iter().enumerate() {
                inode.set_block_id(blocks_used + i, *block_id);
            }
            inode.size = end.max(size) as u32;
            inode.write_at(offset, buf, &self.cache);
        });

        self.cache.sync_all();
        Ok(())
    }

    /// 在目录下创建空文件
    pub fn create(&mut self, dir: InodeId, name: &str) -> Result<InodeId> {
        self.new_node(dir, name, InodeKind::File)
    }

    /// 在目录下创建空的子目录
    pub fn mkdir(&mut self, dir: InodeId, name: &str) -> Result<InodeId> {
        self.new_node(dir, name, InodeKind::Directory)
    }

    /// 列出目录下至多`max`个目录项
    pub fn readdir(&self, dir: InodeId, max: usize) -> Result<Vec<vfs::DirEntry>> {
        self.require_dir(dir)?;

        let mut entries = Vec::new();
        for entry in self.dir_entries(dir).into_iter().take(max) {
            let id = InodeId::from(entry.inode_id());
            self.check_entry(id)?;
            let kind = self.on_disk(id, |inode| inode.kind())?;
            entries.push(vfs::DirEntry {
                inode: entry.inode_id() as u32,
                kind: kind.into(),
                name: entry.name().into(),
            });
        }

        Ok(entries)
    }

    /// 丢弃文件的全部内容，大小归零；链接数不变
    pub fn truncate(&mut self, id: InodeId) -> Result<()> {
        self.require_file(id)?;

        let drop_blocks = self.on_disk_mut(id, |inode| inode.clear());
        log::debug!("truncate {id:?}: freeing blocks {drop_blocks:?}");
        for block_id in drop_blocks {
            self.dealloc_block(block_id);
        }

        self.cache.sync_all();
        Ok(())
    }

    /// 在目录下为既有文件再添一个名字，链接数加一。
    /// 目录不可硬链接。
    pub fn link(&mut self, dir: InodeId, name: &str, target: InodeId) -> Result<()> {
        self.require_dir(dir)?;
        Self::check_name(name)?;
        self.require_file(target)?;
        if self.dir_search(dir, name).is_some() {
            return Err(Error::AlreadyExists);
        }

        self.dir_append(dir, name, target)?;
        self.on_disk_mut(target, |inode| inode.links += 1);

        self.cache.sync_all();
        Ok(())
    }

    /// 删除目录下的一个文件名，链接数减一；
    /// 计数归零时inode与其数据块一并回收，编号即可再分配
    pub fn remove(&mut self, dir: InodeId, name: &str) -> Result<InodeId> {
        self.require_dir(dir)?;
        Self::check_name(name)?;

        let Some(id) = self.dir_search(dir, name) else {
            return Err(Error::NotFound);
        };
        self.check_entry(id)?;
        // 目录项走 rmdir，硬链接计数只属于文件
        match self.on_disk(id, |inode| inode.kind())? {
            InodeKind::Directory => return Err(Error::IsADirectory),
            InodeKind::File => {}
        }

        self.dir_remove(dir, name)?;
        let links = self.on_disk_mut(id, |inode| {
            // 活文件的计数至少为1；饱和减法挡住已损坏的0值
            inode.links = inode.links.saturating_sub(1);
            inode.links
        });
        if links == 0 {
            log::debug!("unlinked last name of {id:?}, reclaiming");
            self.reclaim(id);
        }

        self.cache.sync_all();
        Ok(id)
    }

    /// 删除目录下的一个空子目录
    pub fn rmdir(&mut self, dir: InodeId, name: &str) -> Result<()> {
        self.require_dir(dir)?;
        Self::check_name(name)?;

        let Some(id) = self.dir_search(dir, name) else {
            return Err(Error::NotFound);
        };
        if id == ROOT {
            return Err(Error::InvalidArgument);
        }
        self.check_entry(id)?;
        match self.on_disk(id, |inode| inode.kind())? {
            InodeKind::File => return Err(Error::NotADirectory),
            InodeKind::Directory => {}
        }
        if self.on_disk(id, |inode| inode.size) > 0 {
            return Err(Error::DirectoryNotEmpty);
        }

        self.dir_remove(dir, name)?;
        self.reclaim(id);

        self.cache.sync_all();
        Ok(())
    }
}

impl FileSystem {
    /// `dir`必须是活的目录
    fn require_dir(&self, dir: InodeId) -> Result<()> {
        Self::check_id(dir)?;
        if !self.is_live(dir) {
            return Err(Error::NotFound);
        }
        match self.on_disk(dir, |inode| inode.kind())? {
            InodeKind::Directory => Ok(()),
            InodeKind::File => Err(Error::NotADirectory),
        }
    }

    /// `id`必须是活的文件
    fn require_file(&self, id: InodeId) -> Result<()> {
        Self::check_id(id)?;
        if !self.is_live(id) {
            return Err(Error::NotFound);
        }
        match self.on_disk(id, |inode| inode.kind())? {
            InodeKind::File => Ok(()),
            InodeKind::Directory => Err(Error::IsADirectory),
        }
    }

    /// 盘上目录项引用的inode必须有效且已分配，否则元数据已损坏
    fn check_entry(&self, id: InodeId) -> Result<()> {
        if Self::check_id(id).is_err() || !self.is_live(id) {
            return Err(Error::Corrupted);
        }
        Ok(())
    }

    /// 名字长度限于 1..=[`NAME_MAX_LEN`] 字节
    fn check_name(name: &str) -> Result<()> {
        if name.is_empty() || name.len() > NAME_MAX_LEN {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    /// 创建新inode并在`dir`下登记；任何一步失败都完整回退
    fn new_node(&mut self, dir: InodeId, name: &str, kind: InodeKind) -> Result<InodeId> {
        self.require_dir(dir)?;
        Self::check_name(name)?;
        if self.dir_search(dir, name).is_some() {
            return Err(Error::AlreadyExists);
        }

        let id = self.alloc_inode()?;
        if let Err(e) = self.dir_append(dir, name, id) {
            self.dealloc_inode(id);
            return Err(e);
        }
        self.on_disk_mut(id, |inode| inode.init(kind));

        self.cache.sync_all();
        Ok(id)
    }

    /// 在目录的目录项序列中找名字，逐页扫描，整名精确匹配
    fn dir_search(&self, dir: InodeId, name: &str) -> Option<InodeId> {
        self.on_disk(dir, |dir_inode| {
            let size = dir_inode.size as usize;
            let mut entry = DirEntry::default();

            for offset in (0..size).step_by(DirEntry::SIZE) {
                dir_inode.read_at(offset, entry.as_bytes_mut(), &self.cache);
                if entry.name() == name {
                    return Some(entry.inode_id().into());
                }
            }

            None
        })
    }

    /// 目录的全部目录项
    fn dir_entries(&self, dir: InodeId) -> Vec<DirEntry> {
        self.on_disk(dir, |dir_inode| {
            let size = dir_inode.size as usize;
            let mut entries = Vec::with_capacity(size / DirEntry::SIZE);
            let mut entry = DirEntry::default();

            for offset in (0..size).step_by(DirEntry::SIZE) {
                let read = dir_inode.read_at(offset, entry.as_bytes_mut(), &self.cache);
                debug_assert_eq!(DirEntry::SIZE, read);
                entries.push(entry.clone());
            }

            entries
        })
    }

    /// 目录项追加在序列末尾；尾块已满（或还没有块）时先挂一个新的数据块
    fn dir_append(&mut self, dir: InodeId, name: &str, child: InodeId) -> Result<()> {
        let size = self.on_disk(dir, |dir_inode| dir_inode.size) as usize;

        if size % BLOCK_SIZE == 0 {
            let slot = size / BLOCK_SIZE;
            if slot == DIRECT_COUNT {
                return Err(Error::CapacityExceeded);
            }
            let block_id = self.alloc_block()?;
            self.on_disk_mut(dir, |dir_inode| dir_inode.set_block_id(slot, block_id));
        }

        let entry = DirEntry::new(name, child.into());
        self.on_disk_mut(dir, |dir_inode| {
            dir_inode.size = (size + DirEntry::SIZE) as u32;
            dir_inode.write_at(size, entry.as_bytes(), &self.cache);
        });

        Ok(())
    }

    /// 摘除目录下名字匹配的目录项并返回其inode编号。
    ///
    /// 重写整个目录项序列：被删项之后的目录项全体左移一格，
    /// 跨块也一样；缩过块边界时归还腾空的尾块。
    fn dir_remove(&mut self, dir: InodeId, name: &str) -> Result<InodeId> {
        let mut entries = self.dir_entries(dir);
        let Some(index) = entries.iter().position(|entry| entry.name() == name) else {
            return Err(Error::NotFound);
        };
        let removed = entries.remove(index);

        let old_size = (entries.len() + 1) * DirEntry::SIZE;
        let new_size = entries.len() * DirEntry::SIZE;
        self.on_disk_mut(dir, |dir_inode| {
            for (i, entry) in entries.iter().enumerate().skip(index) {
                dir_inode.write_at(i * DirEntry::SIZE, entry.as_bytes(), &self.cache);
            }
            // 腾出的尾槽清零
            dir_inode.write_at(new_size, &[0; DirEntry::SIZE], &self.cache);
            dir_inode.size = new_size as u32;
        });

        let old_used = DiskInode::count_blocks(old_size as u32);
        let new_used = DiskInode::count_blocks(new_size as u32);
        if new_used < old_used {
            let freed = self.on_disk_mut(dir, |dir_inode| {
                let block_id = dir_inode.block_id(new_used);
                dir_inode.set_block_id(new_used, 0);
                block_id
            });
            self.dealloc_block(freed);
        }

        Ok(removed.inode_id().into())
    }

    /// 归还inode及其全部在用数据块
    fn reclaim(&mut self, id: InodeId) {
        let drop_blocks = self.on_disk_mut(id, |inode| inode.clear());
        for block_id in drop_blocks {
            self.dealloc_block(block_id);
        }
        self.dealloc_inode(id);
    }
}

impl From<InodeKind> for StatKind {
    #[inline]
    fn from(kind: InodeKind) -> Self {
        match kind {
            InodeKind::Directory => Self::DIR,
            InodeKind::File => Self::FILE,
        }
    }
}
