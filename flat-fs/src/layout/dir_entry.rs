use core::{ptr, slice};

/// 文件名上限：13字符
pub const NAME_MAX_LEN: usize = 13;

/// 目录数据块内的定长目录项
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct DirEntry {
    // 最后一字节留给 \0
    name: [u8; NAME_MAX_LEN + 1],
    inode_id: u16,
}

impl DirEntry {
    /// 目录项大小恒为16字节
    pub const SIZE: usize = 16;

    #[inline]
    pub fn new(name: &str, inode_id: u16) -> Self {
        let bytes = name.as_bytes();
        debug_assert!(bytes.len() <= NAME_MAX_LEN);
        let mut name = [0; NAME_MAX_LEN + 1];
        name[..bytes.len()].copy_from_slice(bytes);

        Self { name, inode_id }
    }

    /// 目录项的名字；损坏的名字视同空串，不会与任何查找匹配
    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    #[inline]
    pub fn inode_id(&self) -> u16 {
        self.inode_id
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), Self::SIZE) }
    }
}
