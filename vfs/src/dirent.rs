use alloc::string::String;

use crate::StatKind;

/// `readdir` 交换的目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Inode number
    pub inode: u32,
    pub kind: StatKind,
    pub name: String,
}
