use enumflags2::bitflags;

/// 文件系统项的属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub kind: StatKind,
    /// 字节大小；目录即其目录项列表的大小
    pub size: u32,
    /// 目录项个数，文件没有
    pub entries: Option<u32>,
    /// 硬链接个数；目录恒为2
    pub links: u32,
}

#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatKind {
    DIR = 0o040000,
    #[default]
    FILE = 0o100000,
}
