#![no_std]

extern crate alloc;

mod dirent;
mod error;
mod stat;

pub use self::{
    dirent::DirEntry,
    error::Error,
    stat::{Stat, StatKind},
};

/// 统一的操作结果类型
pub type Result<T> = core::result::Result<T, Error>;
