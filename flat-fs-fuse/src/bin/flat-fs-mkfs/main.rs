mod cli;

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::sync::Arc;
use std::sync::Mutex;

use clap::Parser;
use cli::Cli;
use flat_fs::{BLOCK_SIZE, FileSystem, MAX_FILE_SIZE, NAME_MAX_LEN, ROOT};
use flat_fs_fuse::BlockFile;

/// 根目录列表输出的条目上限
const MAX_READDIR_ENTRIES: usize = 64;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    println!("image={:?} blocks={}", cli.image, cli.blocks);

    let block_file = Arc::new(BlockFile(Mutex::new({
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&cli.image)?;
        fd.set_len((cli.blocks * BLOCK_SIZE) as u64)?;

        fd
    })));

    let mut fs = FileSystem::format(block_file).expect("formatting failed");

    if let Some(source) = &cli.source {
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry
                .file_name()
                .into_string()
                .expect("source file name is not unicode");
            if name.is_empty() || name.len() > NAME_MAX_LEN {
                log::warn!("skipping {name:?}: name exceeds {NAME_MAX_LEN} chars");
                continue;
            }

            let mut data: Vec<u8> = Vec::new();
            File::open(entry.path())?.read_to_end(&mut data)?;
            if data.len() > MAX_FILE_SIZE {
                log::warn!("skipping {name:?}: larger than {MAX_FILE_SIZE} bytes");
                continue;
            }

            let inode = fs.create(ROOT, &name).expect("creating file failed");
            fs.write_at(inode, 0, &data).expect("writing file failed");
            println!("packed: {name:?} ({} bytes)", data.len());
        }
    }

    for entry in fs
        .readdir(ROOT, MAX_READDIR_ENTRIES)
        .expect("listing root failed")
    {
        println!("{:?}\t{}", entry.kind, entry.name);
    }

    Ok(())
}
