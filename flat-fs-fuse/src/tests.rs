use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use flat_fs::{BLOCK_SIZE, FileSystem, InodeId, MAX_FILE_SIZE, ROOT};
use vfs::{Error, StatKind};

use crate::BlockFile;

fn block_file(name: &str, blocks: usize) -> Arc<BlockFile> {
    let path = std::env::temp_dir().join(name);
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .unwrap();
    fd.set_len((blocks * BLOCK_SIZE) as u64).unwrap();

    Arc::new(BlockFile(Mutex::new(fd)))
}

fn reopen(name: &str) -> Arc<BlockFile> {
    let path = std::env::temp_dir().join(name);
    let fd = OpenOptions::new().read(true).write(true).open(path).unwrap();
    Arc::new(BlockFile(Mutex::new(fd)))
}

fn fresh(name: &str) -> FileSystem {
    FileSystem::format(block_file(name, 4096)).unwrap()
}

#[test]
fn geometry_limits() {
    // 装不下元数据区的卷
    assert!(matches!(
        FileSystem::format(block_file("flatfs-tiny.img", 8)),
        Err(Error::InvalidArgument)
    ));
    // 全零的卷没有根目录，不是合法的卷
    assert!(matches!(
        FileSystem::open(block_file("flatfs-blank.img", 4096)),
        Err(Error::Corrupted)
    ));
}

#[test]
fn root_attrs() {
    let fs = fresh("flatfs-root.img");

    assert_eq!(Some(ROOT), fs.lookup("/").unwrap());
    let stat = fs.stat(ROOT).unwrap();
    assert_eq!(StatKind::DIR, stat.kind);
    assert_eq!(0, stat.size);
    assert_eq!(Some(0), stat.entries);
    assert_eq!(2, stat.links);
}

#[test]
fn stat_rejects_bad_ids() {
    let fs = fresh("flatfs-badid.img");

    assert_eq!(Err(Error::NotFound), fs.stat(InodeId::from(5u16)));
    assert_eq!(Err(Error::InvalidArgument), fs.stat(InodeId::from(64u16)));
    // 0号槽位已占用但从未初始化，类型标签非法
    assert_eq!(Err(Error::Corrupted), fs.stat(InodeId::from(0u16)));
}

#[test]
fn format_then_reopen() {
    let mut fs = fresh("flatfs-reopen.img");
    let id = fs.create(ROOT, "hello.txt").unwrap();
    fs.write_at(id, 0, b"hello").unwrap();
    drop(fs);

    let fs = FileSystem::open(reopen("flatfs-reopen.img")).unwrap();
    let id = fs.lookup("/hello.txt").unwrap().unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(5, fs.read_at(id, 0, &mut buf).unwrap());
    assert_eq!(b"hello", &buf);
}

#[test]
fn round_trip_full_file() {
    let mut fs = fresh("flatfs-roundtrip.img");
    let id = fs.create(ROOT, "big").unwrap();

    let data: Vec<u8> = (0..MAX_FILE_SIZE).map(|i| (i % 251) as u8).collect();
    fs.write_at(id, 0, &data).unwrap();

    let mut buf = vec![0u8; MAX_FILE_SIZE];
    assert_eq!(MAX_FILE_SIZE, fs.read_at(id, 0, &mut buf).unwrap());
    assert_eq!(data, buf);
}

#[test]
fn write_spans_blocks() {
    let mut fs = fresh("flatfs-spans.img");
    let id = fs.create(ROOT, "f").unwrap();

    let mut model = vec![b'a'; 2000];
    fs.write_at(id, 0, &model).unwrap();
    fs.write_at(id, 1800, &[b'b'; 1000]).unwrap();
    model.truncate(1800);
    model.extend_from_slice(&[b'b'; 1000]);

    assert_eq!(2800, fs.stat(id).unwrap().size);
    let mut buf = vec![0u8; 2800];
    assert_eq!(2800, fs.read_at(id, 0, &mut buf).unwrap());
    assert_eq!(model, buf);

    // 尾部截断读与越界读
    let mut tail = [0u8; 64];
    assert_eq!(5, fs.read_at(id, 2795, &mut tail).unwrap());
    assert_eq!(0, fs.read_at(id, 2800, &mut tail).unwrap());
    assert_eq!(0, fs.read_at(id, 9999, &mut tail).unwrap());
}

#[test]
fn write_offset_clamps_to_end() {
    let mut fs = fresh("flatfs-clamp.img");
    let id = fs.create(ROOT, "f").unwrap();

    fs.write_at(id, 0, b"hello").unwrap();
    // 越过末尾的偏移从末尾接着写，不留空洞
    fs.write_at(id, 9999, b"world").unwrap();

    assert_eq!(10, fs.stat(id).unwrap().size);
    let mut buf = [0u8; 10];
    fs.read_at(id, 0, &mut buf).unwrap();
    assert_eq!(b"helloworld", &buf);
}

#[test]
fn capacity_exceeded_leaves_size() {
    let mut fs = fresh("flatfs-capacity.img");
    let id = fs.create(ROOT, "f").unwrap();

    let data = vec![3u8; MAX_FILE_SIZE + 1];
    assert_eq!(Err(Error::CapacityExceeded), fs.write_at(id, 0, &data));
    assert_eq!(0, fs.stat(id).unwrap().size);

    fs.write_at(id, 0, &data[..MAX_FILE_SIZE]).unwrap();
    assert_eq!(
        Err(Error::CapacityExceeded),
        fs.write_at(id, MAX_FILE_SIZE, b"x")
    );
    assert_eq!(MAX_FILE_SIZE as u32, fs.stat(id).unwrap().size);
}

#[test]
fn out_of_space_is_atomic() {
    // 16块的卷：10块元数据，数据区只有6块
    let mut fs = FileSystem::format(block_file("flatfs-small.img", 16)).unwrap();
    let id = fs.create(ROOT, "f").unwrap(); // 根目录占掉1块，剩5

    assert_eq!(
        Err(Error::OutOfSpace),
        fs.write_at(id, 0, &vec![7u8; 6 * BLOCK_SIZE])
    );
    assert_eq!(0, fs.stat(id).unwrap().size);

    // 失败的写入一个块都不占：5块的写入照样成功
    fs.write_at(id, 0, &vec![7u8; 5 * BLOCK_SIZE]).unwrap();
    assert_eq!(
        Err(Error::OutOfSpace),
        fs.write_at(id, 5 * BLOCK_SIZE, b"x")
    );
}

#[test]
fn inode_exhaustion() {
    let mut fs = fresh("flatfs-inodes.img");

    // 64个槽位去掉保留的0号和根目录
    for i in 0..62 {
        fs.create(ROOT, &format!("f{i}")).unwrap();
    }
    assert_eq!(Err(Error::OutOfSpace), fs.create(ROOT, "straw"));
}

#[test]
fn name_rules() {
    let mut fs = fresh("flatfs-names.img");

    assert_eq!(
        Err(Error::InvalidArgument),
        fs.create(ROOT, "longer-than-13-chars")
    );
    assert_eq!(Err(Error::InvalidArgument), fs.create(ROOT, ""));
    // 失败不消耗inode：下一次创建仍拿到第一个空闲编号
    assert_eq!(InodeId::from(2u16), fs.create(ROOT, "ok").unwrap());

    assert_eq!(Err(Error::AlreadyExists), fs.create(ROOT, "ok"));
    assert_eq!(Err(Error::AlreadyExists), fs.mkdir(ROOT, "ok"));

    fs.create(ROOT, "exactly-13-ch").unwrap();
}

#[test]
fn lookup_paths() {
    let mut fs = fresh("flatfs-lookup.img");
    let a = fs.mkdir(ROOT, "a").unwrap();
    let f = fs.create(a, "f.txt").unwrap();

    assert_eq!(Some(a), fs.lookup("/a").unwrap());
    assert_eq!(Some(f), fs.lookup("/a/f.txt").unwrap());
    assert_eq!(Some(f), fs.lookup("//a//f.txt").unwrap());
    assert_eq!(None, fs.lookup("/a/nope").unwrap());
    assert_eq!(None, fs.lookup("/nope/f.txt").unwrap());
    assert_eq!(Err(Error::NotADirectory), fs.lookup("/a/f.txt/x"));
    assert_eq!(Err(Error::InvalidArgument), fs.lookup("a"));
}

#[test]
fn readdir_lists_kinds() {
    let mut fs = fresh("flatfs-readdir.img");
    fs.mkdir(ROOT, "sub").unwrap();
    let file_id = fs.create(ROOT, "file").unwrap();

    let entries = fs.readdir(ROOT, 64).unwrap();
    assert_eq!(2, entries.len());
    assert_eq!("sub", entries[0].name);
    assert_eq!(StatKind::DIR, entries[0].kind);
    assert_eq!("file", entries[1].name);
    assert_eq!(StatKind::FILE, entries[1].kind);
    assert_eq!(u16::from(file_id) as u32, entries[1].inode);

    assert_eq!(1, fs.readdir(ROOT, 1).unwrap().len());
    assert_eq!(Err(Error::NotADirectory), fs.readdir(file_id, 64));
}

#[test]
fn link_lifecycle() {
    let mut fs = fresh("flatfs-links.img");

    let x = fs.mkdir(ROOT, "a").unwrap();
    let y = fs.create(x, "f.txt").unwrap();
    fs.write_at(y, 0, b"hello").unwrap();

    let mut buf = [0u8; 5];
    assert_eq!(5, fs.read_at(y, 0, &mut buf).unwrap());
    assert_eq!(b"hello", &buf);
    assert_eq!(1, fs.stat(y).unwrap().links);

    fs.link(ROOT, "g.txt", y).unwrap();
    assert_eq!(2, fs.stat(y).unwrap().links);
    assert_eq!(Some(y), fs.lookup("/g.txt").unwrap());

    assert_eq!(y, fs.remove(ROOT, "g.txt").unwrap());
    assert_eq!(1, fs.stat(y).unwrap().links);
    // 还剩一个名字，内容原样
    assert_eq!(5, fs.read_at(y, 0, &mut buf).unwrap());

    assert_eq!(y, fs.remove(x, "f.txt").unwrap());
    assert_eq!(Err(Error::NotFound), fs.stat(y));

    // inode与数据块已回收，编号立即可以再分配
    assert_eq!(y, fs.create(x, "new").unwrap());
}

#[test]
fn link_rules() {
    let mut fs = fresh("flatfs-linkrules.img");
    let d = fs.mkdir(ROOT, "d").unwrap();
    let f = fs.create(ROOT, "f").unwrap();

    // 目录不可硬链接
    assert_eq!(Err(Error::IsADirectory), fs.link(ROOT, "dlink", d));
    assert_eq!(Err(Error::NotFound), fs.link(ROOT, "g", InodeId::from(50u16)));

    fs.link(ROOT, "f2", f).unwrap();
    assert_eq!(Err(Error::AlreadyExists), fs.link(ROOT, "f", f));

    // 两个名字指向同一份内容
    fs.write_at(f, 0, b"shared").unwrap();
    let via = fs.lookup("/f2").unwrap().unwrap();
    assert_eq!(f, via);
}

#[test]
fn rmdir_gate() {
    let mut fs = fresh("flatfs-rmdir.img");
    let d = fs.mkdir(ROOT, "d").unwrap();
    fs.create(d, "f").unwrap();

    assert_eq!(Err(Error::DirectoryNotEmpty), fs.rmdir(ROOT, "d"));

    fs.remove(d, "f").unwrap();
    fs.rmdir(ROOT, "d").unwrap();
    assert_eq!(None, fs.lookup("/d").unwrap());
    assert_eq!(Some(0), fs.stat(ROOT).unwrap().entries);

    // 根目录没有名字可删
    assert_eq!(Err(Error::NotFound), fs.rmdir(ROOT, "root"));

    // remove 与 rmdir 各管各的类型
    fs.mkdir(ROOT, "d2").unwrap();
    fs.create(ROOT, "plain").unwrap();
    assert_eq!(Err(Error::IsADirectory), fs.remove(ROOT, "d2"));
    assert_eq!(Err(Error::NotADirectory), fs.rmdir(ROOT, "plain"));
}

#[test]
fn truncate_releases_blocks() {
    let mut fs = FileSystem::format(block_file("flatfs-trunc.img", 16)).unwrap();
    let id = fs.create(ROOT, "f").unwrap();

    // 数据区还剩的5块全部写满
    fs.write_at(id, 0, &vec![1u8; 5 * BLOCK_SIZE]).unwrap();
    fs.truncate(id).unwrap();
    assert_eq!(0, fs.stat(id).unwrap().size);

    let mut buf = [0u8; 8];
    assert_eq!(0, fs.read_at(id, 0, &mut buf).unwrap());

    // 归还的块立即可以重写
    fs.write_at(id, 0, &vec![2u8; 5 * BLOCK_SIZE]).unwrap();

    assert_eq!(Err(Error::IsADirectory), fs.truncate(ROOT));
}

#[test]
fn dir_compaction_spans_blocks() {
    let mut fs = fresh("flatfs-compact.img");

    // 40个目录项占两个数据块
    let mut ids = Vec::new();
    for i in 0..40 {
        ids.push(fs.create(ROOT, &format!("f{i:02}")).unwrap());
    }
    assert_eq!(Some(40), fs.stat(ROOT).unwrap().entries);

    // 删掉首块里的项后，其后的目录项跨块全体左移
    fs.remove(ROOT, "f00").unwrap();
    assert_eq!(None, fs.lookup("/f00").unwrap());
    assert_eq!(Some(39), fs.stat(ROOT).unwrap().entries);
    for i in 1..40 {
        assert_eq!(Some(ids[i]), fs.lookup(&format!("/f{i:02}")).unwrap());
    }

    // 继续删到只剩一个块，目录大小缩回块边界
    for i in 1..8 {
        fs.remove(ROOT, &format!("f{i:02}")).unwrap();
    }
    let stat = fs.stat(ROOT).unwrap();
    assert_eq!(Some(32), stat.entries);
    assert_eq!(BLOCK_SIZE as u32, stat.size);
    for i in 8..40 {
        assert_eq!(Some(ids[i]), fs.lookup(&format!("/f{i:02}")).unwrap());
    }

    // 紧缩后的目录还能正常追加
    fs.create(ROOT, "after").unwrap();
    assert_eq!(Some(33), fs.stat(ROOT).unwrap().entries);

    let names: Vec<String> = fs
        .readdir(ROOT, 64)
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!("f08", names[0]);
    assert_eq!("after", names[32]);
}
