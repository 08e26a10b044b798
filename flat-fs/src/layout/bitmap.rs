use crate::block_cache::CacheManager;
use crate::BLOCK_BITS;

/// 位图区域内块的结构
type BitmapBlock = [u64; BLOCK_BITS / 64];

/// 位图区域，记录其指示资源（数据块或inode槽位）的分配情况
#[derive(Debug)]
pub struct Bitmap {
    /// 位图的起始块
    start_block_id: usize,
    /// 位图占用块数
    blocks: usize,
    /// 有效位数；之后的位恒为0，永不分配
    capacity: usize,
}

/// 位编号
struct BitId(u32);

impl Bitmap {
    #[inline]
    pub fn new(start_block_id: usize, blocks: usize, capacity: usize) -> Self {
        assert!(capacity <= blocks * BLOCK_BITS);
        Self {
            start_block_id,
            blocks,
            capacity,
        }
    }

    /// 按编号升序分配第一个空闲位，返回其编号。
    /// 可分配位用尽时返回空。
    pub fn alloc(&self, cache: &CacheManager) -> Option<u32> {
        for block_index in 0..self.blocks {
            let block = cache.get(self.start_block_id + block_index);
            let mut block = block.lock();
            let bitmap_block: &mut BitmapBlock = block.get_mut(0);

            let Some((group_index, ingroup_index)) =
                bitmap_block
                    .iter()
                    .enumerate()
                    .find_map(|(group_index, &bits)| {
                        (bits != u64::MAX).then_some((group_index, bits.trailing_ones()))
                    })
            else {
                continue;
            };

            let id = BitId::encode(block_index, group_index, ingroup_index as usize);
            // 容量之外的位恒空，首个空闲位越界即已用尽
            if id.0 as usize >= self.capacity {
                return None;
            }

            // 追加新位
            bitmap_block[group_index] |= 1 << ingroup_index;
            return Some(id.0);
        }

        None
    }

    pub fn dealloc(&self, cache: &CacheManager, id: u32) {
        debug_assert!((id as usize) < self.capacity);
        let (block_index, group_index, ingroup_index) = BitId(id).decode();
        let block = cache.get(self.start_block_id + block_index);
        let mut block = block.lock();
        let bitmap_block: &mut BitmapBlock = block.get_mut(0);

        if bitmap_block[group_index] & (1 << ingroup_index) == 0 {
            // 重复释放说明元数据已出问题，记录下来但不给调用者添乱
            log::warn!("bitmap: double free of bit {id}");
            return;
        }

        bitmap_block[group_index] &= !(1 << ingroup_index);
    }

    /// 查询编号对应的位是否已分配
    pub fn is_set(&self, cache: &CacheManager, id: u32) -> bool {
        debug_assert!((id as usize) < self.capacity);
        let (block_index, group_index, ingroup_index) = BitId(id).decode();
        cache
            .get(self.start_block_id + block_index)
            .lock()
            .map(0, |bitmap_block: &BitmapBlock| {
                bitmap_block[group_index] & (1 << ingroup_index) != 0
            })
    }
}

impl BitId {
    /// 线性映射编码得到位编号
    #[inline]
    fn encode(block_index: usize, group_index: usize, ingroup_index: usize) -> Self {
        Self((block_index * BLOCK_BITS + group_index * 64 + ingroup_index) as u32)
    }

    fn decode(self) -> (usize, usize, usize) {
        let mut id = self.0 as usize;

        let block_index = id / BLOCK_BITS;
        id %= BLOCK_BITS;
        (block_index, id / 64, id % 64)
    }
}
