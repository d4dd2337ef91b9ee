// Property tests against simple reference models
use proptest::prelude::*;
use std::collections::VecDeque;
use tiermem_core::himem::{EmulatedProvider, HimemAllocator};
use tiermem_core::{CacheHandler, DirectCache, FastCache, MemoryBackend, PageCache, Result};

struct Identity;

impl CacheHandler<u64> for Identity {
    fn on_fault(&mut self, key: u64) -> Result<u64> {
        Ok(key)
    }

    fn on_flush(&mut self, _key: u64, _value: &mut u64) -> Result<()> {
        Ok(())
    }

    fn on_remove(&mut self, _key: u64, _value: u64) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum CacheOp {
    Add(u64),
    Get(u64),
    Remove(u64),
    Evict,
}

fn cache_op() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (0..32u64).prop_map(CacheOp::Add),
        (0..32u64).prop_map(CacheOp::Get),
        (0..32u64).prop_map(CacheOp::Remove),
        Just(CacheOp::Evict),
    ]
}

fn touch(model: &mut VecDeque<u64>, key: u64) {
    model.retain(|k| *k != key);
    model.push_front(key);
}

proptest! {
    #[test]
    fn lru_tail_is_least_recently_used(ops in prop::collection::vec(cache_op(), 1..200)) {
        let mut cache = FastCache::new(8).unwrap();
        let mut handler = Identity;
        // front = most recently used
        let mut model: VecDeque<u64> = VecDeque::new();

        for op in ops {
            match op {
                CacheOp::Add(key) => {
                    cache.add(key, key);
                    touch(&mut model, key);
                }
                CacheOp::Get(key) => {
                    prop_assert_eq!(*cache.get(key, &mut handler).unwrap(), key);
                    touch(&mut model, key);
                }
                CacheOp::Remove(key) => {
                    let resident = model.contains(&key);
                    prop_assert_eq!(cache.remove(key, &mut handler).unwrap(), resident);
                    model.retain(|k| *k != key);
                }
                CacheOp::Evict => {
                    let evicted = cache.evict(1, &mut handler).unwrap();
                    prop_assert_eq!(evicted, model.pop_back().map_or(0, |_| 1));
                }
            }

            prop_assert_eq!(cache.count(), model.len());
            prop_assert_eq!(
                cache.get_least_recently_used().map(|(key, _)| key),
                model.back().copied()
            );
        }

        prop_assert_eq!(cache.keys_by_recency(), model.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn direct_cache_never_reports_false_hits(
        capacity in 1..16usize,
        keys in prop::collection::vec(0..256u64, 1..100),
    ) {
        let mut cache = DirectCache::new(capacity).unwrap();
        for key in &keys {
            cache.set(*key, *key * 3);
        }
        for key in 0..256u64 {
            if let Some(value) = cache.get(key) {
                prop_assert_eq!(value, key * 3);
            }
        }
        let last = *keys.last().unwrap();
        prop_assert_eq!(cache.get(last), Some(last * 3));
    }

    #[test]
    fn free_list_keeps_every_block(blocks in 1..64u16, rounds in 1..5usize, seed in any::<u64>()) {
        let mut himem = HimemAllocator::init(EmulatedProvider::default(), 64, blocks).unwrap();
        for round in 0..rounds {
            let mut issued: Vec<u16> = (0..blocks).map(|_| himem.allocate_block().unwrap()).collect();
            prop_assert_eq!(himem.free_blocks(), 0);
            prop_assert!(himem.allocate_block().is_err());

            // free in a scrambled order
            let rotate = (seed as usize + round) % issued.len();
            issued.rotate_left(rotate);
            for block in issued {
                himem.free_block(block).unwrap();
            }
            prop_assert_eq!(himem.free_blocks(), blocks as usize);
        }
    }

    #[test]
    fn page_cache_matches_flat_memory(
        page_size in 4..40usize,
        pages in 1..6usize,
        writes in prop::collection::vec((0..1000u64, prop::collection::vec(any::<u8>(), 1..64)), 1..40),
    ) {
        let size = 1064;
        let mut model = vec![0u8; size];
        let mut cache = PageCache::heap("prop", page_size, pages, MemoryBackend::new(size)).unwrap();

        for (address, data) in &writes {
            cache.write(*address, data).unwrap();
            let start = *address as usize;
            model[start..start + data.len()].copy_from_slice(data);
            prop_assert!(cache.resident_pages() <= pages);
        }

        let mut buf = vec![0u8; size];
        cache.read(0, &mut buf).unwrap();
        prop_assert_eq!(&buf, &model);

        let backend = cache.deinit().unwrap();
        prop_assert_eq!(backend.bytes(), &model[..]);
    }
}
