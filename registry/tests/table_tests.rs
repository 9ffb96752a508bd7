//! Table lookup, creation and locking across images

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use common::{dram, image, image_with, tag};
use gres_hwinit::PhysMem;
use gres_registry::{Locking, RegistryConfig, RegistryError};

#[test]
fn test_lookup_on_untouched_table() {
    let mem = dram();
    let ctx = image(&mem);
    assert_eq!(ctx.get(tag("queue-id"), Locking::Lock), Err(RegistryError::NotFound));
    assert_eq!(ctx.entry_count(Locking::Lock), Ok(0));
}

#[test]
fn test_create_is_idempotent() {
    let mem = dram();
    let ctx = image(&mem);

    let first = ctx.create_if_absent(tag("fpa-pools"), 0x100, Locking::Lock).unwrap();
    let second = ctx.create_if_absent(tag("fpa-pools"), 0x4000, Locking::Lock).unwrap();

    assert!(first.newly_created);
    assert!(!second.newly_created);
    assert_eq!(first.addr, second.addr);
    assert_eq!(ctx.entry_count(Locking::Lock), Ok(1));
    // The size recorded is the first creator's
    assert_eq!(ctx.entry(tag("fpa-pools"), Locking::Lock).unwrap().size, 0x100);
}

#[test]
fn test_later_image_adopts_table() {
    let mem = dram();
    let first = image(&mem);
    let addr = first.create_if_absent(tag("pko-queues"), 0x80, Locking::Lock).unwrap().addr;
    mem.write_u64(addr, 0xfeed);

    let second = image(&mem);
    assert_eq!(second.init(), Ok(first.table_addr().unwrap()));
    assert_eq!(second.get(tag("pko-queues"), Locking::Lock), Ok(addr));
    assert_eq!(second.entry_count(Locking::Lock), Ok(1));
    // Adoption must not wipe what the first image stored
    assert_eq!(mem.read_u64(addr), 0xfeed);
}

#[test]
fn test_capacity_bound() {
    let mem = dram();
    let ctx = image(&mem);
    let names: Vec<String> = (0..=128).map(|i| format!("res-{:03}", i)).collect();

    let addrs: Vec<u64> = names[..128]
        .iter()
        .map(|n| ctx.create_if_absent(tag(n), 16, Locking::Lock).unwrap().addr)
        .collect();

    assert_eq!(
        ctx.create_if_absent(tag(&names[128]), 16, Locking::Lock),
        Err(RegistryError::CapacityExceeded)
    );
    assert_eq!(ctx.entry_count(Locking::Lock), Ok(128));
    for (name, addr) in names.iter().zip(&addrs) {
        assert_eq!(ctx.get(tag(name), Locking::Lock), Ok(*addr));
    }
    // Existing tags still resolve through create on a full table
    assert!(!ctx.create_if_absent(tag(&names[5]), 16, Locking::Lock).unwrap().newly_created);
}

#[test]
fn test_small_capacity_config() {
    let mem = dram();
    let config = RegistryConfig {
        capacity: 2,
        ..RegistryConfig::default()
    };
    let ctx = image_with(&mem, config);

    ctx.create_if_absent(tag("a"), 16, Locking::Lock).unwrap();
    ctx.create_if_absent(tag("b"), 16, Locking::Lock).unwrap();
    assert_eq!(
        ctx.create_if_absent(tag("c"), 16, Locking::Lock),
        Err(RegistryError::CapacityExceeded)
    );
}

#[test]
fn test_pool_exhaustion_reported() {
    let mem = dram();
    let ctx = image(&mem);
    assert_eq!(
        ctx.create_if_absent(tag("huge"), 1 << 40, Locking::Lock),
        Err(RegistryError::AllocationFailed)
    );
    assert_eq!(ctx.entry_count(Locking::Lock), Ok(0));
}

#[test]
fn test_concurrent_create_of_same_tag() {
    let mem = dram();
    let barrier = Barrier::new(2);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(|| {
                    let ctx = image(&mem);
                    barrier.wait();
                    ctx.create_if_absent(tag("shared-pool"), 0x400, Locking::Lock).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results[0].addr, results[1].addr);
    assert_eq!(results.iter().filter(|c| c.newly_created).count(), 1);
    assert_eq!(image(&mem).entry_count(Locking::Lock), Ok(1));
}

#[test]
fn test_concurrent_table_init() {
    let mem = dram();
    let barrier = Barrier::new(4);

    let bases: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    let ctx = image(&mem);
                    barrier.wait();
                    ctx.init().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(bases.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(image(&mem).bootmem().named_block_count(), 1);
}

#[test]
fn test_locked_creates_never_lose_entries() {
    let mem = dram();
    let barrier = Barrier::new(4);

    thread::scope(|s| {
        for t in 0..4 {
            let (mem, barrier) = (&mem, &barrier);
            s.spawn(move || {
                let ctx = image(mem);
                barrier.wait();
                for i in 0..16 {
                    let name = format!("t{}-{}", t, i);
                    assert!(ctx.create_if_absent(tag(&name), 16, Locking::Lock).unwrap().newly_created);
                }
            });
        }
    });

    let ctx = image(&mem);
    assert_eq!(ctx.entry_count(Locking::Lock), Ok(64));
    for t in 0..4 {
        for i in 0..16 {
            assert!(ctx.get(tag(&format!("t{}-{}", t, i)), Locking::Lock).is_ok());
        }
    }
}

#[test]
fn test_no_lock_bypasses_held_table_lock() {
    let mem = dram();
    let writer = image(&mem);
    let reader = image(&mem);
    reader.init().unwrap();
    let locked_done = AtomicBool::new(false);

    thread::scope(|s| {
        let guard = writer.lock_table().unwrap();
        let addr = writer.create_if_absent(tag("in-flight"), 64, Locking::NoLock).unwrap().addr;

        // An unlocked reader walks straight past the held lock
        let peek = s.spawn(|| reader.get(tag("in-flight"), Locking::NoLock)).join().unwrap();
        assert_eq!(peek, Ok(addr));

        // A locked reader waits for the writer to finish
        let locked = s.spawn(|| {
            let found = reader.get(tag("in-flight"), Locking::Lock);
            locked_done.store(true, Ordering::SeqCst);
            found
        });
        thread::sleep(Duration::from_millis(50));
        assert!(!locked_done.load(Ordering::SeqCst));

        drop(guard);
        assert_eq!(locked.join().unwrap(), Ok(addr));
    });
}

#[test]
fn test_show_dumps_without_error() {
    let mem = dram();
    let ctx = image(&mem);
    ctx.create_if_absent(tag("cvm_pko_queues"), 0x100, Locking::Lock).unwrap();
    assert_eq!(ctx.show(Locking::Lock), Ok(()));
}
