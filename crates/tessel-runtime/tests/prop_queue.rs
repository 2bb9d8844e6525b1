use proptest::prelude::*;
use tessel_chunk::{Acquired, ArenaConfig, ChunkArena, ReuseQuery};
use tessel_runtime::QueueFlags;
use tessel_runtime::RenderQueue;
use tessel_runtime::render_queue::{EnqueueOutcome, PopQuery};
use tessel_world::{ChunkCoord, ChunkId};

const CHUNKS: usize = 12;

fn arena() -> (ChunkArena, Vec<ChunkId>) {
    let mut arena = ChunkArena::new(ArenaConfig {
        capacity: CHUNKS,
        grow_batch: CHUNKS,
        reuse_margin: 0,
    });
    let mut ids = Vec::new();
    for i in 0..CHUNKS as i32 {
        let c = ChunkCoord::new(i - 6, i % 3, 2 * i - 11);
        let q = ReuseQuery {
            target: c,
            observer: c,
            view_xz: 0,
            view_y: 0,
        };
        let Acquired::Fresh(id) = arena.acquire(&q, |_| true) else {
            panic!("arena should have room");
        };
        arena.assign(id, c);
        ids.push(id);
    }
    (arena, ids)
}

#[derive(Clone, Debug)]
enum Op {
    Enqueue(usize, bool),
    Remove(usize),
    Pop,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..CHUNKS, any::<bool>()).prop_map(|(i, fresh)| Op::Enqueue(i, fresh)),
        1 => (0..CHUNKS).prop_map(Op::Remove),
        1 => Just(Op::Pop),
    ]
}

proptest! {
    #[test]
    fn occupancy_tracks_distinct_members(ops in proptest::collection::vec(op(), 1..80), cap in 3usize..10) {
        let (mut arena, ids) = arena();
        let mut queue = RenderQueue::new(cap);
        let mut members = [false; CHUNKS];
        let q = PopQuery {
            observer: ChunkCoord::new(0, 0, 0),
            frustum: None,
            frustum_epoch: 1,
            accepted_dist_sq: 4.0,
            force_dist_sq: 0.0,
            early_exit_dist_sq: 0.0,
            max_scan: 64,
        };
        for op in ops {
            match op {
                Op::Enqueue(i, fresh) => {
                    let flags = if fresh { QueueFlags::REFRESH } else { QueueFlags::LIGHT };
                    let out = queue.enqueue(arena.get_mut(ids[i]), flags);
                    match out {
                        EnqueueOutcome::Added => {
                            prop_assert!(!members[i]);
                            members[i] = true;
                        }
                        EnqueueOutcome::Merged => prop_assert!(members[i]),
                        EnqueueOutcome::Exhausted => {
                            prop_assert!(!members[i]);
                            prop_assert_eq!(queue.len(), queue.capacity());
                        }
                    }
                }
                Op::Remove(i) => {
                    let removed = queue.remove(arena.get_mut(ids[i]));
                    prop_assert_eq!(removed, members[i]);
                    members[i] = false;
                }
                Op::Pop => {
                    match queue.pop_nearest(&mut arena, &q) {
                        Some((id, _)) => {
                            let i = ids.iter().position(|&x| x == id).unwrap();
                            prop_assert!(members[i]);
                            members[i] = false;
                        }
                        None => prop_assert!(members.iter().all(|m| !m)),
                    }
                }
            }
            prop_assert_eq!(queue.len(), members.iter().filter(|m| **m).count());
            for (i, &id) in ids.iter().enumerate() {
                prop_assert_eq!(arena.get(id).in_queue, members[i]);
                prop_assert_eq!(queue.contains(id), members[i]);
            }
        }
        // Draining yields every member exactly once.
        let mut drained = 0;
        while let Some((id, _)) = queue.pop_nearest(&mut arena, &q) {
            let i = ids.iter().position(|&x| x == id).unwrap();
            prop_assert!(members[i]);
            members[i] = false;
            drained += 1;
        }
        prop_assert!(members.iter().all(|m| !m));
        prop_assert!(drained <= queue.capacity());
        prop_assert!(queue.is_empty());
    }
}
