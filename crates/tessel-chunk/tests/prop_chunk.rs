use proptest::prelude::*;
use tessel_chunk::{Acquired, ArenaConfig, ChunkArena, ChunkDirectory, ReuseQuery};
use tessel_world::{ChunkCoord, Face};

fn coord() -> impl Strategy<Value = ChunkCoord> {
    (-4i32..=4, -2i32..=2, -4i32..=4).prop_map(ChunkCoord::from)
}

fn acquire_into(
    arena: &mut ChunkArena,
    dir: &mut ChunkDirectory,
    q: &ReuseQuery,
) -> Option<Acquired> {
    let got = arena.acquire(q, |_| true);
    let id = match got {
        Acquired::Fresh(id) => id,
        Acquired::Reused { id, previous, .. } => {
            dir.remove(previous, arena);
            id
        }
        Acquired::Exhausted => return None,
    };
    arena.assign(id, q.target);
    dir.insert(q.target, id, arena);
    Some(got)
}

proptest! {
    // Neighbour links stay symmetric under any insert/remove interleaving
    #[test]
    fn neighbour_links_stay_symmetric(ops in proptest::collection::vec((coord(), any::<bool>()), 1..200)) {
        let mut arena = ChunkArena::new(ArenaConfig { capacity: 1024, grow_batch: 16, reuse_margin: 0 });
        let mut dir = ChunkDirectory::new();
        for (c, add) in ops {
            if add {
                if dir.lookup(c).is_none() {
                    let q = ReuseQuery { target: c, observer: c, view_xz: 0, view_y: 0 };
                    acquire_into(&mut arena, &mut dir, &q);
                }
            } else if let Some(id) = dir.lookup(c) {
                dir.remove(c, &mut arena);
                arena.release(id);
            }
        }
        for chunk in arena.iter_live() {
            prop_assert_eq!(dir.lookup(chunk.coord), Some(chunk.id));
            for face in Face::ALL {
                let expect = dir.lookup(chunk.coord.neighbor(face));
                prop_assert_eq!(chunk.neighbor(face), expect);
                if let Some(n) = expect {
                    prop_assert_eq!(arena.get(n).neighbor(face.opposite()), Some(chunk.id));
                }
            }
        }
        for chunk in arena.iter().filter(|c| !c.is_live()) {
            prop_assert!(chunk.neighbors.iter().all(Option::is_none));
        }
    }

    // Live records never exceed capacity; non-fallback reuse respects margin and view
    #[test]
    fn pool_is_bounded_and_reuse_respects_filters(
        capacity in 1usize..40,
        margin in 0i32..4,
        steps in proptest::collection::vec(((-30i32..30, -3i32..3, -30i32..30), (-20i32..20, -20i32..20)), 1..150),
    ) {
        let mut arena = ChunkArena::new(ArenaConfig { capacity, grow_batch: 7, reuse_margin: margin });
        let mut dir = ChunkDirectory::new();
        for (t, (ox, oz)) in steps {
            let target = ChunkCoord::from(t);
            if dir.lookup(target).is_some() {
                continue;
            }
            let q = ReuseQuery { target, observer: ChunkCoord::new(ox, 0, oz), view_xz: 2, view_y: 1 };
            let got = acquire_into(&mut arena, &mut dir, &q);
            if let Some(Acquired::Reused { previous, fallback, .. }) = got {
                prop_assert!(!q.observer.within_view(previous, q.view_xz, q.view_y));
                if !fallback {
                    prop_assert!(previous.distance_sq(target) > i64::from(margin * margin));
                }
            }
            prop_assert!(arena.live() <= capacity);
            prop_assert!(arena.allocated() <= capacity);
            prop_assert_eq!(arena.live(), dir.chunk_count());
        }
    }
}
