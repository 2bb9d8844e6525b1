//! Incremental discovery of chunk coordinates around the observer.
//!
//! The octree stores no chunk data. Its nodes are chunk-aligned cuboids with
//! an `explored` flag; walking it depth-first from a persistent stack yields
//! every chunk-sized cell inside the view exactly once, a few per frame.
//! Invalidating a leaf clears the flag up through its ancestors so the cell
//! can be discovered again.

use hashbrown::HashMap;
use tessel_geom::Frustum;
use tessel_world::{ChunkCoord, NodeId};

use crate::render_queue::cuboid_aabb;

#[derive(Clone, Copy, Debug)]
struct Node {
    min: ChunkCoord,
    size: i32,
    parent: Option<NodeId>,
    children: Option<[NodeId; 8]>,
    explored: bool,
    live: bool,
}

/// A chunk-sized cell accepted by the visibility test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub coord: ChunkCoord,
    pub leaf: NodeId,
}

pub struct VisibilityOctree {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
    roots: HashMap<ChunkCoord, NodeId>,
    root_edge: i32,
    stack: Vec<NodeId>,
    stack_capacity: usize,
    observer: ChunkCoord,
    center_cell: Option<ChunkCoord>,
    view_xz: i32,
    view_y: i32,
    dropped: usize,
}

impl VisibilityOctree {
    pub fn new(view_xz: i32, view_y: i32, stack_capacity: usize) -> Self {
        let view_xz = view_xz.max(0);
        let view_y = view_y.max(0);
        let root_edge = (view_xz.max(view_y).max(1) as u32).next_power_of_two() as i32;
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            roots: HashMap::new(),
            root_edge,
            stack: Vec::with_capacity(stack_capacity),
            stack_capacity: stack_capacity.max(1),
            observer: ChunkCoord::default(),
            center_cell: None,
            view_xz,
            view_y,
            dropped: 0,
        }
    }

    #[inline]
    pub fn root_edge(&self) -> i32 {
        self.root_edge
    }

    #[inline]
    pub fn observer(&self) -> ChunkCoord {
        self.observer
    }

    pub fn root_cell(&self, c: ChunkCoord) -> ChunkCoord {
        let e = self.root_edge;
        ChunkCoord::new(c.cx.div_euclid(e), c.cy.div_euclid(e), c.cz.div_euclid(e))
    }

    /// Nothing left to visit until the next recenter or invalidation.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.stack.is_empty()
    }

    #[inline]
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub fn live_nodes(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Pushes dropped because the stack was full since the last call.
    pub fn take_dropped(&mut self) -> usize {
        std::mem::take(&mut self.dropped)
    }

    fn alloc(&mut self, min: ChunkCoord, size: i32, parent: Option<NodeId>) -> NodeId {
        let node = Node {
            min,
            size,
            parent,
            children: None,
            explored: false,
            live: true,
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = node;
            id
        } else {
            let id = NodeId(self.nodes.len() as u32);
            self.nodes.push(node);
            id
        }
    }

    /// Frees a subtree, collecting the coordinates of its explored leaves.
    fn free_subtree(&mut self, root: NodeId, leaves: &mut Vec<ChunkCoord>) {
        let mut work = vec![root];
        while let Some(id) = work.pop() {
            let node = &mut self.nodes[id.index()];
            if !node.live {
                continue;
            }
            node.live = false;
            if node.size == 1 && node.explored {
                leaves.push(node.min);
            }
            if let Some(children) = node.children.take() {
                work.extend_from_slice(&children);
            }
            self.free.push(id);
        }
    }

    /// Moves the root ring to surround `observer` and rebuilds the stack.
    /// Returns leaf coordinates of roots that fell out of the ring; their
    /// node ids are no longer valid.
    pub fn recenter(&mut self, observer: ChunkCoord) -> Vec<ChunkCoord> {
        self.observer = observer;
        let cell = self.root_cell(observer);
        let mut released = Vec::new();
        if self.center_cell != Some(cell) {
            let stale: Vec<(ChunkCoord, NodeId)> = self
                .roots
                .iter()
                .filter(|(c, _)| (c.cx - cell.cx).abs() > 1 || (c.cy - cell.cy).abs() > 1 || (c.cz - cell.cz).abs() > 1)
                .map(|(c, id)| (*c, *id))
                .collect();
            for (c, id) in stale {
                self.roots.remove(&c);
                self.free_subtree(id, &mut released);
            }
            for dy in -1..=1 {
                for dz in -1..=1 {
                    for dx in -1..=1 {
                        let rc = cell.offset(dx, dy, dz);
                        if !self.roots.contains_key(&rc) {
                            let e = self.root_edge;
                            let min = ChunkCoord::new(rc.cx * e, rc.cy * e, rc.cz * e);
                            let id = self.alloc(min, e, None);
                            self.roots.insert(rc, id);
                        }
                    }
                }
            }
            self.center_cell = Some(cell);
        }
        self.rebuild_stack();
        released
    }

    /// Restarts the walk from every root not yet fully explored. Explored
    /// flags are kept.
    pub fn rebuild_stack(&mut self) {
        self.stack.clear();
        let mut pending: Vec<(i64, NodeId)> = self
            .roots
            .values()
            .filter(|id| !self.nodes[id.index()].explored)
            .map(|&id| (self.xz_dist_sq(id), id))
            .collect();
        pending.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(b.1.0.cmp(&a.1.0)));
        for (_, id) in pending {
            self.push(id);
        }
    }

    /// Squared XZ distance from the observer to the nearest cell of a node.
    fn xz_dist_sq(&self, id: NodeId) -> i64 {
        let n = &self.nodes[id.index()];
        let dx = i64::from(axis_gap(self.observer.cx, n.min.cx, n.size));
        let dz = i64::from(axis_gap(self.observer.cz, n.min.cz, n.size));
        dx * dx + dz * dz
    }

    /// Keeps the nearer of the new node and the current top on top.
    fn push(&mut self, id: NodeId) {
        if self.stack.len() >= self.stack_capacity {
            self.dropped += 1;
            return;
        }
        let d = self.xz_dist_sq(id);
        match self.stack.last() {
            Some(&top) if d > self.xz_dist_sq(top) => {
                let at = self.stack.len() - 1;
                self.stack.insert(at, id);
            }
            _ => self.stack.push(id),
        }
    }

    fn accepts(&self, n: &Node, frustum: Option<&Frustum>) -> bool {
        let o = self.observer;
        if axis_gap(o.cx, n.min.cx, n.size) > self.view_xz
            || axis_gap(o.cz, n.min.cz, n.size) > self.view_xz
            || axis_gap(o.cy, n.min.cy, n.size) > self.view_y
        {
            return false;
        }
        match frustum {
            Some(f) => f.intersects_aabb(&cuboid_aabb(n.min, n.size)),
            None => true,
        }
    }

    fn ensure_children(&mut self, id: NodeId) -> [NodeId; 8] {
        if let Some(children) = self.nodes[id.index()].children {
            return children;
        }
        let Node { min, size, .. } = self.nodes[id.index()];
        let h = size / 2;
        let children: [NodeId; 8] = std::array::from_fn(|i| {
            let i = i as i32;
            let c = min.offset((i & 1) * h, ((i >> 1) & 1) * h, ((i >> 2) & 1) * h);
            self.alloc(c, h, Some(id))
        });
        self.nodes[id.index()].children = Some(children);
        children
    }

    /// Marks ancestors explored once all of their children are.
    fn settle_up(&mut self, mut parent: Option<NodeId>) {
        while let Some(p) = parent {
            let Some(children) = self.nodes[p.index()].children else {
                break;
            };
            if !children.iter().all(|c| self.nodes[c.index()].explored) {
                break;
            }
            self.nodes[p.index()].explored = true;
            parent = self.nodes[p.index()].parent;
        }
    }

    /// Visits stacked cuboids until one resolves to an accepted chunk cell,
    /// which is marked explored and returned. `None` once the stack is empty.
    /// Rejected cuboids stay unexplored.
    pub fn next_candidate(&mut self, frustum: Option<&Frustum>) -> Option<Candidate> {
        while let Some(id) = self.stack.pop() {
            let node = self.nodes[id.index()];
            if !node.live || node.explored || !self.accepts(&node, frustum) {
                continue;
            }
            if node.size <= 1 {
                self.nodes[id.index()].explored = true;
                self.settle_up(node.parent);
                return Some(Candidate { coord: node.min, leaf: id });
            }
            let children = self.ensure_children(id);
            let mut order: Vec<NodeId> = children
                .into_iter()
                .filter(|c| !self.nodes[c.index()].explored)
                .collect();
            if order.is_empty() {
                self.nodes[id.index()].explored = true;
                self.settle_up(node.parent);
                continue;
            }
            order.sort_unstable_by_key(|&c| std::cmp::Reverse(self.xz_dist_sq(c)));
            for c in order {
                self.push(c);
            }
        }
        None
    }

    /// Clears `explored` on a leaf and its ancestors and queues its root for
    /// another walk. Ignored if `leaf` no longer describes `coord`.
    pub fn invalidate(&mut self, leaf: NodeId, coord: ChunkCoord) -> bool {
        let Some(n) = self.nodes.get(leaf.index()) else {
            return false;
        };
        if !n.live || n.size != 1 || n.min != coord {
            return false;
        }
        let mut at = leaf;
        loop {
            let node = &mut self.nodes[at.index()];
            node.explored = false;
            match node.parent {
                Some(p) => at = p,
                None => break,
            }
        }
        self.push(at);
        true
    }
}

/// Distance along one axis from `o` to the span `[min, min + size)`.
#[inline]
fn axis_gap(o: i32, min: i32, size: i32) -> i32 {
    if o < min {
        min - o
    } else if o >= min + size {
        o - (min + size - 1)
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use hashbrown::HashMap;
    use tessel_geom::Vec3;

    use super::*;

    fn drain(t: &mut VisibilityOctree, frustum: Option<&Frustum>) -> Vec<Candidate> {
        std::iter::from_fn(|| t.next_candidate(frustum)).collect()
    }

    #[test]
    fn root_edge_is_power_of_two() {
        assert_eq!(VisibilityOctree::new(4, 2, 64).root_edge(), 4);
        assert_eq!(VisibilityOctree::new(5, 2, 64).root_edge(), 8);
        assert_eq!(VisibilityOctree::new(0, 0, 64).root_edge(), 1);
    }

    #[test]
    fn static_observer_visits_each_cell_once() {
        let mut t = VisibilityOctree::new(3, 2, 1024);
        t.recenter(ChunkCoord::new(1, -1, 2));
        let got = drain(&mut t, None);
        let mut seen: HashMap<ChunkCoord, usize> = HashMap::new();
        for c in &got {
            *seen.entry(c.coord).or_default() += 1;
        }
        assert_eq!(seen.len(), 7 * 7 * 5);
        assert!(seen.values().all(|&n| n == 1));
        assert!(seen.keys().all(|c| ChunkCoord::new(1, -1, 2).within_view(*c, 3, 2)));
        // A rebuild alone finds nothing new.
        t.rebuild_stack();
        assert!(drain(&mut t, None).is_empty());
        assert!(t.is_idle());
    }

    #[test]
    fn nearer_cells_come_first() {
        let mut t = VisibilityOctree::new(4, 1, 1024);
        let o = ChunkCoord::new(0, 0, 0);
        t.recenter(o);
        let got = drain(&mut t, None);
        assert_eq!(got.len(), 9 * 9 * 3);
        assert_eq!(got[0].coord.distance_xz_sq(o), 0);
        let half = got.len() / 2;
        let mean = |s: &[Candidate]| s.iter().map(|c| c.coord.distance_xz_sq(o)).sum::<i64>() as f64 / s.len() as f64;
        assert!(mean(&got[..half]) < mean(&got[half..]));
    }

    #[test]
    fn invalidated_leaf_is_rediscovered_once() {
        let mut t = VisibilityOctree::new(2, 2, 256);
        t.recenter(ChunkCoord::new(0, 0, 0));
        let got = drain(&mut t, None);
        let target = got[got.len() / 2];
        assert!(t.invalidate(target.leaf, target.coord));
        assert!(!t.invalidate(target.leaf, target.coord.offset(1, 0, 0)));
        let again = drain(&mut t, None);
        assert_eq!(again, vec![target]);
    }

    #[test]
    fn moving_keeps_explored_cells_and_finds_new_ones() {
        let mut t = VisibilityOctree::new(2, 1, 256);
        t.recenter(ChunkCoord::new(0, 0, 0));
        let first = drain(&mut t, None);
        assert_eq!(first.len(), 5 * 5 * 3);
        t.recenter(ChunkCoord::new(1, 0, 0));
        let second = drain(&mut t, None);
        assert_eq!(second.len(), 5 * 3);
        assert!(second.iter().all(|c| c.coord.cx == 3));
    }

    #[test]
    fn leaving_the_ring_releases_leaves() {
        let mut t = VisibilityOctree::new(2, 2, 256);
        t.recenter(ChunkCoord::new(0, 0, 0));
        drain(&mut t, None);
        let before = t.live_nodes();
        let released = t.recenter(ChunkCoord::new(40, 0, 0));
        assert_eq!(released.len(), 5 * 5 * 5);
        assert!(t.live_nodes() < before + 27);
        assert_eq!(drain(&mut t, None).len(), 5 * 5 * 5);
    }

    #[test]
    fn frustum_rejected_cells_wait_for_a_rebuild() {
        let mut t = VisibilityOctree::new(2, 0, 256);
        t.recenter(ChunkCoord::new(0, 0, 0));
        let looking_pos_z = Frustum::from_camera(
            Vec3::new(8.0, 8.0, 8.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::UP,
            1.5,
            1.0,
            0.1,
            500.0,
        );
        let ahead = drain(&mut t, Some(&looking_pos_z));
        assert!(!ahead.is_empty());
        assert!(ahead.iter().all(|c| c.coord.cz >= 0));
        t.rebuild_stack();
        let rest = drain(&mut t, None);
        assert_eq!(ahead.len() + rest.len(), 5 * 5);
        assert!(rest.iter().any(|c| c.coord.cz < 0));
    }

    #[test]
    fn full_stack_drops_and_reports() {
        let mut t = VisibilityOctree::new(4, 4, 4);
        t.recenter(ChunkCoord::new(0, 0, 0));
        assert!(t.take_dropped() > 0);
        assert_eq!(t.take_dropped(), 0);
        assert!(t.stack_len() <= 4);
    }
}
