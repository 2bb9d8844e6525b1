//! Background mesh generation.
//!
//! Each worker owns a ring of job slots and four cursors. The main thread
//! advances `last_submitted` when it hands over a job and `upload` when it
//! collects a result; the worker advances `generate` when it takes a job and
//! `generate_ready` when the result is in place. Cursors only grow; slot =
//! cursor % ring. The cursor lock is never held while meshing.
//!
//! Output buffers belong to the slot: the worker meshes into the slot's
//! spare buffers and the main thread hands them back with
//! [`MeshPipeline::recycle`] once uploaded, so their allocations carry over
//! to the next job in that slot.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tessel_blocks::MaterialTable;
use tessel_mesh_cpu::{ChunkMesher, MeshBuffers, Neighborhood};
use tessel_world::{ChunkCoord, ChunkId};

use crate::error::StreamError;

pub struct MeshJob {
    pub chunk: ChunkId,
    pub generation: u32,
    /// `Chunk::mesh_request` at submission time.
    pub request: u32,
    pub coord: ChunkCoord,
    pub voxel_signature: u64,
    pub neighborhood: Neighborhood,
}

pub struct MeshResult {
    pub chunk: ChunkId,
    pub generation: u32,
    pub request: u32,
    pub coord: ChunkCoord,
    pub voxel_signature: u64,
    pub buffers: MeshBuffers,
    /// The mesher panicked; `buffers` is empty.
    pub failed: bool,
    pub elapsed: Duration,
    cursor: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitError {
    /// The owning worker's ring is full; try again next frame.
    Full,
    ShutDown,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Cursors {
    last_submitted: u64,
    generate: u64,
    generate_ready: u64,
    upload: u64,
    shutdown: bool,
}

#[derive(Default)]
struct Slot {
    job: Option<MeshJob>,
    result: Option<MeshResult>,
    spare: Option<MeshBuffers>,
}

struct Worker {
    cursors: Mutex<Cursors>,
    wake: Condvar,
    slots: Vec<Mutex<Slot>>,
}

impl Worker {
    fn new(ring: usize) -> Self {
        Self {
            cursors: Mutex::new(Cursors::default()),
            wake: Condvar::new(),
            slots: (0..ring).map(|_| Mutex::new(Slot::default())).collect(),
        }
    }

    #[inline]
    fn ring(&self) -> u64 {
        self.slots.len() as u64
    }

    fn cursors(&self) -> MutexGuard<'_, Cursors> {
        self.cursors.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(&self, cursor: u64) -> MutexGuard<'_, Slot> {
        self.slots[(cursor % self.ring()) as usize]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

pub struct MeshPipeline {
    workers: Vec<Arc<Worker>>,
    running: Arc<AtomicUsize>,
    pool: Option<ThreadPool>,
}

impl MeshPipeline {
    pub fn new(workers: usize, ring_size: usize, materials: Arc<MaterialTable>) -> Result<Self, StreamError> {
        let n = workers.max(1);
        let ring = ring_size.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("tessel-mesh-{i}"))
            .build()?;
        let running = Arc::new(AtomicUsize::new(0));
        let workers: Vec<Arc<Worker>> = (0..n).map(|_| Arc::new(Worker::new(ring))).collect();
        for (i, w) in workers.iter().enumerate() {
            let w = Arc::clone(w);
            let materials = Arc::clone(&materials);
            let running = Arc::clone(&running);
            running.fetch_add(1, Ordering::SeqCst);
            pool.spawn(move || {
                worker_loop(i, &w, &materials);
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }
        debug!("mesh pipeline started: {n} workers, ring {ring}");
        Ok(Self {
            workers,
            running,
            pool: Some(pool),
        })
    }

    #[inline]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Worker a chunk's jobs always go to.
    #[inline]
    pub fn worker_for(&self, chunk: ChunkId) -> usize {
        chunk.index() % self.workers.len()
    }

    /// True when a submission for `chunk` would currently be accepted.
    pub fn has_room(&self, chunk: ChunkId) -> bool {
        let w = &self.workers[self.worker_for(chunk)];
        let c = w.cursors();
        !c.shutdown && c.last_submitted + 1 - c.upload <= w.ring()
    }

    /// Hands a job to its worker without blocking. On `Full` the job is
    /// dropped; the caller keeps the chunk pending and rebuilds it later.
    pub fn submit(&self, job: MeshJob) -> Result<(), SubmitError> {
        let w = &self.workers[self.worker_for(job.chunk)];
        {
            let mut c = w.cursors();
            if c.shutdown {
                return Err(SubmitError::ShutDown);
            }
            if c.last_submitted + 1 - c.upload > w.ring() {
                return Err(SubmitError::Full);
            }
            let n = c.last_submitted + 1;
            {
                let mut slot = w.slot(n);
                slot.result = None;
                slot.job = Some(job);
            }
            c.last_submitted = n;
        }
        w.wake.notify_one();
        Ok(())
    }

    /// Collects finished results in submission order per worker until
    /// `deadline`. Never waits for a worker.
    pub fn drain_ready(&self, deadline: Instant) -> Vec<MeshResult> {
        let mut out = Vec::new();
        for w in &self.workers {
            let ready = w.cursors().generate_ready;
            let mut upload = w.cursors().upload;
            while upload < ready {
                if Instant::now() >= deadline && !out.is_empty() {
                    return out;
                }
                let n = upload + 1;
                if let Some(r) = w.slot(n).result.take() {
                    out.push(r);
                }
                w.cursors().upload = n;
                upload = n;
            }
        }
        out
    }

    /// Returns a collected result's buffers to the slot that produced them.
    /// Dropped instead if the slot already holds a spare set.
    pub fn recycle(&self, result: MeshResult) {
        let w = &self.workers[self.worker_for(result.chunk)];
        let mut slot = w.slot(result.cursor);
        if slot.spare.is_none() {
            slot.spare = Some(result.buffers);
        }
    }

    /// Jobs submitted and not yet collected.
    pub fn in_flight(&self) -> usize {
        self.workers
            .iter()
            .map(|w| {
                let c = w.cursors();
                (c.last_submitted - c.upload) as usize
            })
            .sum()
    }

    pub fn is_running(&self) -> bool {
        self.pool.is_some()
    }

    /// Wakes every worker, asks it to exit, and waits a bounded time for
    /// them to leave. Safe to call more than once.
    pub fn shutdown(&mut self) {
        let Some(pool) = self.pool.take() else {
            return;
        };
        for w in &self.workers {
            w.cursors().shutdown = true;
            w.wake.notify_all();
        }
        let mut tries = 0;
        while self.running.load(Ordering::SeqCst) > 0 && tries < 400 {
            thread::sleep(Duration::from_millis(5));
            tries += 1;
        }
        let left = self.running.load(Ordering::SeqCst);
        if left > 0 {
            warn!("mesh pipeline shutdown: {left} workers still busy");
        } else {
            debug!("mesh pipeline stopped");
        }
        drop(pool);
    }
}

impl Drop for MeshPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, w: &Worker, materials: &MaterialTable) {
    let mut mesher = ChunkMesher::new(materials);
    loop {
        let n = {
            let mut c = w.cursors();
            while c.generate == c.last_submitted && !c.shutdown {
                c = w.wake.wait(c).unwrap_or_else(|e| e.into_inner());
            }
            if c.shutdown {
                return;
            }
            c.generate += 1;
            c.generate
        };
        let (job, spare) = {
            let mut slot = w.slot(n);
            (slot.job.take(), slot.spare.take())
        };
        let Some(job) = job else {
            w.slot(n).spare = spare;
            w.cursors().generate_ready = n;
            continue;
        };
        let t0 = Instant::now();
        let mut buffers = spare.unwrap_or_default();
        let built = panic::catch_unwind(AssertUnwindSafe(|| {
            mesher.build(&job.neighborhood, &mut buffers);
        }));
        let failed = built.is_err();
        if failed {
            error!("tessel-mesh-{index}: mesher panicked on chunk {:?}", job.coord);
            buffers = MeshBuffers::default();
            mesher = ChunkMesher::new(materials);
        }
        let result = MeshResult {
            chunk: job.chunk,
            generation: job.generation,
            request: job.request,
            coord: job.coord,
            voxel_signature: job.voxel_signature,
            buffers,
            failed,
            elapsed: t0.elapsed(),
            cursor: n,
        };
        w.slot(n).result = Some(result);
        w.cursors().generate_ready = n;
    }
}
