use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread;

use crate::common::io::Fd;
use crate::pool::{BufferPool, Job, JobTable, Segment};
use crate::queue::SpscQueue;
use crate::reverse::reverse_segment;

/// Poison job index: a failing stage pushes it downstream to wake and
/// terminate the ring. Real job indices never reach it (at most 126 jobs).
pub const POISON: u8 = 0xFF;

/// Default chunk size; also the bound on a line, terminator included.
pub const DEFAULT_BUF_SIZE: usize = 4096;
/// Default number of jobs in flight.
pub const DEFAULT_JOBS: usize = 4;
/// Default capacity of each inter-stage queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Pipeline tuning knobs. `validate` rejects anything the engine cannot
/// honor before a byte is read or a buffer allocated.
#[derive(Clone, Debug)]
pub struct Config {
    /// Bytes per pool buffer; every line (terminator included) must fit.
    pub buf_size: usize,
    /// Jobs in flight; the pool holds `2 * jobs + 1` buffers.
    pub jobs: usize,
    /// Capacity of each SPSC queue.
    pub queue_capacity: usize,
    /// Pin reader/worker/writer to cores 0/1/2.
    pub pin_cpus: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            buf_size: DEFAULT_BUF_SIZE,
            jobs: DEFAULT_JOBS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            pin_cpus: true,
        }
    }
}

impl Config {
    pub fn validate(&self) -> io::Result<()> {
        if self.buf_size < DEFAULT_BUF_SIZE {
            return Err(invalid_config("buffer size must be at least 4096 bytes"));
        }
        if self.jobs == 0 {
            return Err(invalid_config("at least one job must be in flight"));
        }
        if !(2..=128).contains(&self.queue_capacity) || !self.queue_capacity.is_power_of_two() {
            return Err(invalid_config(
                "queue capacity must be a power of two in [2, 128]",
            ));
        }
        // One slot is sacrificed by the ring and one must stay free for a
        // poison index, so all jobs plus the poison can always be pushed.
        if self.queue_capacity < self.jobs + 2 {
            return Err(invalid_config(
                "queue capacity must exceed the job count by at least 2",
            ));
        }
        Ok(())
    }

    /// Two buffers per job plus the worker's private carry.
    pub fn buffer_count(&self) -> usize {
        2 * self.jobs + 1
    }
}

fn invalid_config(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

/// Mutex + condvar pair implementing "wait while my queue is empty".
/// The mutex guards only the predicate check; indices and payloads are
/// synchronized by the queue's own atomics.
struct Gate {
    lock: Mutex<()>,
    cv: Condvar,
}

impl Gate {
    fn new() -> Gate {
        Gate {
            lock: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    /// Block until `ready()` holds, re-checking under the lock on every
    /// wakeup.
    fn wait_until<F: Fn() -> bool>(&self, ready: F) {
        let mut guard = self.lock.lock().unwrap();
        while !ready() {
            guard = self.cv.wait(guard).unwrap();
        }
    }

    /// Taking the lock orders the notification after any in-flight
    /// predicate check, so a consumer between "saw empty" and "asleep"
    /// cannot miss its wakeup.
    fn notify(&self) {
        let _guard = self.lock.lock().unwrap();
        self.cv.notify_one();
    }
}

/// Everything the three stages share: the job table, the three queues that
/// close the ring, their gates, and the failure flag.
struct Ring<'a> {
    jobs: &'a JobTable,
    q_write_read: &'a SpscQueue<u8>,
    q_read_work: &'a SpscQueue<u8>,
    q_work_write: &'a SpscQueue<u8>,
    gate_read: &'a Gate,
    gate_work: &'a Gate,
    gate_write: &'a Gate,
    failed: &'a AtomicBool,
}

/// Hand a job index to the next stage and wake it. The notify is
/// unconditional: the queue's emptiness snapshots are best-effort, so a
/// producer cannot reliably detect the empty to non-empty transition, and
/// a skipped wakeup would strand the consumer with the index queued. A
/// notify with no waiter is cheap at chunk granularity.
fn push_job(queue: &SpscQueue<u8>, gate: &Gate, index: u8) {
    assert!(queue.push(index), "pipeline queue full: discipline violated");
    gate.notify();
}

/// Mark the pipeline failed and wake the next stage with a poison index.
fn poison_next(ring: &Ring<'_>, queue: &SpscQueue<u8>, gate: &Gate) {
    ring.failed.store(true, Ordering::Release);
    // Capacity leaves room for every job plus one poison per queue.
    let _ = queue.push(POISON);
    gate.notify();
}

fn reader_loop(ring: &Ring<'_>, input: &Fd) -> io::Result<()> {
    loop {
        ring.gate_read.wait_until(|| !ring.q_write_read.is_empty());
        let index = ring
            .q_write_read
            .pop()
            .expect("reader is the only consumer of its queue");
        if index == POISON || ring.failed.load(Ordering::Acquire) {
            poison_next(ring, ring.q_read_work, ring.gate_work);
            return Ok(());
        }

        // SAFETY: popping the index made this thread the job's owner.
        let job = unsafe { ring.jobs.get(index) };
        debug_assert_eq!(job.input.len, 0);
        // SAFETY: the reader fills the whole input buffer it owns.
        let n = match input.read_full(unsafe { job.input.spare() }) {
            Ok(n) => n,
            Err(e) => {
                poison_next(ring, ring.q_read_work, ring.gate_work);
                return Err(e);
            }
        };
        job.input.off = 0;
        job.input.len = n;
        job.eof = n == 0;
        let eof = job.eof;

        push_job(ring.q_read_work, ring.gate_work, index);
        if eof {
            return Ok(());
        }
    }
}

fn worker_loop(ring: &Ring<'_>, mut active: Segment) -> io::Result<()> {
    loop {
        ring.gate_work.wait_until(|| !ring.q_read_work.is_empty());
        let index = ring
            .q_read_work
            .pop()
            .expect("worker is the only consumer of its queue");
        if index == POISON || ring.failed.load(Ordering::Acquire) {
            poison_next(ring, ring.q_work_write, ring.gate_write);
            return Ok(());
        }

        // SAFETY: popping the index made this thread the job's owner.
        let job = unsafe { ring.jobs.get(index) };
        if let Err(e) = reverse_segment(job, &mut active) {
            poison_next(ring, ring.q_work_write, ring.gate_write);
            return Err(e);
        }
        let eof = job.eof;

        push_job(ring.q_work_write, ring.gate_write, index);
        if eof {
            return Ok(());
        }
    }
}

fn writer_loop(ring: &Ring<'_>, output: &Fd) -> io::Result<()> {
    loop {
        ring.gate_write.wait_until(|| !ring.q_work_write.is_empty());
        let index = ring
            .q_work_write
            .pop()
            .expect("writer is the only consumer of its queue");
        if index == POISON || ring.failed.load(Ordering::Acquire) {
            poison_next(ring, ring.q_write_read, ring.gate_read);
            return Ok(());
        }

        // SAFETY: popping the index made this thread the job's owner.
        let job = unsafe { ring.jobs.get(index) };
        let eof = job.eof;
        let result = {
            // SAFETY: the writer owns the job until it recycles the index.
            let carry = unsafe { job.carry.bytes() };
            let bulk = unsafe { job.input.bytes() };
            if !carry.is_empty() && !bulk.is_empty() {
                output.writev_all(&[carry, bulk])
            } else if !carry.is_empty() {
                output.write_all(carry)
            } else if !bulk.is_empty() {
                output.write_all(bulk)
            } else {
                Ok(())
            }
        };
        if let Err(e) = result {
            poison_next(ring, ring.q_write_read, ring.gate_read);
            return Err(e);
        }
        if eof {
            return Ok(());
        }

        job.carry.clear();
        job.input.clear();
        push_job(ring.q_write_read, ring.gate_read, index);
    }
}

/// Pin the calling thread to core `index`. Advisory: a host with fewer
/// cores just runs the stage unpinned.
fn pin_to_core(index: usize) {
    if let Some(ids) = core_affinity::get_core_ids() {
        if let Some(id) = ids.get(index) {
            let _ = core_affinity::set_for_current(*id);
        }
    }
}

/// Run the three-stage pipeline from `input` to `output`.
///
/// The reader fills a job's input segment, the worker reverses it in place
/// (threading partial lines through its private carry), and the writer
/// emits the segments and recycles the job. Ownership of a job (and
/// transitively of its two buffers) is encoded entirely by which queue or
/// thread currently holds its index; the queues' release/acquire pairs make
/// each stage's buffer writes visible to the next.
///
/// The stream ends when a read returns zero bytes: the job marked `eof`
/// flushes any remaining carry through the worker and writer, and each
/// stage exits after handing it on. A failing stage instead raises the
/// shared flag, pushes [`POISON`] downstream, and its error is returned
/// after all three threads are joined.
pub fn run(input: &Fd, output: &Fd, cfg: &Config) -> io::Result<()> {
    cfg.validate()?;

    let pool = BufferPool::new(cfg.buffer_count(), cfg.buf_size);
    let mut jobs = Vec::with_capacity(cfg.jobs);
    for j in 0..cfg.jobs {
        jobs.push(Job::new(pool.segment(2 * j), pool.segment(2 * j + 1)));
    }
    let jobs = JobTable::new(jobs);
    let active = pool.segment(cfg.buffer_count() - 1);

    let q_write_read = SpscQueue::new(cfg.queue_capacity);
    let q_read_work = SpscQueue::new(cfg.queue_capacity);
    let q_work_write = SpscQueue::new(cfg.queue_capacity);
    for j in 0..cfg.jobs {
        assert!(q_write_read.push(j as u8));
    }

    let gate_read = Gate::new();
    let gate_work = Gate::new();
    let gate_write = Gate::new();
    let failed = AtomicBool::new(false);

    let ring = Ring {
        jobs: &jobs,
        q_write_read: &q_write_read,
        q_read_work: &q_read_work,
        q_work_write: &q_work_write,
        gate_read: &gate_read,
        gate_work: &gate_work,
        gate_write: &gate_write,
        failed: &failed,
    };

    let pin = cfg.pin_cpus;
    thread::scope(|s| {
        let r = &ring;
        let reader = s.spawn(move || {
            if pin {
                pin_to_core(0);
            }
            reader_loop(r, input)
        });
        let worker = s.spawn(move || {
            if pin {
                pin_to_core(1);
            }
            worker_loop(r, active)
        });
        let writer = s.spawn(move || {
            if pin {
                pin_to_core(2);
            }
            writer_loop(r, output)
        });

        let read_res = reader.join().expect("reader thread panicked");
        let work_res = worker.join().expect("worker thread panicked");
        let write_res = writer.join().expect("writer thread panicked");
        read_res.and(work_res).and(write_res)
    })
}
