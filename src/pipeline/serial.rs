use std::io;

use crate::common::io::Fd;
use crate::pool::{BufferPool, Job};
use crate::reverse::reverse_segment;

use super::core::Config;

/// Single-threaded engine: the same chunked segment protocol as the
/// pipeline, driven by one loop over one input buffer and two carry
/// buffers. Output is byte-identical to [`super::run`]; useful on
/// single-core hosts and as an oracle for the pipeline.
pub fn run_serial(input: &Fd, output: &Fd, cfg: &Config) -> io::Result<()> {
    cfg.validate()?;

    let pool = BufferPool::new(3, cfg.buf_size);
    let mut job = Job::new(pool.segment(0), pool.segment(1));
    let mut active = pool.segment(2);

    loop {
        // SAFETY: everything is owned by this one thread.
        let n = input.read_full(unsafe { job.input.spare() })?;
        job.input.off = 0;
        job.input.len = n;
        job.eof = n == 0;

        reverse_segment(&mut job, &mut active)?;

        // SAFETY: same single-thread ownership as above.
        let carry = unsafe { job.carry.bytes() };
        let bulk = unsafe { job.input.bytes() };
        if !carry.is_empty() && !bulk.is_empty() {
            output.writev_all(&[carry, bulk])?;
        } else if !carry.is_empty() {
            output.write_all(carry)?;
        } else if !bulk.is_empty() {
            output.write_all(bulk)?;
        }

        if job.eof {
            return Ok(());
        }
        job.carry.clear();
        job.input.clear();
    }
}
