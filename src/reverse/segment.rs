use std::io;
use std::mem;

use memchr::memchr;

use crate::pool::{Job, Segment};

use super::core::reverse_range;

const LF: u8 = 0x0A;
const CR: u8 = 0x0D;

fn malformed_line() -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        "malformed UTF-8 inside a line (or a code point split past the carry)",
    )
}

fn oversized_line() -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        "line does not fit in one chunk (terminator included)",
    )
}

/// Process one freshly read chunk.
///
/// `job.input` holds the chunk (`off == 0`, `len` = bytes read); `active` is
/// the worker-private carry holding the raw unfinished tail of the previous
/// chunk. On return the job's segments, emitted carry-first, are the next
/// piece of the reversed stream, and `active` holds the new trailing
/// partial line (if any) for the next call:
///
/// 1. A non-empty carry absorbs the input's prefix up to and including the
///    first LF, is reversed excluding the terminator (CRLF stays intact),
///    and is handed to the job for emission; the buffer swap leaves the
///    worker holding the job's clean spare carry. When no LF exists (only
///    possible at end of stream, since lines fit in one chunk and the reader
///    fills every non-final chunk completely) the whole remainder joins
///    the carry and is emitted reversed without a terminator.
/// 2. Every complete line left in the input is reversed in place.
/// 3. The unterminated tail, if any, moves into the (now clean) carry and
///    the input length is truncated to the bytes ready to write.
///
/// Fails with `InvalidData` on malformed UTF-8 or on a line longer than the
/// carry buffer's capacity; the pipeline treats both as fatal.
pub fn reverse_segment(job: &mut Job, active: &mut Segment) -> io::Result<()> {
    if active.len > 0 {
        attach_carry(job, active)?;
    }
    split_tail(&mut job.input, active)
}

/// Step 1: join the carried tail with its closing prefix and emit it.
fn attach_carry(job: &mut Job, active: &mut Segment) -> io::Result<()> {
    debug_assert_eq!(job.input.off, 0);
    debug_assert_eq!(job.carry.len, 0);

    let lf = {
        // SAFETY: the worker owns this job; no other view of its buffers is live.
        let bytes = unsafe { job.input.bytes() };
        memchr(LF, bytes)
    };

    let Some(lf) = lf else {
        // End of stream inside the carried line: emit carry + remainder,
        // reversed whole, with no terminator.
        if active.len + job.input.len > active.capacity() {
            return Err(oversized_line());
        }
        // SAFETY: source and destination are distinct pool buffers and the
        // capacity was checked above.
        unsafe {
            let src = job.input.bytes();
            active.append(src.as_ptr(), src.len());
        }
        job.input.off = 0;
        job.input.len = 0;

        let end = active.len;
        // SAFETY: `active` is worker-private.
        if !reverse_range(unsafe { active.bytes_mut() }, 0, end) {
            return Err(malformed_line());
        }
        mem::swap(&mut job.carry, active);
        return Ok(());
    };

    let prefix = lf + 1;
    if active.len + prefix > active.capacity() {
        return Err(oversized_line());
    }
    // SAFETY: distinct pool buffers; capacity checked above.
    unsafe {
        let src = job.input.bytes();
        active.append(src.as_ptr(), prefix);
    }

    // The carry now ends with LF. Exclude it from the reversal, and a
    // preceding CR with it, so the terminator bytes survive in place.
    let mut end = active.len - 1;
    // SAFETY: `active` is worker-private.
    if end > 0 && unsafe { active.bytes() }[end - 1] == CR {
        end -= 1;
    }
    if !reverse_range(unsafe { active.bytes_mut() }, 0, end) {
        return Err(malformed_line());
    }

    job.input.off = prefix;
    job.input.len -= prefix;
    mem::swap(&mut job.carry, active);
    Ok(())
}

/// Steps 2 and 3: reverse the complete lines left in `input` in place and
/// move the unterminated tail into the clean carry.
fn split_tail(input: &mut Segment, active: &mut Segment) -> io::Result<()> {
    debug_assert_eq!(active.len, 0);
    debug_assert_eq!(active.off, 0);

    let (keep, tail_start, tail_len) = {
        // SAFETY: the worker owns this job; no other view of the buffer is live.
        let window = unsafe { input.bytes_mut() };
        let end = window.len();
        let mut pos = 0usize;
        let mut split = (end, 0usize, 0usize);
        while pos < end {
            match memchr(LF, &window[pos..]) {
                None => {
                    split = (pos, pos, end - pos);
                    break;
                }
                Some(rel) => {
                    let lf = pos + rel;
                    let mut line_end = lf;
                    if line_end > pos && window[line_end - 1] == CR {
                        line_end -= 1;
                    }
                    if !reverse_range(window, pos, line_end) {
                        return Err(malformed_line());
                    }
                    pos = lf + 1;
                }
            }
        }
        split
    };

    if tail_len > 0 {
        // A tail is at most one whole chunk, which always fits a clean carry.
        debug_assert!(tail_len <= active.capacity());
        // SAFETY: distinct pool buffers; bounds checked above.
        unsafe {
            let src = input.bytes();
            active.append(src.as_ptr().add(tail_start), tail_len);
        }
    }
    input.len = keep;
    Ok(())
}
