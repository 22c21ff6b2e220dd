use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::cell::UnsafeCell;
use std::ptr::NonNull;

/// Cache line stride used to keep neighboring buffers and hot atomics
/// from sharing a line. 64 bytes covers x86-64 and mainstream aarch64.
pub const CACHE_LINE: usize = 64;

/// Round `n` up to a multiple of `a`.
pub const fn round_up(n: usize, a: usize) -> usize {
    if a == 0 {
        n
    } else {
        ((n + a - 1) / a) * a
    }
}

/// Descriptor over a region of one pool buffer: `len` valid bytes starting
/// at `off`. The buffer address is stable for the lifetime of the pool;
/// `off` and `len` are mutated only by the thread that currently owns the
/// enclosing job.
#[derive(Clone, Copy, Debug)]
pub struct Segment {
    buf: *mut u8,
    cap: usize,
    pub off: usize,
    pub len: usize,
}

impl Segment {
    pub fn new(buf: *mut u8, cap: usize) -> Segment {
        Segment {
            buf,
            cap,
            off: 0,
            len: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    #[inline]
    pub fn clear(&mut self) {
        self.off = 0;
        self.len = 0;
    }

    /// The valid bytes, `[off, off + len)`.
    ///
    /// # Safety
    /// The caller must own the enclosing job (ownership by queue position)
    /// and must not hold any other live view of the same buffer.
    #[inline]
    pub unsafe fn bytes(&self) -> &[u8] {
        debug_assert!(self.off + self.len <= self.cap);
        std::slice::from_raw_parts(self.buf.add(self.off), self.len)
    }

    /// The valid bytes, mutable.
    ///
    /// # Safety
    /// Same contract as [`Segment::bytes`].
    #[inline]
    pub unsafe fn bytes_mut(&mut self) -> &mut [u8] {
        debug_assert!(self.off + self.len <= self.cap);
        std::slice::from_raw_parts_mut(self.buf.add(self.off), self.len)
    }

    /// The whole underlying buffer, for filling by the reader.
    ///
    /// # Safety
    /// Same contract as [`Segment::bytes`].
    #[inline]
    pub unsafe fn spare(&mut self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.buf, self.cap)
    }

    /// Copy `n` bytes from `src` to the end of the valid region.
    ///
    /// # Safety
    /// `src` must name `n` readable bytes outside this segment's buffer,
    /// and the caller must have checked `off + len + n <= capacity`.
    #[inline]
    pub unsafe fn append(&mut self, src: *const u8, n: usize) {
        debug_assert!(self.off + self.len + n <= self.cap);
        std::ptr::copy_nonoverlapping(src, self.buf.add(self.off + self.len), n);
        self.len += n;
    }
}

// SAFETY: a Segment is a plain descriptor; the pipeline's queue discipline
// guarantees at most one thread dereferences it at a time.
unsafe impl Send for Segment {}

/// A pair of pool segments transported through the pipeline as one unit,
/// addressed by an 8-bit index. A non-empty carry segment holds already
/// reversed bytes that logically precede the input segment's bytes, so the
/// writer always emits carry first. `eof` is set by the reader when the
/// stream returned zero bytes; it is what terminates the stages, since the
/// worker can legitimately leave `input.len == 0` on a non-final job.
#[derive(Clone, Copy, Debug)]
pub struct Job {
    pub carry: Segment,
    pub input: Segment,
    pub eof: bool,
}

impl Job {
    pub fn new(carry: Segment, input: Segment) -> Job {
        Job {
            carry,
            input,
            eof: false,
        }
    }
}

/// Fixed array of jobs shared by the three pipeline stages. The queues
/// carry indices into this table; whichever thread popped an index owns
/// the job (and its buffers) until it pushes the index onward.
pub struct JobTable {
    slots: Box<[UnsafeCell<Job>]>,
}

// SAFETY: the SPSC queues transfer ownership of each index with
// release/acquire ordering, so no two threads access the same slot
// concurrently.
unsafe impl Sync for JobTable {}

impl JobTable {
    pub fn new(jobs: Vec<Job>) -> JobTable {
        JobTable {
            slots: jobs.into_iter().map(UnsafeCell::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Mutable access to the job at `index`.
    ///
    /// # Safety
    /// The caller must have popped `index` from a pipeline queue and not yet
    /// pushed it onward; no other reference to the slot may be live.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get(&self, index: u8) -> &mut Job {
        &mut *self.slots[index as usize].get()
    }
}

/// One contiguous cache-line-aligned allocation carved into `count`
/// fixed-size buffers. Buffers start `stride` bytes apart, `stride` being
/// `buf_size` rounded up to the cache line, so neighbors never share a line.
pub struct BufferPool {
    ptr: NonNull<u8>,
    layout: Layout,
    stride: usize,
    count: usize,
    buf_size: usize,
}

// SAFETY: the pool hands out raw buffer pointers; all mutation goes through
// segments whose ownership the pipeline serializes. The allocation itself
// is immutable after construction.
unsafe impl Send for BufferPool {}
unsafe impl Sync for BufferPool {}

impl BufferPool {
    pub fn new(count: usize, buf_size: usize) -> BufferPool {
        assert!(count > 0 && buf_size > 0);
        let stride = round_up(buf_size, CACHE_LINE);
        let layout =
            Layout::from_size_align(count * stride, CACHE_LINE).expect("buffer pool layout");
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            handle_alloc_error(layout)
        };
        BufferPool {
            ptr,
            layout,
            stride,
            count,
            buf_size,
        }
    }

    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Start of buffer `index`.
    #[inline]
    pub fn buffer(&self, index: usize) -> *mut u8 {
        assert!(index < self.count);
        // SAFETY: index * stride is within the single allocation.
        unsafe { self.ptr.as_ptr().add(index * self.stride) }
    }

    /// An empty segment over buffer `index`, capacity `buf_size`.
    pub fn segment(&self, index: usize) -> Segment {
        Segment::new(self.buffer(index), self.buf_size)
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        // SAFETY: ptr/layout are the pair returned by alloc in new().
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}
