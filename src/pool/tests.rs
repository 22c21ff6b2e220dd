use super::*;

#[test]
fn round_up_basics() {
    assert_eq!(round_up(4096, 64), 4096);
    assert_eq!(round_up(4097, 64), 4160);
    assert_eq!(round_up(1, 64), 64);
    assert_eq!(round_up(10, 0), 10);
}

#[test]
fn buffers_are_cache_line_aligned() {
    let pool = BufferPool::new(9, 4096);
    for i in 0..pool.buffer_count() {
        assert_eq!(pool.buffer(i) as usize % CACHE_LINE, 0);
    }
}

#[test]
fn buffers_do_not_overlap() {
    let pool = BufferPool::new(5, 4096);
    for i in 0..pool.buffer_count() - 1 {
        let a = pool.buffer(i) as usize;
        let b = pool.buffer(i + 1) as usize;
        assert!(a + pool.buf_size() <= b);
    }
}

#[test]
fn stride_rounds_odd_sizes_up() {
    let pool = BufferPool::new(2, 4097);
    assert_eq!(pool.stride() % CACHE_LINE, 0);
    assert!(pool.stride() >= pool.buf_size());
}

#[test]
fn segment_append_and_views() {
    let pool = BufferPool::new(1, 4096);
    let mut seg = pool.segment(0);
    assert_eq!(seg.len, 0);
    assert_eq!(seg.capacity(), 4096);

    let src = b"hello";
    unsafe { seg.append(src.as_ptr(), src.len()) };
    assert_eq!(unsafe { seg.bytes() }, b"hello");

    unsafe { seg.append(src.as_ptr(), src.len()) };
    assert_eq!(unsafe { seg.bytes() }, b"hellohello");

    seg.clear();
    assert_eq!(seg.len, 0);
    assert_eq!(seg.off, 0);
}

#[test]
fn job_table_round_trips_mutations() {
    let pool = BufferPool::new(3, 4096);
    let jobs = JobTable::new(vec![Job::new(pool.segment(0), pool.segment(1))]);
    assert_eq!(jobs.len(), 1);

    let job = unsafe { jobs.get(0) };
    assert!(!job.eof);
    job.input.len = 7;
    job.eof = true;

    let again = unsafe { jobs.get(0) };
    assert_eq!(again.input.len, 7);
    assert!(again.eof);
}

#[test]
#[should_panic]
fn buffer_index_out_of_range_panics() {
    let pool = BufferPool::new(2, 4096);
    let _ = pool.buffer(2);
}
