use super::*;
use crate::pool::{BufferPool, Job, Segment};

#[test]
fn reverse_range_empty_and_inverted_bounds() {
    let mut buf = *b"abc";
    assert!(reverse_range(&mut buf, 1, 1));
    assert!(reverse_range(&mut buf, 2, 1));
    assert_eq!(&buf, b"abc");
}

#[test]
fn reverse_range_ascii() {
    let mut buf = *b"hello";
    assert!(reverse_range(&mut buf, 0, 5));
    assert_eq!(&buf, b"olleh");
}

#[test]
fn reverse_range_leaves_outside_untouched() {
    let mut buf = *b"xxabcyy";
    assert!(reverse_range(&mut buf, 2, 5));
    assert_eq!(&buf, b"xxcbayy");
}

#[test]
fn reverse_range_two_byte_sequence() {
    // "héllo" = 68 C3 A9 6C 6C 6F
    let mut buf = [0x68, 0xC3, 0xA9, 0x6C, 0x6C, 0x6F];
    assert!(reverse_range(&mut buf, 0, 6));
    assert_eq!(buf, [0x6F, 0x6C, 0x6C, 0xC3, 0xA9, 0x68]);
}

#[test]
fn reverse_range_four_byte_sequence() {
    let mut buf = Vec::from("ab🎉cd".as_bytes());
    let len = buf.len();
    assert!(reverse_range(&mut buf, 0, len));
    assert_eq!(buf, "dc🎉ba".as_bytes());
}

#[test]
fn reverse_range_is_involution() {
    for s in ["", "a", "héllo", "あいう", "ab🎉cd", "mixedЯзык"] {
        let mut buf = Vec::from(s.as_bytes());
        let len = buf.len();
        assert!(reverse_range(&mut buf, 0, len));
        assert!(reverse_range(&mut buf, 0, len));
        assert_eq!(buf, s.as_bytes());
    }
}

#[test]
fn reverse_range_rejects_bare_continuations() {
    let mut buf = [0x80, 0x80];
    assert!(!reverse_range(&mut buf, 0, 2));
}

#[test]
fn reverse_range_rejects_split_code_point() {
    // First byte of "é" without its continuation: after the byte pass the
    // continuation run hits the range end with no lead.
    let mut buf = [0x61, 0xA9];
    assert!(!reverse_range(&mut buf, 0, 2));
}

#[test]
fn reverse_range_ignores_stray_lead() {
    // A lead with no continuations is left where the byte pass put it; the
    // engine trusts the encoder and only rejects broken continuation runs.
    let mut buf = [0xC3, 0x61];
    assert!(reverse_range(&mut buf, 0, 2));
    assert_eq!(buf, [0x61, 0xC3]);
}

#[test]
fn classifies_lead_and_continuation_bytes() {
    assert!(is_cont(0x80));
    assert!(is_cont(0xBF));
    assert!(!is_cont(0x7F));
    assert!(!is_cont(0xC2));

    assert!(is_lead(0xC2));
    assert!(is_lead(0xF4));
    assert!(!is_lead(0xC1)); // overlong starter
    assert!(!is_lead(0xF5)); // out of range
    assert!(!is_lead(0x41));
}

/// Pool-backed fixture for driving `reverse_segment` one chunk at a time.
struct Rig {
    #[allow(dead_code)]
    pool: BufferPool,
    job: Job,
    active: Segment,
}

fn rig_sized(buf_size: usize, chunk: &[u8], carried: &[u8]) -> Rig {
    let pool = BufferPool::new(3, buf_size);
    let mut job = Job::new(pool.segment(0), pool.segment(1));
    let mut active = pool.segment(2);
    unsafe {
        job.input.append(chunk.as_ptr(), chunk.len());
        active.append(carried.as_ptr(), carried.len());
    }
    job.eof = chunk.is_empty();
    Rig { pool, job, active }
}

fn rig(chunk: &[u8], carried: &[u8]) -> Rig {
    rig_sized(4096, chunk, carried)
}

impl Rig {
    /// Bytes the writer would emit for this job: carry first, then input.
    fn emitted(&self) -> Vec<u8> {
        let mut out = Vec::new();
        unsafe {
            out.extend_from_slice(self.job.carry.bytes());
            out.extend_from_slice(self.job.input.bytes());
        }
        out
    }

    fn carried(&self) -> Vec<u8> {
        unsafe { self.active.bytes().to_vec() }
    }
}

#[test]
fn whole_lines_reverse_in_place() {
    let mut r = rig(b"abc\ndef\n", b"");
    reverse_segment(&mut r.job, &mut r.active).unwrap();
    assert_eq!(r.emitted(), b"cba\nfed\n");
    assert!(r.carried().is_empty());
    assert_eq!(r.job.carry.len, 0);
}

#[test]
fn crlf_terminators_stay_intact() {
    let mut r = rig(b"abc\r\ndef\n", b"");
    reverse_segment(&mut r.job, &mut r.active).unwrap();
    assert_eq!(r.emitted(), b"cba\r\nfed\n");
}

#[test]
fn empty_lines_pass_through() {
    let mut r = rig(b"\n\n\n", b"");
    reverse_segment(&mut r.job, &mut r.active).unwrap();
    assert_eq!(r.emitted(), b"\n\n\n");
}

#[test]
fn multibyte_line_reverses_by_code_point() {
    let mut r = rig("héllo\n".as_bytes(), b"");
    reverse_segment(&mut r.job, &mut r.active).unwrap();
    assert_eq!(r.emitted(), "olléh\n".as_bytes());
}

#[test]
fn trailing_partial_line_moves_to_carry() {
    let mut r = rig(b"abc\nxy", b"");
    reverse_segment(&mut r.job, &mut r.active).unwrap();
    assert_eq!(r.emitted(), b"cba\n");
    assert_eq!(r.carried(), b"xy");
}

#[test]
fn carry_joins_prefix_and_emits_first() {
    // Previous chunk ended mid-line with "wor"; this chunk completes it.
    let mut r = rig(b"ld\nnext\n", b"wor");
    reverse_segment(&mut r.job, &mut r.active).unwrap();
    assert_eq!(r.emitted(), b"dlrow\ntxen\n");
    assert_eq!(r.job.carry.len, 6);
    assert!(r.carried().is_empty());
}

#[test]
fn carry_with_crlf_prefix() {
    let mut r = rig(b"ld\r\n", b"wor");
    reverse_segment(&mut r.job, &mut r.active).unwrap();
    assert_eq!(r.emitted(), b"dlrow\r\n");
}

#[test]
fn carry_spanning_split_code_point() {
    // "é" split across the chunk boundary: C3 carried, A9 arriving.
    let mut r = rig(&[0xA9, b'\n'], &[b'h', 0xC3]);
    reverse_segment(&mut r.job, &mut r.active).unwrap();
    assert_eq!(r.emitted(), [0xC3, 0xA9, b'h', b'\n']);
}

#[test]
fn chunk_wholly_consumed_as_prefix() {
    // The entire chunk closes the carried line; the input segment must end
    // up empty without the job being mistaken for end of stream.
    let mut r = rig(b"cd\n", b"ab");
    reverse_segment(&mut r.job, &mut r.active).unwrap();
    assert_eq!(r.emitted(), b"dcba\n");
    assert_eq!(r.job.input.len, 0);
    assert!(!r.job.eof);
    assert!(r.carried().is_empty());
}

#[test]
fn final_unterminated_line_joins_carry() {
    // Stream ends without a terminator: carried "hel" plus a last short
    // chunk "lo" that contains no LF.
    let mut r = rig(b"lo", b"hel");
    reverse_segment(&mut r.job, &mut r.active).unwrap();
    assert_eq!(r.emitted(), b"olleh");
    assert_eq!(r.job.input.len, 0);
}

#[test]
fn eof_job_flushes_carry() {
    let mut r = rig(b"", b"abc");
    reverse_segment(&mut r.job, &mut r.active).unwrap();
    assert_eq!(r.emitted(), b"cba");
    assert_eq!(r.job.input.len, 0);
}

#[test]
fn eof_job_with_no_carry_emits_nothing() {
    let mut r = rig(b"", b"");
    reverse_segment(&mut r.job, &mut r.active).unwrap();
    assert!(r.emitted().is_empty());
}

#[test]
fn malformed_line_is_fatal() {
    let err = {
        let mut r = rig(&[0x80, 0x80, b'\n'], b"");
        reverse_segment(&mut r.job, &mut r.active).unwrap_err()
    };
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn oversized_line_is_rejected() {
    // Carry of 6 plus a 4-byte prefix cannot fit an 8-byte buffer.
    let mut r = rig_sized(8, b"efg\nh\n", b"abcdef");
    let err = reverse_segment(&mut r.job, &mut r.active).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn successive_chunks_thread_the_carry() {
    // "hello world\nsecond line\n" split at an awkward boundary.
    let pool = BufferPool::new(3, 4096);
    let mut active = pool.segment(2);
    let mut out = Vec::new();

    for chunk in [&b"hello wor"[..], &b"ld\nsecond line\n"[..]] {
        let mut job = Job::new(pool.segment(0), pool.segment(1));
        unsafe { job.input.append(chunk.as_ptr(), chunk.len()) };
        reverse_segment(&mut job, &mut active).unwrap();
        unsafe {
            out.extend_from_slice(job.carry.bytes());
            out.extend_from_slice(job.input.bytes());
        }
    }

    assert_eq!(out, b"dlrow olleh\nenil dnoces\n");
}
