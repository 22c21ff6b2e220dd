use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;
#[cfg(target_os = "linux")]
use std::sync::atomic::{AtomicBool, Ordering};

/// Most segments gathered into a single writev call.
const MAX_IOV: usize = 8;

/// Track whether O_NOATIME is supported to avoid repeated failed open() attempts.
/// After the first EPERM, we never try O_NOATIME again (saves one syscall per file).
#[cfg(target_os = "linux")]
static NOATIME_SUPPORTED: AtomicBool = AtomicBool::new(true);

/// Blocking file descriptor with full-buffer read and full-length write
/// semantics. A zero return from `read_full` on a non-empty buffer means
/// end of stream; writes retry short writes and EINTR internally so the
/// caller never sees a partial write.
pub struct Fd {
    fd: RawFd,
    owned: bool,
}

fn open_raw(path: &Path, flags: libc::c_int, mode: libc::c_uint) -> io::Result<RawFd> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains null byte"))?;
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    let fd = unsafe { libc::open(c_path.as_ptr(), flags, mode) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

impl Fd {
    /// Open a file for reading. On Linux, O_NOATIME is attempted first to
    /// avoid atime inode writes; EPERM (not owner, no CAP_FOWNER) disables
    /// the attempt globally.
    pub fn open_read(path: &Path) -> io::Result<Fd> {
        #[cfg(target_os = "linux")]
        if NOATIME_SUPPORTED.load(Ordering::Relaxed) {
            match open_raw(path, libc::O_RDONLY | libc::O_NOATIME, 0) {
                Ok(fd) => return Ok(Fd { fd, owned: true }),
                Err(ref e) if e.raw_os_error() == Some(libc::EPERM) => {
                    NOATIME_SUPPORTED.store(false, Ordering::Relaxed);
                }
                Err(e) => return Err(e),
            }
        }
        let fd = open_raw(path, libc::O_RDONLY, 0)?;
        Ok(Fd { fd, owned: true })
    }

    /// Open (creating if needed) a file for appending, mode 0644.
    pub fn create_append(path: &Path) -> io::Result<Fd> {
        let fd = open_raw(
            path,
            libc::O_WRONLY | libc::O_APPEND | libc::O_CREAT,
            0o644,
        )?;
        Ok(Fd { fd, owned: true })
    }

    /// Standard input as an unowned descriptor (never closed on drop).
    pub fn stdin() -> Fd {
        Fd { fd: 0, owned: false }
    }

    /// Standard output as an unowned descriptor (never closed on drop).
    pub fn stdout() -> Fd {
        Fd { fd: 1, owned: false }
    }

    /// Read until `buf` is full or the stream ends. Returns the number of
    /// bytes read; 0 on a non-empty `buf` means end of stream. Short reads
    /// (pipes, slow devices) and EINTR are retried here so a partial chunk
    /// can only be the final one.
    pub fn read_full(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut total = 0usize;
        while total < buf.len() {
            // SAFETY: the pointer and length name the unfilled tail of `buf`.
            let n = unsafe {
                libc::read(
                    self.fd,
                    buf[total..].as_mut_ptr() as *mut libc::c_void,
                    buf.len() - total,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if n == 0 {
                break;
            }
            total += n as usize;
        }
        Ok(total)
    }

    /// Write all of `buf`, retrying short writes and EINTR.
    pub fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut written = 0usize;
        while written < buf.len() {
            // SAFETY: the pointer and length name the unwritten tail of `buf`.
            let n = unsafe {
                libc::write(
                    self.fd,
                    buf[written..].as_ptr() as *const libc::c_void,
                    buf.len() - written,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "write zero"));
            }
            written += n as usize;
        }
        Ok(())
    }

    /// Gathered write of every buffer in order, retrying until all bytes
    /// are on the descriptor. The iovec list is rebuilt past already-written
    /// bytes after a short write.
    pub fn writev_all(&self, bufs: &[&[u8]]) -> io::Result<()> {
        assert!(bufs.len() <= MAX_IOV);
        let total: usize = bufs.iter().map(|b| b.len()).sum();
        let mut skip = 0usize;
        while skip < total {
            let mut iov = [libc::iovec {
                iov_base: std::ptr::null_mut(),
                iov_len: 0,
            }; MAX_IOV];
            let mut n_iov = 0usize;
            let mut rem = skip;
            for buf in bufs {
                if rem >= buf.len() {
                    rem -= buf.len();
                    continue;
                }
                iov[n_iov] = libc::iovec {
                    iov_base: buf[rem..].as_ptr() as *mut libc::c_void,
                    iov_len: buf.len() - rem,
                };
                n_iov += 1;
                rem = 0;
            }
            // SAFETY: the first n_iov entries point into live borrowed slices.
            let n = unsafe { libc::writev(self.fd, iov.as_ptr(), n_iov as libc::c_int) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "write zero"));
            }
            skip += n as usize;
        }
        Ok(())
    }

    /// Close the descriptor, surfacing the close() result. Unowned
    /// descriptors (stdin/stdout) are left open.
    pub fn close(mut self) -> io::Result<()> {
        if !self.owned {
            return Ok(());
        }
        self.owned = false;
        // SAFETY: fd is open and owned; ownership ends here.
        let ret = unsafe { libc::close(self.fd) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        if self.owned {
            // SAFETY: fd is open and owned. Best effort; errors on an
            // implicit close have nowhere to go.
            unsafe { libc::close(self.fd) };
        }
    }
}
