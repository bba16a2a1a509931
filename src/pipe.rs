//! POSIX pipe with a toggleable non-blocking read end.
//!
//! The interactive frontend drains search results through this pipe: the
//! engine writes from its worker threads, the UI thread polls the read end
//! between keystrokes. Near exit the read end flips to blocking so the
//! remaining output can be captured to EOF.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::output::Sink;

fn fcntl_setfl(fd: RawFd, nonblocking: bool) -> io::Result<()> {
    // Safety: plain fcntl on an owned fd.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        let flags = if nonblocking {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        if libc::fcntl(fd, libc::F_SETFL, flags) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Read end of the result pipe. Closed on drop.
pub struct PipeReader {
    fd: RawFd,
    closed: bool,
}

impl PipeReader {
    /// Reads into `buf`. Returns `Ok(0)` on EOF; with the non-blocking
    /// flag set, "no data right now" surfaces as `ErrorKind::WouldBlock`.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Ok(0);
        }
        // Safety: fd is open until `closed` is set.
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    /// Switches the read end between non-blocking and blocking.
    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        fcntl_setfl(self.fd, nonblocking)
    }

    /// Closes the read end early; subsequent writers see EPIPE.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            // Safety: first and only close of this fd.
            unsafe { libc::close(self.fd) };
        }
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// Write end of the result pipe. Shared by the engine's worker threads as
/// their [`Sink`]; closed when the last clone drops.
pub struct PipeWriter {
    fd: RawFd,
    closed: AtomicBool,
}

impl PipeWriter {
    /// Closes the write end, delivering EOF to the reader.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            // Safety: first and only close of this fd.
            unsafe { libc::close(self.fd) };
        }
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.close();
    }
}

impl Sink for PipeWriter {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        }
        // Safety: fd stays open while `closed` is false; a racing close is
        // caught by the kernel returning EBADF/EPIPE, which the writer
        // treats as EOF either way.
        let n = unsafe { libc::write(self.fd, buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Creates a pipe whose read end starts non-blocking.
pub fn nonblocking_pipe() -> io::Result<(PipeReader, PipeWriter)> {
    let mut fds = [0 as RawFd; 2];
    // Safety: fds is a valid two-element array.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    let reader = PipeReader {
        fd: fds[0],
        closed: false,
    };
    let writer = PipeWriter {
        fd: fds[1],
        closed: AtomicBool::new(false),
    };
    reader.set_nonblocking(true)?;
    Ok((reader, writer))
}
