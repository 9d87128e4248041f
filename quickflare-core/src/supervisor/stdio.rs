//! Process-wide standard stream redirection
//!
//! A loaded module writes straight to the process's stdout/stderr handles, so
//! capturing it means swapping those handles at the OS level: file descriptors
//! 1 and 2 on unix, the `STD_OUTPUT_HANDLE`/`STD_ERROR_HANDLE` slots on Windows.
#![allow(unsafe_code)]

use std::io::{self, Write};

/// Result of one non-blocking read from the capture pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Data(usize),
    /// Nothing available right now
    Empty,
    /// Every writer is gone
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RedirectState {
    Captured,
    Silenced,
    Restored,
}

fn flush_std() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

#[cfg(unix)]
pub use unix::{PipeReader, StdioRedirect};

#[cfg(windows)]
pub use windows_impl::{PipeReader, StdioRedirect};

#[cfg(unix)]
mod unix {
    use super::{flush_std, ReadStatus, RedirectState};
    use std::fs::{File, OpenOptions};
    use std::io::{self, Read};
    use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};

    const STDOUT: RawFd = 1;
    const STDERR: RawFd = 2;

    fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
        if ret == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret)
        }
    }

    fn set_flags(fd: RawFd, cloexec: bool, nonblocking: bool) -> io::Result<()> {
        // SAFETY: fcntl on a descriptor we own, with integer arguments only.
        unsafe {
            if cloexec {
                let flags = cvt(libc::fcntl(fd, libc::F_GETFD))?;
                cvt(libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC))?;
            }
            if nonblocking {
                let flags = cvt(libc::fcntl(fd, libc::F_GETFL))?;
                cvt(libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK))?;
            }
        }
        Ok(())
    }

    fn point_std_at(fd: RawFd) -> io::Result<()> {
        flush_std();
        // SAFETY: dup2 onto the standard descriptors; `fd` is open for the
        // duration of the call.
        unsafe {
            cvt(libc::dup2(fd, STDOUT))?;
            cvt(libc::dup2(fd, STDERR))?;
        }
        Ok(())
    }

    /// Holds fds 1 and 2 redirected into a pipe until restored or dropped.
    #[derive(Debug)]
    pub struct StdioRedirect {
        saved_stdout: OwnedFd,
        saved_stderr: OwnedFd,
        state: RedirectState,
    }

    /// Non-blocking read end of the capture pipe.
    #[derive(Debug)]
    pub struct PipeReader {
        file: File,
    }

    impl StdioRedirect {
        /// Point stdout and stderr at a fresh pipe and return its read end.
        pub fn capture() -> io::Result<(Self, PipeReader)> {
            let mut fds: [RawFd; 2] = [0; 2];
            // SAFETY: `fds` has room for the two descriptors pipe(2) writes.
            cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
            // SAFETY: pipe(2) succeeded, so both descriptors are open and ours.
            let (read, write) =
                unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
            set_flags(read.as_raw_fd(), true, true)?;
            set_flags(write.as_raw_fd(), true, false)?;

            let saved_stdout = io::stdout().as_fd().try_clone_to_owned()?;
            let saved_stderr = io::stderr().as_fd().try_clone_to_owned()?;
            point_std_at(write.as_raw_fd())?;
            // fds 1 and 2 are now the only writers
            drop(write);

            Ok((
                Self {
                    saved_stdout,
                    saved_stderr,
                    state: RedirectState::Captured,
                },
                PipeReader {
                    file: File::from(read),
                },
            ))
        }

        /// Send further output to `/dev/null`. The pipe sees EOF once drained.
        pub fn silence(&mut self) -> io::Result<()> {
            if self.state != RedirectState::Captured {
                return Ok(());
            }
            let null = OpenOptions::new().write(true).open("/dev/null")?;
            point_std_at(null.as_raw_fd())?;
            self.state = RedirectState::Silenced;
            Ok(())
        }

        /// Put the original stdout and stderr back.
        pub fn restore(&mut self) -> io::Result<()> {
            if self.state == RedirectState::Restored {
                return Ok(());
            }
            flush_std();
            // SAFETY: the saved descriptors stay open for the life of `self`.
            unsafe {
                cvt(libc::dup2(self.saved_stdout.as_raw_fd(), STDOUT))?;
                cvt(libc::dup2(self.saved_stderr.as_raw_fd(), STDERR))?;
            }
            self.state = RedirectState::Restored;
            Ok(())
        }
    }

    impl Drop for StdioRedirect {
        fn drop(&mut self) {
            let _ = self.restore();
        }
    }

    impl PipeReader {
        pub fn read_available(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus> {
            match self.file.read(buf) {
                Ok(0) => Ok(ReadStatus::Closed),
                Ok(n) => Ok(ReadStatus::Data(n)),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) =>
                {
                    Ok(ReadStatus::Empty)
                }
                Err(e) => Err(e),
            }
        }
    }
}

#[cfg(windows)]
mod windows_impl {
    use super::{flush_std, ReadStatus, RedirectState};
    use std::ffi::c_void;
    use std::fs::{File, OpenOptions};
    use std::io::{self, Read};
    use std::os::windows::io::{AsRawHandle, FromRawHandle};
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::System::Console::{
        GetStdHandle, SetStdHandle, STD_ERROR_HANDLE, STD_OUTPUT_HANDLE,
    };
    use windows::Win32::System::Pipes::{CreatePipe, PeekNamedPipe};

    const PIPE_BUFFER: u32 = 64 * 1024;

    fn win_err(e: windows::core::Error) -> io::Error {
        io::Error::other(e.to_string())
    }

    fn point_std_at(handle: HANDLE) -> io::Result<()> {
        flush_std();
        // SAFETY: SetStdHandle only stores the handle value.
        unsafe {
            SetStdHandle(STD_OUTPUT_HANDLE, handle).map_err(win_err)?;
            SetStdHandle(STD_ERROR_HANDLE, handle).map_err(win_err)?;
        }
        Ok(())
    }

    /// Holds the standard handles redirected into a pipe until restored or dropped.
    ///
    /// Handles are kept as integers so the guard can cross threads.
    #[derive(Debug)]
    pub struct StdioRedirect {
        saved_stdout: usize,
        saved_stderr: usize,
        // A module may have cached this handle, so it stays open until drop
        write_end: Option<File>,
        null: Option<File>,
        state: RedirectState,
    }

    /// Polled read end of the capture pipe.
    #[derive(Debug)]
    pub struct PipeReader {
        file: File,
    }

    impl StdioRedirect {
        pub fn capture() -> io::Result<(Self, PipeReader)> {
            let mut read = HANDLE::default();
            let mut write = HANDLE::default();
            // SAFETY: both out-pointers are valid for writes.
            unsafe { CreatePipe(&mut read, &mut write, None, PIPE_BUFFER) }.map_err(win_err)?;
            // SAFETY: CreatePipe succeeded; we take ownership of both handles.
            let (read, write) = unsafe {
                (
                    File::from_raw_handle(read.0),
                    File::from_raw_handle(write.0),
                )
            };

            // SAFETY: querying the current standard handles has no preconditions.
            let (saved_stdout, saved_stderr) = unsafe {
                (
                    GetStdHandle(STD_OUTPUT_HANDLE).map_err(win_err)?.0 as usize,
                    GetStdHandle(STD_ERROR_HANDLE).map_err(win_err)?.0 as usize,
                )
            };
            point_std_at(HANDLE(write.as_raw_handle()))?;

            Ok((
                Self {
                    saved_stdout,
                    saved_stderr,
                    write_end: Some(write),
                    null: None,
                    state: RedirectState::Captured,
                },
                PipeReader { file: read },
            ))
        }

        /// Point the standard handles at `NUL`.
        ///
        /// A module that cached the pipe handle keeps writing into it, so the
        /// reader must keep draining.
        pub fn silence(&mut self) -> io::Result<()> {
            if self.state != RedirectState::Captured {
                return Ok(());
            }
            let null = OpenOptions::new().write(true).open("NUL")?;
            point_std_at(HANDLE(null.as_raw_handle()))?;
            self.null = Some(null);
            self.state = RedirectState::Silenced;
            Ok(())
        }

        pub fn restore(&mut self) -> io::Result<()> {
            if self.state == RedirectState::Restored {
                return Ok(());
            }
            flush_std();
            // SAFETY: the saved values are the handles that were installed before capture.
            unsafe {
                SetStdHandle(STD_OUTPUT_HANDLE, HANDLE(self.saved_stdout as *mut c_void))
                    .map_err(win_err)?;
                SetStdHandle(STD_ERROR_HANDLE, HANDLE(self.saved_stderr as *mut c_void))
                    .map_err(win_err)?;
            }
            self.state = RedirectState::Restored;
            Ok(())
        }
    }

    impl Drop for StdioRedirect {
        fn drop(&mut self) {
            let _ = self.restore();
            self.write_end.take();
            self.null.take();
        }
    }

    impl PipeReader {
        pub fn read_available(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus> {
            let mut available = 0u32;
            let handle = HANDLE(self.file.as_raw_handle());
            // SAFETY: peeking without a buffer only writes the byte count.
            let peeked = unsafe {
                PeekNamedPipe(
                    handle,
                    None,
                    0,
                    None,
                    Some(std::ptr::addr_of_mut!(available)),
                    None,
                )
            };
            if peeked.is_err() {
                // Broken pipe: every write handle is closed
                return Ok(ReadStatus::Closed);
            }
            if available == 0 {
                return Ok(ReadStatus::Empty);
            }
            let want = buf.len().min(available as usize);
            match self.file.read(&mut buf[..want])? {
                0 => Ok(ReadStatus::Closed),
                n => Ok(ReadStatus::Data(n)),
            }
        }
    }
}
