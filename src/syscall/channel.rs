// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! The channel abstraction the FD table stores: one underlying object per
//! fd, unifying regular files, pipes, sockets, and standard streams behind
//! a single readable/writable/seekable/selectable interface (distilled
//! spec §3, "FD table").

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

/// A channel a fd can alias. Regular files are seekable; pipes, sockets,
/// and stdio streams are not (`seek` returns `Unsupported`).
pub trait Channel: Send + Sync {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let _ = pos;
        Err(io::Error::new(io::ErrorKind::Unsupported, "fd is not seekable"))
    }
    fn set_nonblocking(&mut self, on: bool) -> io::Result<()> {
        let _ = on;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "fd does not support nonblocking toggling",
        ))
    }
    /// Best-effort `stat`-like path, for channels opened from a filesystem
    /// path (distilled spec §3: FD table entries "optionally with a
    /// tracked path for `stat`-like calls").
    fn path(&self) -> Option<&std::path::Path> {
        None
    }
    /// Raw OS fd, when one exists, for epoll/select registration.
    fn raw_fd(&self) -> Option<RawFd>;
}

pub struct FileChannel {
    file: File,
    path: std::path::PathBuf,
}

impl FileChannel {
    pub fn new(file: File, path: std::path::PathBuf) -> Self {
        Self { file, path }
    }
}

impl Channel for FileChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
    fn path(&self) -> Option<&std::path::Path> {
        Some(&self.path)
    }
    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.file.as_raw_fd())
    }
}

pub struct PipeReadChannel(pub os_pipe::PipeReader);
pub struct PipeWriteChannel(pub os_pipe::PipeWriter);

impl Channel for PipeReadChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "pipe read end is not writable"))
    }
    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.0.as_raw_fd())
    }
}

impl Channel for PipeWriteChannel {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "pipe write end is not readable"))
    }
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }
    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.0.as_raw_fd())
    }
}

/// Either transport a socket fd can hold; see distilled spec §4.5 CONNECT:
/// a fd may start life as a raw stream socket placeholder and be replaced
/// once it is actually connected, or it may be a connectionless datagram
/// endpoint.
pub enum SocketChannel {
    Tcp(TcpStream),
    Unix(UnixStream),
    Udp(std::net::UdpSocket),
}

impl Channel for SocketChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SocketChannel::Tcp(s) => s.read(buf),
            SocketChannel::Unix(s) => s.read(buf),
            SocketChannel::Udp(s) => s.recv(buf),
        }
    }
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            SocketChannel::Tcp(s) => s.write(buf),
            SocketChannel::Unix(s) => s.write(buf),
            SocketChannel::Udp(s) => s.send(buf),
        }
    }
    fn set_nonblocking(&mut self, on: bool) -> io::Result<()> {
        match self {
            SocketChannel::Tcp(s) => s.set_nonblocking(on),
            SocketChannel::Unix(s) => s.set_nonblocking(on),
            SocketChannel::Udp(s) => s.set_nonblocking(on),
        }
    }
    fn raw_fd(&self) -> Option<RawFd> {
        Some(match self {
            SocketChannel::Tcp(s) => s.as_raw_fd(),
            SocketChannel::Unix(s) => s.as_raw_fd(),
            SocketChannel::Udp(s) => s.as_raw_fd(),
        })
    }
}

/// stdin/stdout/stderr, always fds 0/1/2.
pub struct StdioChannel {
    kind: StdioKind,
}

#[derive(Clone, Copy)]
pub enum StdioKind {
    Stdin,
    Stdout,
    Stderr,
}

impl StdioChannel {
    pub fn new(kind: StdioKind) -> Self {
        Self { kind }
    }
}

impl Channel for StdioChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.kind {
            StdioKind::Stdin => io::stdin().read(buf),
            _ => Err(io::Error::new(io::ErrorKind::Unsupported, "stream is not readable")),
        }
    }
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.kind {
            StdioKind::Stdout => io::stdout().write(buf),
            StdioKind::Stderr => io::stderr().write(buf),
            StdioKind::Stdin => Err(io::Error::new(io::ErrorKind::Unsupported, "stdin is not writable")),
        }
    }
    fn raw_fd(&self) -> Option<RawFd> {
        Some(match self.kind {
            StdioKind::Stdin => 0,
            StdioKind::Stdout => 1,
            StdioKind::Stderr => 2,
        })
    }
}

/// Minimal pipe shim kept as its own module so `FileChannel`'s sibling
/// channels stay readable; see `std::os::unix::net` pair-construction
/// idiom used for the same purpose in `SocketChannel`.
mod os_pipe {
    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, RawFd};

    pub struct PipeReader(std::fs::File);
    pub struct PipeWriter(std::fs::File);

    impl std::io::Read for PipeReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }
    impl std::io::Write for PipeWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            self.0.flush()
        }
    }
    impl AsRawFd for PipeReader {
        fn as_raw_fd(&self) -> RawFd {
            self.0.as_raw_fd()
        }
    }
    impl AsRawFd for PipeWriter {
        fn as_raw_fd(&self) -> RawFd {
            self.0.as_raw_fd()
        }
    }

    pub fn pipe() -> io::Result<(PipeReader, PipeWriter)> {
        let mut fds = [0i32; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        let reader = unsafe { std::fs::File::from_raw_fd(fds[0]) };
        let writer = unsafe { std::fs::File::from_raw_fd(fds[1]) };
        Ok((PipeReader(reader), PipeWriter(writer)))
    }
}

pub fn new_pipe() -> io::Result<(PipeReadChannel, PipeWriteChannel)> {
    let (r, w) = os_pipe::pipe()?;
    Ok((PipeReadChannel(r), PipeWriteChannel(w)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_round_trips_bytes() {
        let (mut r, mut w) = new_pipe().unwrap();
        w.write(b"hello").unwrap();
        let mut buf = [0u8; 5];
        r.read(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn stdio_stdin_is_not_writable() {
        let mut stdin = StdioChannel::new(StdioKind::Stdin);
        assert!(stdin.write(b"x").is_err());
    }
}
