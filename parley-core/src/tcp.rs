//! TCP socket configuration utilities.
//!
//! # Safety
//!
//! This module uses unsafe code to access raw file descriptors for socket
//! configuration. The unsafe operations are encapsulated and safe to use
//! from the public API.

#![allow(unsafe_code)]

use std::io;
use std::time::Duration;

/// Linger interval applied to freshly connected sockets.
///
/// Gives the kernel a chance to flush pending outbound lines when a socket
/// is closed mid-conversation.
pub const LINGER: Duration = Duration::from_secs(60);

/// Configure a freshly connected stream: disable Nagle's algorithm and set
/// a linger interval.
///
/// Line-oriented request/reply traffic is latency sensitive, so small writes
/// should not be coalesced.
///
/// # Errors
///
/// Returns an error if a socket option cannot be set.
#[inline]
pub fn configure_stream(stream: &mio::net::TcpStream) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::{AsRawFd, FromRawFd};
        let fd = stream.as_raw_fd();
        let sock = unsafe { socket2::Socket::from_raw_fd(fd) };
        let result = sock
            .set_nodelay(true)
            .and_then(|()| sock.set_linger(Some(LINGER)));
        std::mem::forget(sock); // Don't close the fd
        result
    }

    #[cfg(not(unix))]
    {
        // Unsupported platform - just continue with kernel defaults
        Ok(())
    }
}
