use std::{
    fs::File,
    io,
    os::unix::prelude::{FromRawFd, RawFd},
};

/// Opens an anonymous pipe, returning the (read, write) ends.
///
/// Both descriptors are close-on-exec, so a spawned child only receives the ends it is
/// explicitly handed through `Stdio`.
pub fn open_pipe() -> io::Result<(File, File)> {
    let mut fds: [libc::c_int; 2] = [0; 2];

    // Linux can set O_CLOEXEC atomically with pipe2().  macOS has no pipe2(), so there
    // the flag is applied with fcntl() after the fact.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
            return Err(io::Error::last_os_error());
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
    }

    let (read, write) = unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) };

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        use std::os::unix::prelude::AsRawFd;
        set_cloexec(read.as_raw_fd())?;
        set_cloexec(write.as_raw_fd())?;
    }

    Ok((read, write))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_cloexec(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFD, 0);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }

        if libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) == -1 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(())
}

/// Grows the kernel buffer of the pipe.  Returns the capacity the kernel actually granted.
#[cfg(target_os = "linux")]
pub fn set_capacity(fd: RawFd, capacity: usize) -> io::Result<usize> {
    let requested = capacity.min(libc::c_int::MAX as usize) as libc::c_int;
    let granted = unsafe { libc::fcntl(fd, libc::F_SETPIPE_SZ, requested) };

    if granted < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(granted as usize)
}

#[cfg(not(target_os = "linux"))]
pub fn set_capacity(_fd: RawFd, _capacity: usize) -> io::Result<usize> {
    Err(io::Error::new(
        io::ErrorKind::Other,
        "pipe capacity can only be set on linux",
    ))
}

/// The number of bytes buffered in the pipe, as reported by FIONREAD.
pub fn bytes_available(fd: RawFd) -> io::Result<usize> {
    let mut available: libc::c_int = 0;

    if unsafe { libc::ioctl(fd, libc::FIONREAD, &mut available) } != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(available.max(0) as usize)
}

/// Polls the descriptor with a zero timeout.
///
/// A hangup counts as readable: once every writer is closed, read() returns EOF without blocking.
pub fn poll_readable(fd: RawFd) -> io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    loop {
        let ready = unsafe { libc::poll(&mut pollfd, 1, 0) };

        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }

            return Err(err);
        }

        let mask = libc::POLLIN | libc::POLLHUP | libc::POLLERR;
        return Ok(ready > 0 && pollfd.revents & mask != 0);
    }
}
