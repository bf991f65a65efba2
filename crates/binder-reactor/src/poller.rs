//! The OS readiness facility behind the reactor.
//!
//! [`Poller`] is the seam the reactor drives: one registration per
//! descriptor, carrying the union of every watcher's interest. The Linux
//! implementation wraps `epoll(7)` through `nix`.

use std::io;
use std::os::fd::{BorrowedFd, RawFd};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};

use crate::interest::{Interest, Readiness};

/// A single readiness report produced by [`Poller::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollEvent {
    /// Descriptor that became ready.
    pub fd: RawFd,
    /// Events reported for the descriptor.
    pub readiness: Readiness,
}

/// Registration and waiting primitives of an OS readiness facility.
pub trait Poller: Send + Sync {
    /// Registers `fd` with the given interest.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the descriptor cannot be registered.
    fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()>;

    /// Replaces the interest of an already registered descriptor.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the change is rejected.
    fn reregister(&self, fd: RawFd, interest: Interest) -> io::Result<()>;

    /// Removes `fd` from the facility.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the descriptor was not registered.
    fn deregister(&self, fd: RawFd) -> io::Result<()>;

    /// Blocks for at most `timeout` (forever when `None`) and returns at
    /// most one ready descriptor.
    ///
    /// # Errors
    ///
    /// Returns the OS error, including [`io::ErrorKind::Interrupted`] when a
    /// signal arrived during the wait.
    fn poll(&self, timeout: Option<Duration>) -> io::Result<Option<PollEvent>>;
}

impl<P: Poller + ?Sized> Poller for Arc<P> {
    fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.as_ref().register(fd, interest)
    }

    fn reregister(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.as_ref().reregister(fd, interest)
    }

    fn deregister(&self, fd: RawFd) -> io::Result<()> {
        self.as_ref().deregister(fd)
    }

    fn poll(&self, timeout: Option<Duration>) -> io::Result<Option<PollEvent>> {
        self.as_ref().poll(timeout)
    }
}

/// `epoll(7)` backed [`Poller`].
#[derive(Debug)]
pub struct EpollPoller {
    epoll: Epoll,
}

impl EpollPoller {
    /// Creates a close-on-exec epoll instance.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the instance cannot be created.
    pub fn new() -> io::Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;
        Ok(Self { epoll })
    }

    fn event_for(fd: RawFd, interest: Interest) -> EpollEvent {
        let mut flags = EpollFlags::EPOLLRDHUP;
        if interest.is_readable() {
            flags |= EpollFlags::EPOLLIN;
        }
        if interest.is_writable() {
            flags |= EpollFlags::EPOLLOUT;
        }
        EpollEvent::new(flags, fd_to_token(fd))
    }
}

impl Poller for EpollPoller {
    fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        // SAFETY: the caller keeps `fd` open while it is registered; the
        // borrow does not outlive this call.
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        self.epoll.add(borrowed, Self::event_for(fd, interest))?;
        Ok(())
    }

    fn reregister(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        // SAFETY: as for `register`.
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        let mut event = Self::event_for(fd, interest);
        self.epoll.modify(borrowed, &mut event)?;
        Ok(())
    }

    fn deregister(&self, fd: RawFd) -> io::Result<()> {
        // SAFETY: as for `register`.
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        self.epoll.delete(borrowed)?;
        Ok(())
    }

    fn poll(&self, timeout: Option<Duration>) -> io::Result<Option<PollEvent>> {
        let mut events = [EpollEvent::empty()];
        let ready = self.epoll.wait(&mut events, epoll_timeout(timeout))?;
        let Some(event) = events.first().filter(|_| ready > 0) else {
            return Ok(None);
        };
        let flags = event.events();
        Ok(Some(PollEvent {
            fd: token_to_fd(event.data()),
            readiness: Readiness {
                readable: flags.contains(EpollFlags::EPOLLIN),
                writable: flags.contains(EpollFlags::EPOLLOUT),
                hangup: flags.intersects(
                    EpollFlags::EPOLLHUP | EpollFlags::EPOLLERR | EpollFlags::EPOLLRDHUP,
                ),
            },
        }))
    }
}

#[expect(
    clippy::cast_sign_loss,
    reason = "registered descriptors are never negative"
)]
const fn fd_to_token(fd: RawFd) -> u64 {
    fd as u64
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "tokens are produced from descriptors by fd_to_token"
)]
const fn token_to_fd(token: u64) -> RawFd {
    token as RawFd
}

/// Milliseconds to block, rounded up and clamped; `None` blocks forever.
fn timeout_millis(timeout: Option<Duration>) -> Option<i32> {
    timeout.map(|duration| {
        // Round up so that a sub-millisecond timeout still sleeps.
        let millis = duration.as_nanos().div_ceil(1_000_000);
        i32::try_from(millis).unwrap_or(i32::MAX)
    })
}

fn epoll_timeout(timeout: Option<Duration>) -> EpollTimeout {
    timeout_millis(timeout)
        .and_then(|millis| EpollTimeout::try_from(millis).ok())
        .unwrap_or(EpollTimeout::NONE)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(None, None)]
    #[case(Some(Duration::ZERO), Some(0))]
    #[case(Some(Duration::from_micros(10)), Some(1))]
    #[case(Some(Duration::from_millis(250)), Some(250))]
    #[case(Some(Duration::from_secs(u64::MAX)), Some(i32::MAX))]
    fn converts_timeouts_to_milliseconds(
        #[case] timeout: Option<Duration>,
        #[case] expected: Option<i32>,
    ) {
        assert_eq!(timeout_millis(timeout), expected);
    }

    #[test]
    fn builds_epoll_timeouts() {
        assert_eq!(epoll_timeout(None), EpollTimeout::NONE);
        assert_eq!(epoll_timeout(Some(Duration::ZERO)), EpollTimeout::ZERO);
        assert_eq!(
            epoll_timeout(Some(Duration::from_millis(250))),
            EpollTimeout::try_from(250_i32).expect("valid timeout")
        );
    }

    #[test]
    fn event_mask_always_watches_peer_hangup() {
        let event = EpollPoller::event_for(7, Interest::NONE);
        assert_eq!(event.events(), EpollFlags::EPOLLRDHUP);
        assert_eq!(event.data(), 7);

        let both = EpollPoller::event_for(7, Interest::READABLE.union(Interest::WRITABLE));
        assert!(both.events().contains(EpollFlags::EPOLLIN | EpollFlags::EPOLLOUT));
    }
}
