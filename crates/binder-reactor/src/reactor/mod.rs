//! Descriptor and watcher bookkeeping plus the blocking `wait` loop.
//!
//! A [`Reactor`] keeps one descriptor per watched file handle. Each
//! descriptor owns an ordered list of [`Watcher`] handles, and the OS sees a
//! single registration per descriptor whose interest is the union of the
//! callbacks attached by every watcher. The OS poller is created lazily on
//! the first [`Reactor::open`].
//!
//! Callbacks receive the reactor and their own watcher handle. The internal
//! lock is released before any callback runs, so callbacks may open, update,
//! or close watchers, including their own.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::{debug, trace, warn};

use crate::error::ReactorError;
use crate::interest::{Interest, Readiness};
use crate::poller::{EpollPoller, PollEvent, Poller};


const REACTOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::reactor");

/// Callback invoked when a watched readiness condition is reported.
pub type Callback = Box<dyn FnMut(&Reactor, Watcher) + Send>;

type PollerFactory = Box<dyn Fn() -> io::Result<Box<dyn Poller>> + Send + Sync>;

/// Opaque handle to a registered watcher.
///
/// Handles are never reused, so a stale handle is always detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Watcher(u64);

impl fmt::Display for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watcher #{}", self.0)
    }
}

/// Result of a single [`Reactor::wait`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A descriptor became ready and its callbacks were delivered.
    Dispatched,
    /// The timeout elapsed without any readiness.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Readable,
    Writable,
    Hangup,
}

impl Event {
    const fn is_pending(self, readiness: Readiness) -> bool {
        match self {
            Self::Readable => readiness.readable,
            Self::Writable => readiness.writable,
            Self::Hangup => readiness.hangup,
        }
    }

    const fn consume(self, readiness: &mut Readiness) {
        match self {
            Self::Readable => readiness.readable = false,
            Self::Writable => readiness.writable = false,
            Self::Hangup => readiness.hangup = false,
        }
    }
}

/// A callback slot. `Running` marks a callback lent out to a delivery.
enum Slot {
    Empty,
    Idle(Callback),
    Running,
}

impl Slot {
    const fn is_armed(&self) -> bool {
        !matches!(self, Self::Empty)
    }
}

struct WatcherEntry {
    fd: RawFd,
    readable: Slot,
    writable: Slot,
    hangup: Slot,
}

impl WatcherEntry {
    const fn new(fd: RawFd) -> Self {
        Self {
            fd,
            readable: Slot::Empty,
            writable: Slot::Empty,
            hangup: Slot::Empty,
        }
    }

    const fn slot_mut(&mut self, event: Event) -> &mut Slot {
        match event {
            Event::Readable => &mut self.readable,
            Event::Writable => &mut self.writable,
            Event::Hangup => &mut self.hangup,
        }
    }

    const fn interest(&self) -> Interest {
        let mut interest = Interest::NONE;
        if self.readable.is_armed() {
            interest = interest.union(Interest::READABLE);
        }
        if self.writable.is_armed() {
            interest = interest.union(Interest::WRITABLE);
        }
        interest
    }
}

struct Descriptor {
    interest: Interest,
    watchers: Vec<Watcher>,
}

#[derive(Default)]
struct State {
    descriptors: HashMap<RawFd, Descriptor>,
    watchers: HashMap<Watcher, WatcherEntry>,
    next_id: u64,
    current: Option<Watcher>,
}

impl State {
    fn entry_mut(&mut self, watcher: Watcher) -> Result<&mut WatcherEntry, ReactorError> {
        self.watchers
            .get_mut(&watcher)
            .ok_or_else(|| ReactorError::invalid_watcher(watcher))
    }

    fn aggregate_interest(&self, fd: RawFd) -> Interest {
        self.descriptors.get(&fd).map_or(Interest::NONE, |descriptor| {
            descriptor
                .watchers
                .iter()
                .filter_map(|watcher| self.watchers.get(watcher))
                .fold(Interest::NONE, |acc, entry| acc.union(entry.interest()))
        })
    }
}

/// Readiness multiplexer over one OS poller instance.
pub struct Reactor {
    state: Mutex<State>,
    poller: OnceCell<Box<dyn Poller>>,
    factory: PollerFactory,
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Reactor")
            .field("descriptors", &state.descriptors.len())
            .field("watchers", &state.watchers.len())
            .field("initialised", &self.poller.get().is_some())
            .finish()
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reactor {
    /// Creates a reactor backed by `epoll(7)`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_poller_factory(|| {
            EpollPoller::new().map(|poller| Box::new(poller) as Box<dyn Poller>)
        })
    }

    /// Creates a reactor whose OS poller is built by `factory` on first use.
    #[must_use]
    pub fn with_poller_factory<F>(factory: F) -> Self
    where
        F: Fn() -> io::Result<Box<dyn Poller>> + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(State::default()),
            poller: OnceCell::new(),
            factory: Box::new(factory),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new watcher on `fd`.
    ///
    /// The watcher starts with no callbacks. The descriptor is created and
    /// registered with the OS when `fd` is not already watched.
    ///
    /// # Errors
    ///
    /// Returns [`ReactorError::Create`] when the OS poller cannot be created
    /// and [`ReactorError::Register`] when the OS refuses the descriptor.
    pub fn open(&self, fd: RawFd) -> Result<Watcher, ReactorError> {
        let poller = self
            .poller
            .get_or_try_init(|| (self.factory)())
            .map_err(ReactorError::create)?;

        let mut state = self.lock();
        if !state.descriptors.contains_key(&fd) {
            poller
                .register(fd, Interest::NONE)
                .map_err(|source| ReactorError::register(fd, source))?;
            state.descriptors.insert(
                fd,
                Descriptor {
                    interest: Interest::NONE,
                    watchers: Vec::new(),
                },
            );
            debug!(target: REACTOR_TARGET, fd, "descriptor registered");
        }

        let watcher = Watcher(state.next_id);
        state.next_id += 1;
        state.watchers.insert(watcher, WatcherEntry::new(fd));
        if let Some(descriptor) = state.descriptors.get_mut(&fd) {
            descriptor.watchers.push(watcher);
        }
        trace!(target: REACTOR_TARGET, fd, %watcher, "watcher opened");
        Ok(watcher)
    }

    /// Attaches or replaces the readable callback of `watcher`.
    ///
    /// # Errors
    ///
    /// Returns [`ReactorError::InvalidWatcher`] for a closed handle and
    /// [`ReactorError::Register`] when the OS rejects the new interest.
    pub fn on_readable<F>(&self, watcher: Watcher, callback: F) -> Result<(), ReactorError>
    where
        F: FnMut(&Self, Watcher) + Send + 'static,
    {
        let callback: Callback = Box::new(callback);
        self.attach(watcher, Event::Readable, Some(callback))
    }

    /// Attaches or replaces the writable callback of `watcher`.
    ///
    /// # Errors
    ///
    /// As for [`Reactor::on_readable`].
    pub fn on_writable<F>(&self, watcher: Watcher, callback: F) -> Result<(), ReactorError>
    where
        F: FnMut(&Self, Watcher) + Send + 'static,
    {
        let callback: Callback = Box::new(callback);
        self.attach(watcher, Event::Writable, Some(callback))
    }

    /// Attaches or replaces the hangup callback of `watcher`.
    ///
    /// Hangup is always reported by the OS, so the interest is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ReactorError::InvalidWatcher`] for a closed handle.
    pub fn on_hangup<F>(&self, watcher: Watcher, callback: F) -> Result<(), ReactorError>
    where
        F: FnMut(&Self, Watcher) + Send + 'static,
    {
        let callback: Callback = Box::new(callback);
        self.attach(watcher, Event::Hangup, Some(callback))
    }

    /// Detaches the writable callback of `watcher`, shrinking the interest.
    ///
    /// # Errors
    ///
    /// As for [`Reactor::on_readable`].
    pub fn clear_writable(&self, watcher: Watcher) -> Result<(), ReactorError> {
        self.attach(watcher, Event::Writable, None)
    }

    fn attach(
        &self,
        watcher: Watcher,
        event: Event,
        callback: Option<Callback>,
    ) -> Result<(), ReactorError> {
        let mut state = self.lock();
        let entry = state.entry_mut(watcher)?;
        let fd = entry.fd;
        let previous = std::mem::replace(
            entry.slot_mut(event),
            callback.map_or(Slot::Empty, Slot::Idle),
        );
        let result = match event {
            Event::Hangup => Ok(()),
            Event::Readable | Event::Writable => self.apply_interest(&mut state, fd),
        };
        drop(state);
        drop(previous);
        result
    }

    fn apply_interest(&self, state: &mut State, fd: RawFd) -> Result<(), ReactorError> {
        let wanted = state.aggregate_interest(fd);
        let Some(descriptor) = state.descriptors.get_mut(&fd) else {
            return Ok(());
        };
        if descriptor.interest == wanted {
            return Ok(());
        }
        if let Some(poller) = self.poller.get() {
            poller
                .reregister(fd, wanted)
                .map_err(|source| ReactorError::register(fd, source))?;
        }
        descriptor.interest = wanted;
        trace!(
            target: REACTOR_TARGET,
            fd,
            readable = wanted.is_readable(),
            writable = wanted.is_writable(),
            "interest updated"
        );
        Ok(())
    }

    /// Removes and invalidates `watcher`.
    ///
    /// Closing the last watcher of a descriptor deregisters the descriptor
    /// from the OS. Safe to call from the watcher's own callback.
    ///
    /// # Errors
    ///
    /// Returns [`ReactorError::InvalidWatcher`] when `watcher` is not open.
    pub fn close(&self, watcher: Watcher) -> Result<(), ReactorError> {
        let mut state = self.lock();
        let entry = state
            .watchers
            .remove(&watcher)
            .ok_or_else(|| ReactorError::invalid_watcher(watcher))?;
        if state.current == Some(watcher) {
            state.current = None;
        }

        let fd = entry.fd;
        let emptied = state.descriptors.get_mut(&fd).is_some_and(|descriptor| {
            descriptor.watchers.retain(|candidate| *candidate != watcher);
            descriptor.watchers.is_empty()
        });

        if emptied {
            state.descriptors.remove(&fd);
            if let Some(poller) = self.poller.get() {
                if let Err(error) = poller.deregister(fd) {
                    warn!(target: REACTOR_TARGET, fd, %error, "failed to deregister descriptor");
                }
            }
            debug!(target: REACTOR_TARGET, fd, "descriptor released");
        } else if let Err(error) = self.apply_interest(&mut state, fd) {
            warn!(target: REACTOR_TARGET, fd, %error, "failed to shrink interest after close");
        }
        trace!(target: REACTOR_TARGET, fd, %watcher, "watcher closed");
        drop(state);
        drop(entry);
        Ok(())
    }

    /// Number of live watchers on `fd`.
    #[must_use]
    pub fn watcher_count(&self, fd: RawFd) -> usize {
        self.lock()
            .descriptors
            .get(&fd)
            .map_or(0, |descriptor| descriptor.watchers.len())
    }

    /// Whether a descriptor exists for `fd`.
    #[must_use]
    pub fn is_watched(&self, fd: RawFd) -> bool {
        self.lock().descriptors.contains_key(&fd)
    }

    /// Interest currently registered with the OS for `fd`.
    #[must_use]
    pub fn interest(&self, fd: RawFd) -> Option<Interest> {
        self.lock()
            .descriptors
            .get(&fd)
            .map(|descriptor| descriptor.interest)
    }

    /// Blocks until one descriptor is ready or `timeout` elapses, then
    /// delivers its callbacks.
    ///
    /// `None` blocks indefinitely and `Some(Duration::ZERO)` polls. Interrupted
    /// waits are retried.
    ///
    /// # Errors
    ///
    /// Returns [`ReactorError::Uninitialised`] when no descriptor was ever
    /// opened and [`ReactorError::Wait`] when the OS wait fails.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<WaitOutcome, ReactorError> {
        let poller = self.poller.get().ok_or(ReactorError::Uninitialised)?;
        let event = loop {
            match poller.poll(timeout) {
                Ok(event) => break event,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                    trace!(target: REACTOR_TARGET, "wait interrupted, retrying");
                }
                Err(source) => return Err(ReactorError::Wait { source }),
            }
        };

        match event {
            Some(event) => {
                self.dispatch(event);
                Ok(WaitOutcome::Dispatched)
            }
            None => Ok(WaitOutcome::TimedOut),
        }
    }

    fn dispatch(&self, event: PollEvent) {
        let chain = self
            .lock()
            .descriptors
            .get(&event.fd)
            .map(|descriptor| descriptor.watchers.clone());
        let Some(chain) = chain else {
            trace!(target: REACTOR_TARGET, fd = event.fd, "readiness for unknown descriptor");
            return;
        };

        let mut pending = event.readiness;
        for watcher in chain {
            if pending.is_empty() {
                break;
            }
            for kind in [Event::Readable, Event::Writable, Event::Hangup] {
                if !kind.is_pending(pending) {
                    continue;
                }
                match self.deliver(watcher, kind) {
                    Delivery::Skipped => {}
                    Delivery::Delivered { alive } => {
                        kind.consume(&mut pending);
                        if !alive || kind == Event::Hangup {
                            break;
                        }
                    }
                    Delivery::Gone => break,
                }
            }
        }
    }

    fn deliver(&self, watcher: Watcher, kind: Event) -> Delivery {
        let (mut callback, previous) = {
            let mut state = self.lock();
            let Some(entry) = state.watchers.get_mut(&watcher) else {
                return Delivery::Gone;
            };
            let slot = entry.slot_mut(kind);
            let callback = match std::mem::replace(slot, Slot::Running) {
                Slot::Idle(callback) => callback,
                other => {
                    *slot = other;
                    return Delivery::Skipped;
                }
            };
            (callback, state.current.replace(watcher))
        };

        callback(self, watcher);

        let mut state = self.lock();
        let closed = state.current != Some(watcher);
        state.current = previous;
        let alive = !closed && state.watchers.contains_key(&watcher);
        if alive {
            if let Some(slot) = state
                .watchers
                .get_mut(&watcher)
                .map(|entry| entry.slot_mut(kind))
                .filter(|slot| matches!(**slot, Slot::Running))
            {
                *slot = Slot::Idle(callback);
                return Delivery::Delivered { alive };
            }
        }
        drop(state);
        drop(callback);
        Delivery::Delivered { alive }
    }
}

enum Delivery {
    Skipped,
    Delivered { alive: bool },
    Gone,
}
