//! Per-connection JSONL framing driven by reactor callbacks.
//!
//! Inbound bytes are buffered until a newline completes a call line; each
//! line is dispatched in arrival order. Replies are written straight away
//! and any remainder the socket refuses is kept in an outbound buffer that a
//! writable callback drains. On EOF or hangup the connection closes its
//! watcher once pending replies are written, and straight away on a read or
//! write error; dropping the last callback closes the socket.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use binder_reactor::{Reactor, ReactorError, Watcher};
use tracing::{debug, warn};

use super::CONNECTION_TARGET;
use crate::dispatch::{DispatchError, Dispatcher, MAX_LINE_BYTES, Reply};

const READ_CHUNK: usize = 4096;

/// Accepted client stream.
#[derive(Debug)]
pub enum ConnectionStream {
    /// TCP client.
    Tcp(TcpStream),
    /// Unix domain socket client.
    Unix(UnixStream),
}

impl ConnectionStream {
    /// Switches the stream's blocking mode.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.set_nonblocking(nonblocking),
            Self::Unix(stream) => stream.set_nonblocking(nonblocking),
        }
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            Self::Unix(stream) => stream.flush(),
        }
    }
}

impl AsRawFd for ConnectionStream {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Self::Tcp(stream) => stream.as_raw_fd(),
            Self::Unix(stream) => stream.as_raw_fd(),
        }
    }
}

/// What the read side observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inbound {
    Open,
    Eof,
    Failed,
}

/// State of the outbound buffer after a write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flush {
    Drained,
    Pending,
    Failed,
}

type Shared<S> = Arc<Mutex<Connection<S>>>;

/// Buffered state of one client connection.
pub(crate) struct Connection<S> {
    stream: S,
    inbound: Vec<u8>,
    outbound: Vec<u8>,
    discarding: bool,
    writable_armed: bool,
    closing: bool,
    dispatcher: Arc<Mutex<Dispatcher>>,
    this: Weak<Mutex<Connection<S>>>,
}

impl<S> Connection<S>
where
    S: Read + Write + AsRawFd + Send + 'static,
{
    pub(crate) fn new(stream: S, dispatcher: Arc<Mutex<Dispatcher>>) -> Self {
        Self {
            stream,
            inbound: Vec::new(),
            outbound: Vec::new(),
            discarding: false,
            writable_armed: false,
            closing: false,
            dispatcher,
            this: Weak::new(),
        }
    }

    /// Registers the connection with `reactor` and hands ownership to its
    /// callbacks.
    pub(crate) fn register(self, reactor: &Reactor) -> Result<Watcher, ReactorError> {
        let fd = self.stream.as_raw_fd();
        let watcher = reactor.open(fd)?;
        let shared: Shared<S> = Arc::new_cyclic(|this| {
            let mut connection = self;
            connection.this = Weak::clone(this);
            Mutex::new(connection)
        });

        let reading = Arc::clone(&shared);
        let hangup = shared;
        let attached = reactor
            .on_readable(watcher, move |reactor, watcher| {
                lock(&reading).service(reactor, watcher, false);
            })
            .and_then(|()| {
                reactor.on_hangup(watcher, move |reactor, watcher| {
                    lock(&hangup).service(reactor, watcher, true);
                })
            });
        if let Err(error) = attached {
            reactor.close(watcher).ok();
            return Err(error);
        }
        debug!(target: CONNECTION_TARGET, fd, %watcher, "connection registered");
        Ok(watcher)
    }

    /// Reads what is available, dispatches complete lines, and flushes.
    fn service(&mut self, reactor: &Reactor, watcher: Watcher, hangup: bool) {
        let inbound = self.fill();
        self.dispatch_lines();
        if inbound == Inbound::Eof && !self.inbound.is_empty() && !self.discarding {
            let last = std::mem::take(&mut self.inbound);
            self.dispatch_line(&last);
        }

        if hangup || inbound == Inbound::Eof {
            self.closing = true;
        }
        let flush = self.flush();
        if inbound == Inbound::Failed {
            self.finish(reactor, watcher);
            return;
        }
        self.settle(reactor, watcher, flush);
    }

    /// Writable callback: drains pending replies.
    fn resume_writing(&mut self, reactor: &Reactor, watcher: Watcher) {
        let flush = self.flush();
        self.settle(reactor, watcher, flush);
    }

    /// Closes once a closing connection has drained, otherwise keeps write
    /// interest in step with the outbound buffer.
    fn settle(&mut self, reactor: &Reactor, watcher: Watcher, flush: Flush) {
        match flush {
            Flush::Failed => self.finish(reactor, watcher),
            Flush::Drained if self.closing => self.finish(reactor, watcher),
            flush => self.update_write_interest(reactor, watcher, flush),
        }
    }

    fn fill(&mut self) -> Inbound {
        let mut chunk = [0_u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Inbound::Eof,
                Ok(count) => self
                    .inbound
                    .extend_from_slice(chunk.get(..count).unwrap_or_default()),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Inbound::Open,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => {
                    warn!(target: CONNECTION_TARGET, %error, "connection read failed");
                    return Inbound::Failed;
                }
            }
        }
    }

    fn dispatch_lines(&mut self) {
        while let Some(end) = self.inbound.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.inbound.drain(..=end).collect();
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            self.dispatch_line(&line);
        }

        if !self.discarding && self.inbound.len() > MAX_LINE_BYTES {
            let error = DispatchError::request_too_large(self.inbound.len(), MAX_LINE_BYTES);
            warn!(target: CONNECTION_TARGET, %error, "discarding oversized call line");
            self.queue(&Reply::failure(error.status(), Some(error.to_string())));
            self.discarding = true;
        }
        if self.discarding {
            self.inbound.clear();
        }
    }

    fn dispatch_line(&mut self, line: &[u8]) {
        if line.trim_ascii().is_empty() {
            return;
        }
        let reply = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle_line(line);
        self.queue(&reply);
    }

    fn queue(&mut self, reply: &Reply) {
        match reply.to_line() {
            Ok(line) => self.outbound.extend_from_slice(&line),
            Err(error) => warn!(target: CONNECTION_TARGET, %error, "dropping unencodable reply"),
        }
    }

    /// Writes as much of the outbound buffer as the socket takes.
    fn flush(&mut self) -> Flush {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => {
                    warn!(target: CONNECTION_TARGET, "connection stopped accepting writes");
                    return Flush::Failed;
                }
                Ok(count) => {
                    self.outbound.drain(..count);
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Flush::Pending,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => {
                    warn!(target: CONNECTION_TARGET, %error, "connection write failed");
                    return Flush::Failed;
                }
            }
        }
        Flush::Drained
    }

    /// Arms the writable callback while replies are pending and detaches it
    /// once they drain.
    fn update_write_interest(&mut self, reactor: &Reactor, watcher: Watcher, flush: Flush) {
        let updated = match (flush, self.writable_armed) {
            (Flush::Pending, false) => self.arm_writer(reactor, watcher).map(|()| true),
            (Flush::Drained, true) => reactor.clear_writable(watcher).map(|()| false),
            (_, armed) => Ok(armed),
        };
        match updated {
            Ok(armed) => self.writable_armed = armed,
            Err(error) => {
                warn!(target: CONNECTION_TARGET, %error, "failed to update write interest");
                self.finish(reactor, watcher);
            }
        }
    }

    fn arm_writer(&self, reactor: &Reactor, watcher: Watcher) -> Result<(), ReactorError> {
        let Some(shared) = self.this.upgrade() else {
            return Ok(());
        };
        reactor.on_writable(watcher, move |reactor, watcher| {
            lock(&shared).resume_writing(reactor, watcher);
        })
    }

    fn finish(&mut self, reactor: &Reactor, watcher: Watcher) {
        self.outbound.clear();
        self.writable_armed = false;
        if let Err(error) = reactor.close(watcher) {
            debug!(target: CONNECTION_TARGET, %error, "connection already closed");
            return;
        }
        debug!(target: CONNECTION_TARGET, %watcher, "connection closed");
    }
}

fn lock<S>(shared: &Shared<S>) -> MutexGuard<'_, Connection<S>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
