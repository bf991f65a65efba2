//! Test suites for the binder bootstrap and serving loop.

mod server;
mod support;
