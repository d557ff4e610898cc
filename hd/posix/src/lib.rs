//! # HD POSIX Port
//!
//! Runs the slave engine on a hosted system. Linking this crate installs
//! the `critical-section` implementation backed by a std mutex, and
//! [`StdPort`] supplies the monotonic millisecond clock and the idle hook
//! used by blocking queue operations.

pub mod port;

pub use port::StdPort;
