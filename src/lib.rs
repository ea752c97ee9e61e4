//! # Masque
//!
//! A protocol-shaping engine for censorship circumvention: application
//! traffic is disguised as another protocol by driving a finite-state
//! machine "format" description with probabilistic and conditional
//! transitions, each bound to plugin actions that read and write framed
//! data over a connection. Passive observers see traffic resembling the
//! mimicked protocol instead of the real payload.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Format Table (compiled, external)           │
//! ├─────────────────────────────────────────────────────────┤
//! │  FSM Driver (transition selection, action dispatch)      │
//! ├─────────────────────────────────────────────────────────┤
//! │  Plugin Actions (byte-exact I/O, timing jitter)          │
//! ├─────────────────────────────────────────────────────────┤
//! │  Streams (per-channel buffers, multiplexed as cells)     │
//! ├─────────────────────────────────────────────────────────┤
//! │  Connection (read/write/timeout capability, TCP/TLS)     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Goals
//!
//! 1. **Byte-exactness**: every shaped payload lands in full, across any
//!    sequence of partial writes and transport timeouts
//! 2. **Agreement**: both parties deterministically select the same
//!    transition given the same bytes and seed
//! 3. **Isolation**: independent sessions share no state and can run
//!    concurrently on separate tasks

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod conn;
pub mod error;
pub mod format;
pub mod fsm;
pub mod plugin;
pub mod stream;
pub mod value;

pub use conn::{Connection, TcpConn};
pub use error::{Error, Result};
pub use format::{ActionCall, Format, Guard, Party, Transition};
pub use fsm::Fsm;
pub use stream::{Stream, StreamId, StreamSet};
pub use value::Value;

/// Maximum number of recently received bytes a transition guard pattern is
/// matched against.
pub const GUARD_WINDOW: usize = 256;

/// Seed for a fresh session's transition RNG, until the caller installs a
/// shared one via [`Fsm::reseed`].
pub const DEFAULT_SEED: u64 = 0x6d61_7371_7565;
