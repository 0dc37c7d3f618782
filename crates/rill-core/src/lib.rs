//! # rill-core
//!
//! Core types shared by every layer of the Rill runtime:
//!
//! - [`Pid`] - Unique process identifier
//! - [`Term`] - Serialization trait for values crossing process boundaries
//! - [`ExitReason`] - Why a process stopped running

#![deny(warnings)]
#![deny(missing_docs)]

mod exit;
mod pid;
mod term;

pub use exit::ExitReason;
pub use pid::Pid;
pub use term::{DecodeError, Term};
