//! Shared foundational types used across the Silica packing flow.
//!
//! This crate provides interned identifiers, content hashing for file
//! provenance, and the common result types used by every other crate.

#![warn(missing_docs)]

pub mod arena;
pub mod hash;
pub mod ident;
pub mod result;

pub use arena::{Arena, ArenaId};
pub use hash::ContentHash;
pub use ident::{Ident, Interner};
pub use result::{InternalError, SilicaResult};
