//! A fixed-capacity, lock-free, single-writer / multi-reader hash table.
//!
//! `seqtab` provides a [`Writer`]/[`Reader`] handle pair over a hash table
//! designed for placement in memory shared between cooperating threads or
//! processes. One writer mutates; any number of readers query; no
//! operation ever takes a mutex. Readers validate their copies with a
//! per-node seqlock, so they never observe a torn value and never mistake
//! a recycled slot for the entry they were probing.
//!
//! # Overview
//!
//! The table is three flat arrays: `B` atomic bucket heads, `N` node
//! slots, and a bitmap allocator over the slot indices, with
//! `B = next_prime(2N)` keeping expected chain length below one. Nodes
//! never move and are never deallocated; a slot index is a stable handle,
//! and every linkage is an index rather than a pointer, which is what
//! makes the layout process-agnostic.
//!
//! # Usage
//!
//! ```
//! use seqtab::{Writer, ConstParams};
//!
//! let (mut writer, reader) = Writer::<u64, u64, ConstParams<100>>::new();
//!
//! writer.store(7, 49).unwrap();
//!
//! assert_eq!(reader.read(&7), Some(49));
//! assert!(writer.remove(&7));
//! assert_eq!(reader.read(&7), None);
//! ```
//!
//! # Configuration
//!
//! Capacity is fixed at compile time through the [`Params`] trait; use
//! [`ConstParams`] for custom capacities and [`DefaultParams`]
//! ([`Capacity::DEF`] slots) otherwise. Capacity never changes at runtime:
//! when the allocator is exhausted, [`Writer::store`] reports
//! [`Overflow`].
//!
//! # Concurrency
//!
//! The [`Writer`] handle is unique and mutates through `&mut self`, which
//! enforces the single-writer contract statically. [`Reader`] handles are
//! cloneable and may be used from any number of threads:
//!
//! ```
//! use std::thread;
//!
//! use seqtab::Writer;
//!
//! let (mut writer, reader) = Writer::<u64, u64>::new();
//!
//! let probe = {
//!   let reader = reader.clone();
//!   thread::spawn(move || {
//!     while reader.read(&1).is_none() {
//!       thread::yield_now();
//!     }
//!     reader.read(&1)
//!   })
//! };
//!
//! writer.store(1, 10).unwrap();
//!
//! assert_eq!(probe.join().unwrap(), Some(10));
//! ```
//!
//! The writer is wait-free; readers are lock-free and retry with bounded
//! exponential backoff when they race a write.
//!
//! # Memory Layout
//!
//! Keys and values must be [`Copy`]: entries are stored as plain bits and
//! returned by value, and the structure holds no pointers into private
//! heaps. The bucket array, the node array, and the allocator bitmap are
//! each allocated on their own cache-line boundary so reader traffic on
//! buckets does not contend with writer traffic on the allocator. The
//! default build hasher is deterministic, keeping bucket derivation
//! identical across processes that map the same table.

mod array;
mod node;
mod padded;
mod params;
mod public;
mod slots;
mod table;
mod utils;

pub(crate) use crate::utils::alloc;
pub(crate) use crate::utils::cell;
pub(crate) use crate::utils::hint;
pub(crate) use crate::utils::sync;

pub mod implementation {
  #![doc = include_str!("../IMPLEMENTATION.md")]
}

pub mod config {
  //! Configuration parameters which can be used to override the default
  //! table settings.

  pub use crate::params::CACHE_LINE;
  pub use crate::params::Capacity;
  pub use crate::params::ConstParams;
  pub use crate::params::DebugParams;
  pub use crate::params::DefaultParams;
  pub use crate::params::Params;
  pub use crate::params::ParamsExt;
}

#[doc(inline)]
pub use self::config::Capacity;

#[doc(inline)]
pub use self::config::ConstParams;

#[doc(inline)]
pub use self::config::DefaultParams;

#[doc(inline)]
pub use self::config::Params;

#[doc(inline)]
pub use self::config::ParamsExt;

pub use self::public::Overflow;
pub use self::public::Reader;
pub use self::public::Writer;
