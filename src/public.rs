use core::fmt::Debug;
use core::fmt::Display;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;
use core::hash::BuildHasher;
use core::hash::Hash;
use std::error::Error;
use std::sync::Arc;

use equivalent::Equivalent;
use foldhash::fast::FixedState;

use crate::params::DefaultParams;
use crate::params::Params;
use crate::params::ParamsExt;
use crate::table::Table;

// -----------------------------------------------------------------------------
// Overflow
// -----------------------------------------------------------------------------

/// The error returned by [`Writer::store`] when every slot is allocated
/// and the key is not already present.
///
/// A failed store leaves the table unchanged; updating a resident key
/// never allocates and therefore never overflows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Overflow;

impl Display for Overflow {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.write_str("table overflow: all slots are allocated")
  }
}

impl Error for Overflow {}

// -----------------------------------------------------------------------------
// Writer
// -----------------------------------------------------------------------------

/// The unique writing handle of a table.
///
/// A table is created as a `(Writer, Reader)` pair; the `Writer` cannot be
/// cloned, which enforces the table's single-writer contract statically.
/// Mutation goes through `&mut self`, so a `Writer` shared behind an `Arc`
/// still cannot issue concurrent stores.
///
/// The writer can also read; its lookups use the same lock-free path as
/// [`Reader`].
///
/// # Key and value requirements
///
/// Keys and values are stored as plain bits and handed back by value, so
/// both must be [`Copy`]. Types owning external resources (heap pointers,
/// handles) are unsuitable; this is what makes the table layout
/// self-contained and shared-memory safe.
///
/// # Hashing
///
/// The default build hasher is [`FixedState`], which is deterministic: two
/// processes attaching to the same table bytes derive identical bucket
/// placement. The bucket count and the hash function are part of the
/// table's ABI, so every participant must use the same `S`.
///
/// # Examples
///
/// ```
/// use seqtab::{Writer, ConstParams};
///
/// let (mut writer, reader) = Writer::<u64, u64, ConstParams<100>>::new();
///
/// writer.store(7, 49).unwrap();
/// assert_eq!(reader.read(&7), Some(49));
///
/// assert!(writer.remove(&7));
/// assert_eq!(reader.read(&7), None);
/// ```
pub struct Writer<K, V, P = DefaultParams, S = FixedState>
where
  P: Params + ?Sized,
{
  table: Arc<Table<K, V, P, S>>,
}

impl<K, V, P, S> Writer<K, V, P, S>
where
  K: Copy + Eq + Hash,
  V: Copy,
  P: Params + ?Sized,
  S: BuildHasher,
{
  /// Creates a new table and returns its handle pair.
  ///
  /// # Examples
  ///
  /// ```
  /// use seqtab::Writer;
  ///
  /// let (writer, reader) = Writer::<u64, u64>::new();
  ///
  /// assert!(writer.is_empty());
  /// assert_eq!(reader.capacity(), 1024);
  /// ```
  #[inline]
  pub fn new() -> (Self, Reader<K, V, P, S>)
  where
    S: Default,
  {
    Self::with_hasher(S::default())
  }

  /// Creates a new table using the provided build hasher.
  ///
  /// The hasher must be deterministic and identical across every process
  /// attaching to the table; see the [type-level docs](Writer#hashing).
  #[inline]
  pub fn with_hasher(build: S) -> (Self, Reader<K, V, P, S>) {
    let table: Arc<Table<K, V, P, S>> = Arc::new(Table::with_hasher(build));

    (
      Self {
        table: Arc::clone(&table),
      },
      Reader { table },
    )
  }

  /// Mints an additional reading handle.
  #[inline]
  pub fn reader(&self) -> Reader<K, V, P, S> {
    Reader {
      table: Arc::clone(&self.table),
    }
  }

  /// Stores `value` under `key`.
  ///
  /// If the key is already present its value is overwritten in place;
  /// otherwise a free slot is allocated and published at the head of the
  /// key's bucket chain. Readers concurrently traversing the chain either
  /// see the full new entry or none of it.
  ///
  /// # Errors
  ///
  /// Returns [`Overflow`] when the key is absent and every slot is taken.
  /// The table is left unchanged.
  ///
  /// # Examples
  ///
  /// ```
  /// use seqtab::{Writer, ConstParams, Overflow};
  ///
  /// let (mut writer, _reader) = Writer::<u64, u64, ConstParams<1>>::new();
  ///
  /// writer.store(1, 10).unwrap();
  /// writer.store(1, 11).unwrap(); // in-place update: no allocation
  ///
  /// assert_eq!(writer.store(2, 20), Err(Overflow));
  /// ```
  #[inline]
  pub fn store(&mut self, key: K, value: V) -> Result<(), Overflow> {
    // SAFETY: `Writer` is not `Clone` and mutation requires `&mut self`,
    // so this thread is the table's unique writer for the duration.
    unsafe { self.table.store(key, value) }
  }

  /// Removes the entry matching `key`.
  ///
  /// Returns `true` if a matching entry was present and removed. The slot
  /// becomes available for reuse immediately; readers still probing it
  /// detect the reuse through the node's version counter.
  ///
  /// # Examples
  ///
  /// ```
  /// use seqtab::Writer;
  ///
  /// let (mut writer, _reader) = Writer::<u64, u64>::new();
  ///
  /// writer.store(1, 10).unwrap();
  ///
  /// assert!(writer.remove(&1));
  /// assert!(!writer.remove(&1));
  /// ```
  #[inline]
  pub fn remove<Q>(&mut self, key: &Q) -> bool
  where
    Q: Hash + Equivalent<K> + ?Sized,
  {
    // SAFETY: As in `store`: the unique writer, serialised by `&mut self`.
    unsafe { self.table.remove(key) }
  }

  /// Returns a copy of the value stored under `key`, or `None`.
  #[inline]
  pub fn read<Q>(&self, key: &Q) -> Option<V>
  where
    Q: Hash + Equivalent<K> + ?Sized,
  {
    self.table.read(key)
  }

  /// Calls `f` with a copy of every entry observed live during a single
  /// pass; see [`Reader::visit`] for the consistency caveats.
  #[inline]
  pub fn visit<F>(&self, f: F)
  where
    F: FnMut(K, V),
  {
    self.table.visit(f)
  }

  /// Returns the number of entries currently stored.
  #[inline]
  pub fn len(&self) -> usize {
    self.table.len()
  }

  /// Returns `true` if the table contains no entries.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns the fixed number of slots.
  #[inline]
  pub fn capacity(&self) -> usize {
    self.table.cap()
  }
}

impl<K, V, P, S> Debug for Writer<K, V, P, S>
where
  K: Copy + Eq + Hash + Debug,
  V: Copy + Debug,
  P: Params + ?Sized,
  S: BuildHasher,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("Writer")
      .field("params", &P::debug())
      .field("entries", &self.table)
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Reader
// -----------------------------------------------------------------------------

/// A cloneable reading handle of a table.
///
/// Any number of readers may run concurrently with each other and with the
/// [`Writer`]. Lookups return by-value copies validated by the per-node
/// version discipline: a reader never observes a torn value and never
/// mistakes a recycled slot for the entry it was looking for.
///
/// # Examples
///
/// ```
/// use std::thread;
///
/// use seqtab::Writer;
///
/// let (mut writer, reader) = Writer::<u64, u64>::new();
///
/// writer.store(1, 10).unwrap();
///
/// let handles: Vec<_> = (0..4)
///   .map(|_| {
///     let reader = reader.clone();
///     thread::spawn(move || reader.read(&1))
///   })
///   .collect();
///
/// for handle in handles {
///   assert_eq!(handle.join().unwrap(), Some(10));
/// }
/// ```
pub struct Reader<K, V, P = DefaultParams, S = FixedState>
where
  P: Params + ?Sized,
{
  table: Arc<Table<K, V, P, S>>,
}

impl<K, V, P, S> Reader<K, V, P, S>
where
  K: Copy + Eq + Hash,
  V: Copy,
  P: Params + ?Sized,
  S: BuildHasher,
{
  /// Returns a copy of the value stored under `key`, or `None`.
  ///
  /// Lookups may use any borrowed form of the key type, provided it
  /// hashes and compares identically ([`Equivalent`]); both paths must
  /// route through the same hasher for the bucket derivation to agree.
  #[inline]
  pub fn read<Q>(&self, key: &Q) -> Option<V>
  where
    Q: Hash + Equivalent<K> + ?Sized,
  {
    self.table.read(key)
  }

  /// Calls `f` with a copy of every entry observed live during a single
  /// pass over the slot array.
  ///
  /// This is a best-effort scan, **not** a snapshot:
  ///
  /// - Entries inserted after the pass starts may be missed.
  /// - An entry removed and reinserted concurrently may be seen twice.
  /// - Every pair passed to `f` was genuinely stored at some point.
  ///
  /// Use it for diagnostics and scans where these weaknesses are
  /// acceptable.
  #[inline]
  pub fn visit<F>(&self, f: F)
  where
    F: FnMut(K, V),
  {
    self.table.visit(f)
  }

  /// Returns the number of entries currently stored.
  ///
  /// The value may be stale by the time it is observed.
  #[inline]
  pub fn len(&self) -> usize {
    self.table.len()
  }

  /// Returns `true` if the table contains no entries.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns the fixed number of slots.
  #[inline]
  pub fn capacity(&self) -> usize {
    self.table.cap()
  }
}

impl<K, V, P, S> Clone for Reader<K, V, P, S>
where
  P: Params + ?Sized,
{
  #[inline]
  fn clone(&self) -> Self {
    Self {
      table: Arc::clone(&self.table),
    }
  }
}

impl<K, V, P, S> Debug for Reader<K, V, P, S>
where
  K: Copy + Eq + Hash + Debug,
  V: Copy + Debug,
  P: Params + ?Sized,
  S: BuildHasher,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("Reader")
      .field("params", &P::debug())
      .field("entries", &self.table)
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
