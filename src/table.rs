use core::fmt::Debug;
use core::fmt::DebugMap;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::panic::RefUnwindSafe;
use core::panic::UnwindSafe;

use equivalent::Equivalent;

use crate::array::Array;
use crate::cell::UnsafeCell;
use crate::hint;
use crate::node::NIL;
use crate::node::Node;
use crate::padded::CachePadded;
use crate::params::Params;
use crate::params::ParamsExt;
use crate::public::Overflow;
use crate::slots::SlotAlloc;
use crate::sync::atomic::AtomicUsize;
use crate::sync::atomic::Ordering;
use crate::sync::atomic::Ordering::Acquire;
use crate::sync::atomic::Ordering::Relaxed;
use crate::sync::atomic::Ordering::Release;

// -----------------------------------------------------------------------------
// Table State
// -----------------------------------------------------------------------------

/// The table core: bucket heads, node slots, and the writer's private
/// allocator, each on its own cache-line boundary.
///
/// Buckets are singly-linked chains of slot indices. One externally-unique
/// writer mutates; any number of readers traverse under the per-node
/// seqlock discipline. No operation ever takes a lock.
#[repr(C)]
pub(crate) struct Table<K, V, P, S>
where
  P: Params + ?Sized,
{
  buckets: CachePadded<Array<AtomicUsize>>,
  nodes: CachePadded<Array<Node<K, V>>>,
  writer: CachePadded<WriterState>,
  build: S,
  marker: PhantomData<fn(P)>,
}

/// State touched only on the write path.
struct WriterState {
  slots: UnsafeCell<SlotAlloc>,
  entries: AtomicUsize,
}

impl<K, V, P, S> Table<K, V, P, S>
where
  K: Copy + Eq + Hash,
  V: Copy,
  P: Params + ?Sized,
  S: BuildHasher,
{
  #[inline]
  pub(crate) fn with_hasher(build: S) -> Self {
    Self {
      buckets: CachePadded::new(Array::new(P::BUCKETS, |_, slot| {
        slot.write(AtomicUsize::new(NIL));
      })),
      nodes: CachePadded::new(Array::new(P::CAPACITY.as_usize(), |_, slot| {
        slot.write(Node::new());
      })),
      writer: CachePadded::new(WriterState {
        slots: UnsafeCell::new(SlotAlloc::new(P::CAPACITY.as_usize())),
        entries: AtomicUsize::new(0),
      }),
      build,
      marker: PhantomData,
    }
  }

  #[inline]
  pub(crate) const fn cap(&self) -> usize {
    P::CAPACITY.as_usize()
  }

  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.writer.entries.load(Relaxed)
  }

  // ---------------------------------------------------------------------------
  // Writer Operations
  // ---------------------------------------------------------------------------

  /// Stores `value` under `key`, updating in place when the key is already
  /// present and otherwise publishing a freshly allocated node at the head
  /// of its bucket chain.
  ///
  /// # Safety
  ///
  /// The caller must be the table's unique writer: no other call to
  /// `store` or `remove` may execute concurrently.
  pub(crate) unsafe fn store(&self, key: K, value: V) -> Result<(), Overflow> {
    let bucket: usize = self.bucket_of(&key);

    // Walk the chain for an existing key. Chain membership is stable under
    // the single-writer contract, so plain relaxed loads suffice here.
    let mut current: usize = self.head(bucket, Relaxed);

    while current != NIL {
      let node: &Node<K, V> = self.nodes.get(current);

      // SAFETY: Every node reachable from a bucket head is live, and only
      // this thread writes keys.
      let stored: K = unsafe { node.read_key().assume_init() };

      if stored == key {
        // Overwrite in place under an odd-version window; readers of this
        // node retry until the window closes.
        node.bump_version();

        // SAFETY: Exclusive writer, inside the odd window.
        unsafe { node.write_value(value) };

        node.set_owner(bucket, Relaxed);
        node.bump_version();

        return Ok(());
      }

      current = node.next(Relaxed);
    }

    // SAFETY: The allocator is only reached from the unique writer.
    let index: usize = self
      .writer
      .slots
      .with_mut(|slots| unsafe { (*slots).alloc() })
      .ok_or(Overflow)?;

    let node: &Node<K, V> = self.nodes.get(index);

    // Prepare the node entirely before publication: readers cannot reach
    // it until the bucket head is swung, and its `next` already points at
    // the old head so the pre-existing chain stays walkable through it.
    node.bump_version();

    // SAFETY: Exclusive writer, inside the odd window, slot freshly
    // allocated so no reader holds a validated view of it.
    unsafe {
      node.write_key(key);
      node.write_value(value);
    }

    node.set_next(self.head(bucket, Relaxed), Relaxed);
    node.set_owner(bucket, Relaxed);
    node.bump_version();

    // The single linearisation point of an insert.
    self.bucket(bucket).store(index, Release);
    self.writer.entries.fetch_add(1, Relaxed);

    Ok(())
  }

  /// Removes the entry matching `key`, returning whether one was present.
  ///
  /// # Safety
  ///
  /// The caller must be the table's unique writer: no other call to
  /// `store` or `remove` may execute concurrently.
  pub(crate) unsafe fn remove<Q>(&self, key: &Q) -> bool
  where
    Q: Hash + Equivalent<K> + ?Sized,
  {
    let bucket: usize = self.bucket_of(key);
    let head: usize = self.head(bucket, Relaxed);

    let mut previous: usize = NIL;
    let mut current: usize = head;

    while current != NIL {
      let node: &Node<K, V> = self.nodes.get(current);

      // SAFETY: Chain nodes are live and only this thread writes keys.
      let stored: K = unsafe { node.read_key().assume_init() };

      if key.equivalent(&stored) {
        let root: &Node<K, V> = self.nodes.get(head);

        // Raise the head node first. Readers cannot see a mid-chain unlink
        // directly, but they re-validate the head node's version at the
        // end of an unsuccessful walk; keeping it odd for the duration of
        // the edit forces them to restart.
        root.bump_version();

        let next: usize = node.next(Relaxed);

        if previous != NIL {
          let parent: &Node<K, V> = self.nodes.get(previous);

          if previous == head {
            // Already covered by the raised head version.
            parent.set_next(next, Relaxed);
          } else {
            parent.bump_version();
            parent.set_next(next, Relaxed);
            parent.bump_version();
          }
        } else {
          // The head itself is being removed; readers starting fresh take
          // the new head, readers holding the old one detect the jump.
          self.bucket(bucket).store(next, Release);
        }

        // Stamp the node free. Its version survives for ABA detection; its
        // payload bytes are undefined from here on.
        if current != head {
          node.bump_version();
        }

        node.set_owner(NIL, Relaxed);
        node.set_next(NIL, Relaxed);

        if current != head {
          node.bump_version();
        }

        root.bump_version();

        // SAFETY: The allocator is only reached from the unique writer.
        self
          .writer
          .slots
          .with_mut(|slots| unsafe { (*slots).free(current) });

        self.writer.entries.fetch_sub(1, Relaxed);

        return true;
      }

      previous = current;
      current = node.next(Relaxed);
    }

    false
  }

  // ---------------------------------------------------------------------------
  // Reader Operations
  // ---------------------------------------------------------------------------

  /// Returns a copy of the value stored under `key`, or `None`.
  ///
  /// Runs concurrently with the writer. The per-node seqlock discipline
  /// rules out torn copies; the owning-bucket check rules out derailing
  /// through a reused slot into a foreign chain; the head-node version
  /// recheck makes an empty-handed walk conclusive.
  pub(crate) fn read<Q>(&self, key: &Q) -> Option<V>
  where
    Q: Hash + Equivalent<K> + ?Sized,
  {
    let bucket: usize = self.bucket_of(key);
    let mut backoff: Backoff = Backoff::new();

    'restart: loop {
      let head: usize = self.head(bucket, Acquire);

      if head == NIL {
        return None;
      }

      let root: &Node<K, V> = self.nodes.get(head);
      let root_version: usize = root.version(Acquire);

      if root_version % 2 == 1 {
        // A structural edit of this chain is in flight.
        backoff.spin();
        continue 'restart;
      }

      let mut current: usize = head;

      while current != NIL {
        let node: &Node<K, V> = self.nodes.get(current);
        let before: usize = node.version(Acquire);

        if before % 2 == 1 {
          // Mid-write; retry the same node.
          backoff.spin();
          continue;
        }

        if node.owner(Acquire) != bucket {
          // Derailed: the slot was freed and reused under us.
          backoff.spin();
          continue 'restart;
        }

        let stored: MaybeUninit<K> = node.read_key();
        let next: usize = node.next(Acquire);

        // SAFETY: The slot was live at an even version when the copy
        // began. If the version moved while we copied, the comparison
        // below is computed on discarded bytes of a `Copy` key and its
        // result is thrown away by the recheck.
        let matches: bool = key.equivalent(unsafe { stored.assume_init_ref() });

        let value: Option<MaybeUninit<V>> = if matches {
          Some(node.read_value())
        } else {
          None
        };

        let after: usize = node.version(Acquire);

        if before != after {
          // Overwritten mid-read; both copies are invalid.
          backoff.spin();
          continue;
        }

        if let Some(value) = value {
          // SAFETY: The version was even and unchanged across the copy,
          // so the bytes are a consistent published value.
          return Some(unsafe { value.assume_init() });
        }

        current = next;
      }

      // Chain exhausted without a match. That conclusion assumed the chain
      // was structurally intact; the writer raises the head node's version
      // around every unlink, so an unchanged head version proves it.
      if root.version(Acquire) != root_version {
        backoff.spin();
        continue 'restart;
      }

      return None;
    }
  }

  /// Calls `f` with a copy of every entry observed live during a single
  /// pass over the slot array.
  ///
  /// This is not a snapshot: entries inserted after the pass started may
  /// be missed, and an entry removed and reinserted may be seen twice.
  pub(crate) fn visit<F>(&self, mut f: F)
  where
    F: FnMut(K, V),
  {
    for index in 0..self.nodes.len() {
      let node: &Node<K, V> = self.nodes.get(index);
      let mut backoff: Backoff = Backoff::new();

      loop {
        let before: usize = node.version(Acquire);

        if before % 2 == 1 {
          backoff.spin();
          continue;
        }

        if node.owner(Acquire) == NIL {
          break;
        }

        let key: MaybeUninit<K> = node.read_key();
        let value: MaybeUninit<V> = node.read_value();

        if node.version(Acquire) != before {
          backoff.spin();
          continue;
        }

        // SAFETY: The slot was live and its version held still across
        // both copies.
        f(unsafe { key.assume_init() }, unsafe { value.assume_init() });

        break;
      }
    }
  }

  // ---------------------------------------------------------------------------
  // Internals
  // ---------------------------------------------------------------------------

  #[inline]
  fn bucket_of<Q>(&self, key: &Q) -> usize
  where
    Q: Hash + ?Sized,
  {
    (self.build.hash_one(key) % P::BUCKETS as u64) as usize
  }

  #[inline]
  fn bucket(&self, index: usize) -> &AtomicUsize {
    self.buckets.get(index)
  }

  #[inline]
  fn head(&self, index: usize, order: Ordering) -> usize {
    self.bucket(index).load(order)
  }
}

// SAFETY:
// - All cross-thread mutation is performed via atomics.
// - Slots are never deallocated; payload bytes are only promoted to values
//   under the seqlock discipline.
// - Transferring ownership of `Table` between threads moves the contained
//   keys and values, so `K: Send + V: Send` is required.
unsafe impl<K, V, P, S> Send for Table<K, V, P, S>
where
  K: Send,
  V: Send,
  P: Params + ?Sized,
  S: Send,
{
}

// SAFETY:
// - Shared access only ever yields by-value copies of keys and values,
//   never references into the table, so `K: Send + V: Send` is sufficient.
// - The allocator cell is only touched through the writer methods, whose
//   contract limits them to one thread.
unsafe impl<K, V, P, S> Sync for Table<K, V, P, S>
where
  K: Send,
  V: Send,
  P: Params + ?Sized,
  S: Sync,
{
}

// Unconditional on `K`/`V` because the table never exposes references into
// its storage, and a panicking reader cannot leave a node mid-write.
impl<K, V, P, S> RefUnwindSafe for Table<K, V, P, S> where P: Params + ?Sized {}
impl<K, V, P, S> UnwindSafe for Table<K, V, P, S> where P: Params + ?Sized {}

impl<K, V, P, S> Debug for Table<K, V, P, S>
where
  K: Copy + Eq + Hash + Debug,
  V: Copy + Debug,
  P: Params + ?Sized,
  S: BuildHasher,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    let mut debug: DebugMap<'_, '_> = f.debug_map();

    self.visit(|key, value| {
      debug.entry(&key, &value);
    });

    debug.finish()
  }
}

// -----------------------------------------------------------------------------
// Backoff
// -----------------------------------------------------------------------------

/// Bounded exponential backoff for reader retries.
///
/// Caps the per-retry spin cost under a pathologically busy writer; it
/// does not bound overall retry latency, which is inherent to the
/// lock-free (not wait-free) reader contract.
struct Backoff {
  step: u32,
}

impl Backoff {
  const LIMIT: u32 = 6;

  #[inline]
  const fn new() -> Self {
    Self { step: 0 }
  }

  #[inline]
  fn spin(&mut self) {
    for _ in 0..(1 << self.step.min(Self::LIMIT)) {
      hint::spin_loop();
    }

    if self.step <= Self::LIMIT {
      self.step += 1;
    }
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(not(loom))]
#[cfg(test)]
mod tests {
  use core::hash::BuildHasher;
  use core::hash::Hasher;

  use foldhash::fast::FixedState;

  use crate::node::NIL;
  use crate::params::ConstParams;
  use crate::sync::atomic::Ordering::Relaxed;
  use crate::table::Table;

  type SmallTable = Table<u64, u64, ConstParams<3>, FixedState>;
  type PlainTable = Table<u64, u64, ConstParams<100>, FixedState>;

  /// Hashes a key to itself so bucket placement is predictable in tests.
  #[derive(Clone, Copy, Default)]
  struct IdentityState;

  struct IdentityHasher {
    state: u64,
  }

  impl BuildHasher for IdentityState {
    type Hasher = IdentityHasher;

    fn build_hasher(&self) -> IdentityHasher {
      IdentityHasher { state: 0 }
    }
  }

  impl Hasher for IdentityHasher {
    fn finish(&self) -> u64 {
      self.state
    }

    fn write(&mut self, bytes: &[u8]) {
      for byte in bytes {
        self.state = (self.state << 8) | u64::from(*byte);
      }
    }

    fn write_u64(&mut self, value: u64) {
      self.state = value;
    }

    fn write_i64(&mut self, value: i64) {
      self.state = value as u64;
    }

    fn write_usize(&mut self, value: usize) {
      self.state = value as u64;
    }
  }

  // Two slots hash over next_prime(4) == 5 buckets; 4 and 9 collide in
  // bucket 4 under the identity hash.
  type CollidingTable = Table<u64, u64, ConstParams<2>, IdentityState>;

  fn plain() -> PlainTable {
    Table::with_hasher(FixedState::default())
  }

  #[test]
  fn test_store_read_remove() {
    let table: PlainTable = plain();

    unsafe {
      table.store(7, 49).unwrap();
    }

    assert_eq!(table.read(&7), Some(49));
    assert_eq!(table.len(), 1);

    assert!(unsafe { table.remove(&7) });
    assert_eq!(table.read(&7), None);
    assert!(!unsafe { table.remove(&7) });
    assert_eq!(table.len(), 0);
  }

  #[test]
  fn test_read_missing_key() {
    let table: PlainTable = plain();

    assert_eq!(table.read(&1), None);

    unsafe {
      table.store(1, 10).unwrap();
    }

    assert_eq!(table.read(&2), None);
  }

  #[test]
  fn test_store_updates_in_place() {
    let table: PlainTable = plain();

    unsafe {
      table.store(5, 1).unwrap();
      table.store(5, 2).unwrap();
      table.store(5, 2).unwrap();
      table.store(5, 3).unwrap();
    }

    assert_eq!(table.read(&5), Some(3));
    assert_eq!(table.len(), 1);
  }

  #[test]
  fn test_store_to_capacity_then_overflow() {
    let table: SmallTable = Table::with_hasher(FixedState::default());

    for key in 0..3 {
      unsafe {
        table.store(key, key * key).unwrap();
      }
    }

    assert!(unsafe { table.store(100, 1) }.is_err());

    // The failed store left the table unchanged.
    assert_eq!(table.len(), 3);

    for key in 0..3 {
      assert_eq!(table.read(&key), Some(key * key));
    }

    // Updating a resident key is not an allocation and must still succeed.
    unsafe {
      table.store(1, 111).unwrap();
    }

    assert_eq!(table.read(&1), Some(111));
  }

  #[test]
  fn test_remove_frees_slot_for_reuse() {
    let table: SmallTable = Table::with_hasher(FixedState::default());

    for key in 0..3 {
      unsafe {
        table.store(key, key).unwrap();
      }
    }

    assert!(unsafe { table.remove(&1) });

    unsafe {
      table.store(50, 500).unwrap();
    }

    assert_eq!(table.read(&50), Some(500));
    assert_eq!(table.read(&1), None);
    assert_eq!(table.len(), 3);
  }

  #[test]
  fn test_colliding_keys_share_a_chain() {
    let table: CollidingTable = Table::with_hasher(IdentityState);

    unsafe {
      table.store(4, 40).unwrap();
      table.store(9, 90).unwrap();
    }

    // Both keys live in bucket 4; the newer node is the chain head.
    assert_eq!(table.head(4, Relaxed), 1);
    assert_eq!(table.nodes.get(1).next(Relaxed), 0);

    assert_eq!(table.read(&4), Some(40));
    assert_eq!(table.read(&9), Some(90));
  }

  #[test]
  fn test_remove_chain_head() {
    let table: CollidingTable = Table::with_hasher(IdentityState);

    unsafe {
      table.store(4, 40).unwrap();
      table.store(9, 90).unwrap();
    }

    assert!(unsafe { table.remove(&9) });

    assert_eq!(table.head(4, Relaxed), 0);
    assert_eq!(table.read(&4), Some(40));
    assert_eq!(table.read(&9), None);
  }

  #[test]
  fn test_remove_chain_tail() {
    let table: CollidingTable = Table::with_hasher(IdentityState);

    unsafe {
      table.store(4, 40).unwrap();
      table.store(9, 90).unwrap();
    }

    assert!(unsafe { table.remove(&4) });

    assert_eq!(table.head(4, Relaxed), 1);
    assert_eq!(table.nodes.get(1).next(Relaxed), NIL);
    assert_eq!(table.read(&9), Some(90));
    assert_eq!(table.read(&4), None);
  }

  #[test]
  fn test_version_parity_across_lifecycle() {
    let table: CollidingTable = Table::with_hasher(IdentityState);
    let initial: usize = table.nodes.get(0).version(Relaxed);

    assert!(initial.is_multiple_of(2));

    unsafe {
      table.store(4, 40).unwrap();
    }

    // Publishing costs exactly one odd/even pair.
    let published: usize = table.nodes.get(0).version(Relaxed);

    assert_eq!(published, initial + 2);

    unsafe {
      table.store(4, 41).unwrap();
    }

    assert_eq!(table.nodes.get(0).version(Relaxed), initial + 4);

    assert!(unsafe { table.remove(&4) });

    // The version survives the free; it never resets.
    assert_eq!(table.nodes.get(0).version(Relaxed), initial + 6);
    assert_eq!(table.nodes.get(0).owner(Relaxed), NIL);
  }

  #[test]
  fn test_freed_node_is_stamped_free() {
    let table: CollidingTable = Table::with_hasher(IdentityState);

    unsafe {
      table.store(4, 40).unwrap();
      table.store(9, 90).unwrap();
    }

    assert!(unsafe { table.remove(&4) });

    let node: &crate::node::Node<u64, u64> = table.nodes.get(0);

    assert_eq!(node.owner(Relaxed), NIL);
    assert_eq!(node.next(Relaxed), NIL);
  }

  #[test]
  fn test_visit_quiescent_is_exact() {
    let table: PlainTable = plain();

    for key in 0..50 {
      unsafe {
        table.store(key, key * key).unwrap();
      }
    }

    let mut seen: Vec<(u64, u64)> = Vec::new();

    table.visit(|key, value| {
      seen.push((key, value));
    });

    seen.sort_unstable();

    assert_eq!(seen.len(), 50);

    for (index, (key, value)) in seen.into_iter().enumerate() {
      assert_eq!(key, index as u64);
      assert_eq!(value, key * key);
    }
  }

  #[test]
  fn test_visit_skips_free_slots() {
    let table: PlainTable = plain();

    for key in 0..10 {
      unsafe {
        table.store(key, key).unwrap();
      }
    }

    for key in 0..5 {
      assert!(unsafe { table.remove(&key) });
    }

    let mut count: usize = 0;

    table.visit(|key, _| {
      assert!(key >= 5);
      count += 1;
    });

    assert_eq!(count, 5);
  }

  #[test]
  fn test_debug_renders_entries() {
    let table: PlainTable = plain();

    unsafe {
      table.store(3, 9).unwrap();
    }

    assert_eq!(format!("{table:?}"), "{3: 9}");
  }
}
