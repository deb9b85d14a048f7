//! The per-slot node representation.
//!
//! A node is never moved and never deallocated; its slot index is a stable
//! handle. The version counter is initialized once at table construction
//! and survives every free/reuse cycle of the slot, which is what lets
//! readers detect reuse (the ABA hazard) without any reclamation scheme.

use core::mem::MaybeUninit;
use core::ptr;

use crate::cell::UnsafeCell;
use crate::sync::atomic::AtomicUsize;
use crate::sync::atomic::Ordering;
use crate::sync::atomic::Ordering::AcqRel;

/// The sentinel index marking an absent slot: empty bucket heads, the end
/// of a chain, and the owner of a free node.
pub(crate) const NIL: usize = usize::MAX;

/// One slot of the table.
///
/// `version` parity is the seqlock signal: even means the published state
/// is internally consistent, odd means a write is in progress. `owner` is
/// the bucket index the node currently belongs to, or [`NIL`] while the
/// slot is free; payload bytes are meaningful only while `owner` names a
/// bucket.
pub(crate) struct Node<K, V> {
  version: AtomicUsize,
  next: AtomicUsize,
  owner: AtomicUsize,
  key: UnsafeCell<MaybeUninit<K>>,
  value: UnsafeCell<MaybeUninit<V>>,
}

impl<K, V> Node<K, V> {
  #[inline]
  pub(crate) fn new() -> Self {
    Self {
      version: AtomicUsize::new(0),
      next: AtomicUsize::new(NIL),
      owner: AtomicUsize::new(NIL),
      key: UnsafeCell::new(MaybeUninit::uninit()),
      value: UnsafeCell::new(MaybeUninit::uninit()),
    }
  }

  // ---------------------------------------------------------------------------
  // Version
  // ---------------------------------------------------------------------------

  #[inline]
  pub(crate) fn version(&self, order: Ordering) -> usize {
    self.version.load(order)
  }

  /// Advances the version by one.
  ///
  /// The writer calls this in pairs: once entering a mutation (version
  /// becomes odd) and once leaving it (version becomes even). The
  /// release half of the `AcqRel` increment publishes every plain store
  /// made before the even transition.
  #[inline]
  pub(crate) fn bump_version(&self) {
    self.version.fetch_add(1, AcqRel);
  }

  // ---------------------------------------------------------------------------
  // Links
  // ---------------------------------------------------------------------------

  #[inline]
  pub(crate) fn next(&self, order: Ordering) -> usize {
    self.next.load(order)
  }

  #[inline]
  pub(crate) fn set_next(&self, index: usize, order: Ordering) {
    self.next.store(index, order);
  }

  #[inline]
  pub(crate) fn owner(&self, order: Ordering) -> usize {
    self.owner.load(order)
  }

  #[inline]
  pub(crate) fn set_owner(&self, bucket: usize, order: Ordering) {
    self.owner.store(bucket, order);
  }

  // ---------------------------------------------------------------------------
  // Payload
  // ---------------------------------------------------------------------------

  /// Writes the key.
  ///
  /// # Safety
  ///
  /// Only the writer may call this, inside an odd-version window.
  #[inline]
  pub(crate) unsafe fn write_key(&self, key: K) {
    self.key.with_mut(|slot| {
      // SAFETY: The writer has exclusive write access; see above.
      unsafe { (*slot).write(key) };
    });
  }

  /// Writes the value.
  ///
  /// # Safety
  ///
  /// Only the writer may call this, inside an odd-version window.
  #[inline]
  pub(crate) unsafe fn write_value(&self, value: V) {
    self.value.with_mut(|slot| {
      // SAFETY: The writer has exclusive write access; see above.
      unsafe { (*slot).write(value) };
    });
  }

  /// Copies the key bytes out of the slot.
  ///
  /// The copy may be torn or stale; callers must only `assume_init` it
  /// after establishing that the slot was live and the version did not
  /// move across the read (the seqlock discipline).
  #[inline]
  pub(crate) fn read_key(&self) -> MaybeUninit<K> {
    self.key.with(|slot| {
      // SAFETY: The pointer is valid and `MaybeUninit` imposes no validity
      // requirement on the copied bytes.
      unsafe { ptr::read(slot) }
    })
  }

  /// Copies the value bytes out of the slot; same caveats as [`read_key`].
  ///
  /// [`read_key`]: Self::read_key
  #[inline]
  pub(crate) fn read_value(&self) -> MaybeUninit<V> {
    self.value.with(|slot| {
      // SAFETY: The pointer is valid and `MaybeUninit` imposes no validity
      // requirement on the copied bytes.
      unsafe { ptr::read(slot) }
    })
  }
}
