use core::any;
use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;
use core::marker::PhantomData;
use core::num::NonZeroUsize;

use crate::padded::CachePadded;

// -----------------------------------------------------------------------------
// Cache-line Properties
// -----------------------------------------------------------------------------

/// The size of a cache line in bytes.
///
/// The bucket array, the node array, and the allocator bitmap are each
/// allocated on a boundary of this size so that reader traffic on buckets
/// does not share lines with writer traffic on the allocator.
pub const CACHE_LINE: usize = size_of::<CachePadded<u8>>();

const _: () = assert!(
  CACHE_LINE.is_power_of_two(),
  "invalid params: `CACHE_LINE` must be a power of two",
);

// -----------------------------------------------------------------------------
// Configurable Params
// -----------------------------------------------------------------------------

/// Configuration parameters for a table.
///
/// This trait fixes the table capacity at compile time. The simplest way to
/// use custom parameters is through [`ConstParams`]:
///
/// ```
/// use seqtab::{Writer, ConstParams};
///
/// // A table with exactly 8,192 slots
/// type MyWriter = Writer<u64, u64, ConstParams<8192>>;
/// ```
///
/// # Implementing `Params`
///
/// For advanced use cases, implement `Params` directly:
///
/// ```
/// use seqtab::{Params, Capacity, Writer};
///
/// struct LargeParams;
///
/// impl Params for LargeParams {
///   const CAPACITY: Capacity = Capacity::new(1 << 20);
/// }
///
/// let (writer, _reader) = Writer::<u64, u64, LargeParams>::new();
/// assert_eq!(writer.capacity(), 1 << 20);
/// ```
///
/// [`Capacity::new`] clamps values to the valid range; unlike a masked
/// table, capacities are exact and need not be powers of two.
pub trait Params {
  /// The maximum number of entries the table can hold.
  ///
  /// Clamped to <code>[Capacity::MIN]..=[Capacity::MAX]</code>.
  const CAPACITY: Capacity = DefaultParams::CAPACITY;
}

// -----------------------------------------------------------------------------
// Configurable Params - Extensions
// -----------------------------------------------------------------------------

/// Derived parameters computed from [`Params`].
///
/// Automatically implemented for all types that implement [`Params`].
/// Users generally do not need this trait directly, but it is exposed so
/// the derived table geometry can be inspected:
///
/// ```
/// use seqtab::{ParamsExt, ConstParams};
///
/// // Two slots hash over `next_prime(4) == 5` buckets
/// assert_eq!(<ConstParams<2> as ParamsExt>::BUCKETS, 5);
/// ```
pub trait ParamsExt: Params + Sealed {
  /// The number of bucket heads: the next prime at or above twice the
  /// capacity, keeping the expected chain length below one.
  ///
  /// This value is part of the cross-process ABI: every process attaching
  /// to a shared table must derive the same bucket count.
  const BUCKETS: usize = next_prime(Self::CAPACITY.as_usize().strict_mul(2));

  /// The number of 64-bit words in the allocator bitmap.
  const WORDS: usize = Self::CAPACITY.as_usize().div_ceil(u64::BITS as usize);

  #[inline]
  fn debug() -> DebugParams<Self> {
    DebugParams {
      marker: PhantomData,
    }
  }
}

// -----------------------------------------------------------------------------
// Debug Params
// -----------------------------------------------------------------------------

/// A helper type for displaying [`Params`] configuration.
///
/// Returned by [`ParamsExt::debug`]; implements [`Debug`] to display the
/// derived configuration values.
#[derive(Clone, Copy)]
pub struct DebugParams<P>
where
  P: ?Sized,
{
  marker: PhantomData<fn(P)>,
}

impl<P> Debug for DebugParams<P>
where
  P: Params + ?Sized,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct(any::type_name::<P>())
      .field("CAPACITY", &P::CAPACITY)
      .field("BUCKETS", &P::BUCKETS)
      .field("WORDS", &P::WORDS)
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Default Params
// -----------------------------------------------------------------------------

/// The default table configuration with 1,024 slots.
///
/// This is the configuration used when constructing a table without
/// specifying a custom [`Params`] type.
#[derive(Clone, Copy)]
#[non_exhaustive]
pub struct DefaultParams;

impl Debug for DefaultParams {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    Debug::fmt(&<Self as ParamsExt>::debug(), f)
  }
}

impl Params for DefaultParams {
  const CAPACITY: Capacity = Capacity::DEF;
}

// -----------------------------------------------------------------------------
// Const-Generic Params
// -----------------------------------------------------------------------------

/// A [`Params`] implementation with compile-time configurable capacity.
///
/// This is the recommended way to create tables with custom capacities.
/// The capacity `N` is clamped to
/// <code>[Capacity::MIN]..=[Capacity::MAX]</code> but otherwise taken
/// exactly as given.
///
/// # Examples
///
/// ```
/// use seqtab::{Writer, ConstParams};
///
/// let (writer, _reader) = Writer::<u64, u64, ConstParams<100>>::new();
/// assert_eq!(writer.capacity(), 100);
/// ```
///
/// For frequently-used configurations, consider a type alias:
///
/// ```
/// use seqtab::{Writer, ConstParams};
///
/// type SmallWriter<K, V> = Writer<K, V, ConstParams<64>>;
/// ```
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub struct ConstParams<const N: usize>;

impl<const N: usize> Params for ConstParams<N> {
  const CAPACITY: Capacity = Capacity::new(N);
}

// -----------------------------------------------------------------------------
// Auto-implement Derive
// -----------------------------------------------------------------------------

mod private {
  pub trait Sealed {}
}

use private::Sealed;

impl<P> Sealed for P where P: Params + ?Sized {}
impl<P> ParamsExt for P where P: Params + ?Sized {}

// -----------------------------------------------------------------------------
// Capacity
// -----------------------------------------------------------------------------

/// A validated table capacity value.
///
/// `Capacity` represents a slot count in the range
/// <code>[MIN]..=[MAX]</code>. It is used by [`Params::CAPACITY`] to specify
/// how many entries a table can hold; the bucket count is derived from it
/// by [`ParamsExt::BUCKETS`].
///
/// # Construction
///
/// [`Capacity::new`] clamps arbitrary values into the valid range:
///
/// ```
/// use seqtab::Capacity;
///
/// assert_eq!(Capacity::new(100).as_usize(), 100);
/// assert_eq!(Capacity::new(0), Capacity::MIN);
/// assert_eq!(Capacity::new(usize::MAX), Capacity::MAX);
/// ```
///
/// [MIN]: Self::MIN
/// [MAX]: Self::MAX
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(transparent)]
pub struct Capacity(NonZeroUsize);

impl Capacity {
  /// The minimum supported capacity: 1 entry.
  pub const MIN: Self = Self(NonZeroUsize::MIN);

  /// The maximum supported capacity: 134,217,728 entries (2²⁷).
  ///
  /// Slot indices must stay strictly below the empty-tag sentinel; this
  /// bound keeps them comfortably clear of it on every supported target.
  pub const MAX: Self = {
    // SAFETY: `1 << 27` is non-zero.
    unsafe { Self::new_unchecked(1 << 27) }
  };

  /// The default capacity: 1,024 entries.
  pub const DEF: Self = {
    // SAFETY: `1 << 10` is non-zero.
    unsafe { Self::new_unchecked(1 << 10) }
  };

  /// Creates a new `Capacity`, clamping the value to
  /// <code>[MIN]..=[MAX]</code>.
  ///
  /// [MIN]: Self::MIN
  /// [MAX]: Self::MAX
  #[inline]
  pub const fn new(value: usize) -> Self {
    if value <= Self::MIN.as_usize() {
      Self::MIN
    } else if value >= Self::MAX.as_usize() {
      Self::MAX
    } else {
      // SAFETY: Values at or below `MIN` take the first branch, so `value`
      // is non-zero.
      unsafe { Self::new_unchecked(value) }
    }
  }

  /// Creates a new `Capacity` without validation.
  ///
  /// # Safety
  ///
  /// `value` must be non-zero and at most [`MAX`].
  ///
  /// [`MAX`]: Self::MAX
  #[inline]
  pub const unsafe fn new_unchecked(value: usize) -> Self {
    // SAFETY: Caller guarantees `value` is non-zero.
    Self(unsafe { NonZeroUsize::new_unchecked(value) })
  }

  /// Returns the capacity as a [`usize`].
  #[inline]
  pub const fn as_usize(self) -> usize {
    self.0.get()
  }

  /// Returns the capacity as a [`NonZeroUsize`].
  #[inline]
  pub const fn as_nonzero(self) -> NonZeroUsize {
    self.0
  }
}

impl Debug for Capacity {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    Debug::fmt(&self.as_usize(), f)
  }
}

impl Default for Capacity {
  #[inline]
  fn default() -> Capacity {
    Capacity::DEF
  }
}

impl From<Capacity> for NonZeroUsize {
  #[inline]
  fn from(other: Capacity) -> NonZeroUsize {
    other.as_nonzero()
  }
}

impl From<Capacity> for usize {
  #[inline]
  fn from(other: Capacity) -> usize {
    other.as_usize()
  }
}

// -----------------------------------------------------------------------------
// Prime Search
// -----------------------------------------------------------------------------

/// Returns the smallest prime at or above `num`, with a floor of 5.
///
/// The floor guarantees at least a handful of buckets for degenerate
/// capacities, and the result for any even `num > 5` is at least `num + 1`.
pub(crate) const fn next_prime(num: usize) -> usize {
  if num <= 5 {
    return 5;
  }

  let mut candidate: usize = num;

  while !is_prime(candidate) {
    candidate += 1;
  }

  candidate
}

const fn is_prime(num: usize) -> bool {
  if num % 2 == 0 {
    return false;
  }

  let mut divisor: usize = 3;

  while divisor * divisor <= num {
    if num % divisor == 0 {
      return false;
    }

    divisor += 2;
  }

  true
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use crate::params::Capacity;
  use crate::params::ConstParams;
  use crate::params::Params;
  use crate::params::ParamsExt;
  use crate::params::next_prime;

  #[test]
  fn test_capacity_min() {
    assert_eq!(
      Capacity::new(0).as_usize(),
      Capacity::MIN.as_usize(),
      "invalid capacity: expected clamp to MIN",
    );
  }

  #[test]
  fn test_capacity_max() {
    assert_eq!(
      Capacity::new(usize::MAX).as_usize(),
      Capacity::MAX.as_usize(),
      "invalid capacity: expected clamp to MAX",
    );
  }

  #[test]
  fn test_capacity_exact() {
    assert_eq!(
      Capacity::new(100).as_usize(),
      100,
      "invalid capacity: expected no change",
    );
  }

  #[test]
  fn test_next_prime_floor() {
    assert_eq!(next_prime(0), 5);
    assert_eq!(next_prime(4), 5);
    assert_eq!(next_prime(5), 5);
  }

  #[test]
  fn test_next_prime_values() {
    assert_eq!(next_prime(6), 7);
    assert_eq!(next_prime(32), 37);
    assert_eq!(next_prime(60), 61);
    assert_eq!(next_prime(200), 211);
    assert_eq!(next_prime(2048), 2053);
  }

  #[test]
  fn test_next_prime_exceeds_doubled_capacity() {
    for capacity in [1, 2, 3, 16, 30, 100, 256, 1111] {
      let buckets: usize = next_prime(capacity * 2);

      assert!(
        buckets > capacity * 2,
        "invalid buckets: expected more buckets than twice the capacity",
      );
    }
  }

  #[cfg_attr(not(feature = "slow"), ignore = "enable the 'slow' feature to run this test.")]
  #[test]
  fn test_next_prime_matches_exhaustive_search() {
    fn is_prime(num: usize) -> bool {
      num > 1 && (2..num).take_while(|d| d * d <= num).all(|d| num % d != 0)
    }

    for num in 6..4096 {
      let found: usize = next_prime(num);

      assert!(found >= num);
      assert!(is_prime(found), "next_prime({num}) returned composite {found}");

      for skipped in num..found {
        assert!(
          !is_prime(skipped),
          "next_prime({num}) skipped prime {skipped}",
        );
      }
    }
  }

  #[test]
  fn test_buckets_derivation() {
    assert_eq!(<ConstParams<2> as ParamsExt>::BUCKETS, 5);
    assert_eq!(<ConstParams<3> as ParamsExt>::BUCKETS, 7);
    assert_eq!(<ConstParams<100> as ParamsExt>::BUCKETS, 211);
    assert_eq!(<ConstParams<1000> as ParamsExt>::BUCKETS, 2003);
  }

  // The bucket count is part of the shared-memory ABI: re-deriving it for
  // the same capacity must always produce the same value.
  #[test]
  fn test_buckets_reproducible() {
    struct Mirror;

    impl Params for Mirror {
      const CAPACITY: Capacity = Capacity::new(100);
    }

    assert_eq!(Mirror::BUCKETS, <ConstParams<100> as ParamsExt>::BUCKETS);
    assert_eq!(Mirror::WORDS, <ConstParams<100> as ParamsExt>::WORDS);
  }

  #[test]
  fn test_words_derivation() {
    assert_eq!(<ConstParams<1> as ParamsExt>::WORDS, 1);
    assert_eq!(<ConstParams<64> as ParamsExt>::WORDS, 1);
    assert_eq!(<ConstParams<65> as ParamsExt>::WORDS, 2);
    assert_eq!(<ConstParams<1111> as ParamsExt>::WORDS, 18);
  }

  #[test]
  fn test_debug_params() {
    let debug: String = format!("{:?}", <ConstParams<100> as ParamsExt>::debug());

    assert!(debug.contains("CAPACITY: 100"));
    assert!(debug.contains("BUCKETS: 211"));
    assert!(debug.contains("WORDS: 2"));
  }
}
