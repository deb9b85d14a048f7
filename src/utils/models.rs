#[cfg(not(loom))]
pub(crate) mod alloc {
  pub(crate) use ::std::alloc::Layout;
  pub(crate) use ::std::alloc::alloc;
  pub(crate) use ::std::alloc::dealloc;
  pub(crate) use ::std::alloc::handle_alloc_error;
}

#[cfg(loom)]
pub(crate) mod alloc {
  pub(crate) use ::loom::alloc::Layout;
  pub(crate) use ::loom::alloc::alloc;
  pub(crate) use ::loom::alloc::dealloc;
  pub(crate) use ::std::alloc::handle_alloc_error;
}

#[cfg(not(loom))]
pub(crate) mod sync {
  pub(crate) mod atomic {
    pub(crate) use ::core::sync::atomic::AtomicUsize;
    pub(crate) use ::core::sync::atomic::Ordering;
  }
}

#[cfg(loom)]
pub(crate) mod sync {
  pub(crate) mod atomic {
    pub(crate) use ::loom::sync::atomic::AtomicUsize;
    pub(crate) use ::loom::sync::atomic::Ordering;
  }
}

#[cfg(not(loom))]
pub(crate) mod cell {
  /// An `UnsafeCell` with loom's closure-based access API.
  #[repr(transparent)]
  pub(crate) struct UnsafeCell<T> {
    inner: ::core::cell::UnsafeCell<T>,
  }

  impl<T> UnsafeCell<T> {
    #[inline]
    pub(crate) const fn new(value: T) -> Self {
      Self {
        inner: ::core::cell::UnsafeCell::new(value),
      }
    }

    #[inline]
    pub(crate) fn with<F, R>(&self, f: F) -> R
    where
      F: FnOnce(*const T) -> R,
    {
      f(self.inner.get())
    }

    #[inline]
    pub(crate) fn with_mut<F, R>(&self, f: F) -> R
    where
      F: FnOnce(*mut T) -> R,
    {
      f(self.inner.get())
    }
  }
}

#[cfg(loom)]
pub(crate) mod cell {
  pub(crate) use ::loom::cell::UnsafeCell;
}

#[cfg(not(loom))]
pub(crate) mod hint {
  pub(crate) use ::core::hint::spin_loop;
}

#[cfg(loom)]
pub(crate) mod hint {
  /// Spinning without a yield point would stall the loom scheduler.
  #[inline]
  pub(crate) fn spin_loop() {
    ::loom::thread::yield_now();
  }
}
