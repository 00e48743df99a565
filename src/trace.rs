//! Traced equivalents of the raw heap primitives.
//!
//! Call through the [`trace_malloc!`](crate::trace_malloc),
//! [`trace_calloc!`](crate::trace_calloc),
//! [`trace_realloc!`](crate::trace_realloc), and
//! [`trace_free!`](crate::trace_free) macros: with the `trace` feature they
//! capture the call site and log every operation (and, with `registry`, keep
//! the global [`tracker`](crate::tracker) up to date); without it they expand
//! to the plain `libc` calls with zero overhead.

use libc::c_void;

#[cfg(feature = "trace")]
use crate::tracker::CallSite;

/// Plain `libc::malloc`, no instrumentation.
#[inline(always)]
pub unsafe fn malloc_raw(size: usize) -> *mut c_void {
  unsafe { libc::malloc(size) }
}

/// Plain `libc::calloc`, no instrumentation.
#[inline(always)]
pub unsafe fn calloc_raw(
  count: usize,
  size: usize,
) -> *mut c_void {
  unsafe { libc::calloc(count, size) }
}

/// Plain `libc::realloc`, no instrumentation.
#[inline(always)]
pub unsafe fn realloc_raw(
  pointer: *mut c_void,
  size: usize,
) -> *mut c_void {
  unsafe { libc::realloc(pointer, size) }
}

/// Plain `libc::free`; returns `false` for a null pointer.
#[inline(always)]
pub unsafe fn free_raw(pointer: *mut c_void) -> bool {
  if pointer.is_null() {
    return false;
  }
  unsafe { libc::free(pointer) };
  true
}

/// `malloc` that logs the operation and registers the allocation.
///
/// A null result is passed through untouched and never registered.
///
/// # Safety
///
/// Same contract as `libc::malloc`; the returned memory must eventually be
/// released with [`free_traced`] (or `trace_free!`).
#[cfg(feature = "trace")]
pub unsafe fn malloc_traced(
  size: usize,
  site: CallSite,
) -> *mut c_void {
  let pointer = unsafe { libc::malloc(size) };
  log::debug!("MALLOC: {size} bytes -> {pointer:p} {site}");

  #[cfg(feature = "registry")]
  {
    if !pointer.is_null() {
      if let Err(err) = crate::tracker::register_allocation(pointer, site) {
        log::error!("MALLOC: could not register {pointer:p}: {err}");
      }
    }
  }

  pointer
}

/// `calloc` that logs the operation and registers the allocation.
///
/// # Safety
///
/// Same contract as `libc::calloc`.
#[cfg(feature = "trace")]
pub unsafe fn calloc_traced(
  count: usize,
  size: usize,
  site: CallSite,
) -> *mut c_void {
  let pointer = unsafe { libc::calloc(count, size) };
  log::debug!("CALLOC: {count} x {size} bytes -> {pointer:p} {site}");

  #[cfg(feature = "registry")]
  {
    if !pointer.is_null() {
      if let Err(err) = crate::tracker::register_allocation(pointer, site) {
        log::error!("CALLOC: could not register {pointer:p}: {err}");
      }
    }
  }

  pointer
}

/// `realloc` that logs the operation and retargets the existing
/// registration, so the block keeps its original "first allocated at"
/// provenance across moves.
///
/// Returns null without touching anything when `pointer` is null, and keeps
/// the old registration intact when the underlying realloc fails.
///
/// # Safety
///
/// Same contract as `libc::realloc`: `pointer` must be null or a live heap
/// allocation, and must not be used again after a successful call.
#[cfg(feature = "trace")]
pub unsafe fn realloc_traced(
  pointer: *mut c_void,
  size: usize,
  site: CallSite,
) -> *mut c_void {
  if pointer.is_null() {
    return std::ptr::null_mut();
  }

  log::debug!("REALLOC: {pointer:p} to {size} bytes {site}");

  #[cfg(feature = "registry")]
  {
    match crate::tracker::lookup_allocation(pointer) {
      Some(provenance) => log::debug!("REALLOC: {pointer:p} first allocated {provenance}"),
      None => log::error!("REALLOC: {pointer:p} is not a tracked allocation"),
    }
  }

  let moved = unsafe { libc::realloc(pointer, size) };
  if moved.is_null() {
    return std::ptr::null_mut();
  }

  #[cfg(feature = "registry")]
  {
    if let Err(err) = crate::tracker::update_allocation(pointer, moved) {
      log::error!("REALLOC: could not retarget {pointer:p} -> {moved:p}: {err}");
    }
  }

  moved
}

/// `free` that logs the operation (with the allocation's provenance) and
/// deregisters the pointer. Returns `false` for a null pointer.
///
/// # Safety
///
/// Same contract as `libc::free`.
#[cfg(feature = "trace")]
pub unsafe fn free_traced(
  pointer: *mut c_void,
  site: CallSite,
) -> bool {
  if pointer.is_null() {
    return false;
  }

  log::debug!("FREE: {pointer:p} {site}");

  #[cfg(feature = "registry")]
  {
    match crate::tracker::remove_allocation(pointer) {
      Ok(provenance) => log::debug!("FREE: {pointer:p} allocated {provenance}"),
      Err(err) => log::error!("FREE: {pointer:p}: {err}"),
    }
  }

  unsafe { libc::free(pointer) };

  true
}

/// Expands to the name of the enclosing function.
#[macro_export]
macro_rules! func {
  () => {{
    fn f() {}
    fn type_name_of<T>(_: T) -> &'static str {
      ::core::any::type_name::<T>()
    }
    let name = type_name_of(f);
    name.strip_suffix("::f").unwrap_or(name)
  }};
}

/// Captures the enclosing function, file, and line as a
/// [`CallSite`](crate::tracker::CallSite).
#[macro_export]
macro_rules! callsite {
  () => {
    $crate::tracker::CallSite {
      function: $crate::func!(),
      file: ::core::file!(),
      line: ::core::line!(),
    }
  };
}

/// Traced `malloc`. Expands to the bare `libc` call without the `trace`
/// feature.
#[cfg(feature = "trace")]
#[macro_export]
macro_rules! trace_malloc {
  ($size:expr) => {
    $crate::trace::malloc_traced($size, $crate::callsite!())
  };
}

#[cfg(not(feature = "trace"))]
#[macro_export]
macro_rules! trace_malloc {
  ($size:expr) => {
    $crate::trace::malloc_raw($size)
  };
}

/// Traced `calloc`. Expands to the bare `libc` call without the `trace`
/// feature.
#[cfg(feature = "trace")]
#[macro_export]
macro_rules! trace_calloc {
  ($count:expr, $size:expr) => {
    $crate::trace::calloc_traced($count, $size, $crate::callsite!())
  };
}

#[cfg(not(feature = "trace"))]
#[macro_export]
macro_rules! trace_calloc {
  ($count:expr, $size:expr) => {
    $crate::trace::calloc_raw($count, $size)
  };
}

/// Traced `realloc`. Expands to the bare `libc` call without the `trace`
/// feature.
#[cfg(feature = "trace")]
#[macro_export]
macro_rules! trace_realloc {
  ($pointer:expr, $size:expr) => {
    $crate::trace::realloc_traced($pointer, $size, $crate::callsite!())
  };
}

#[cfg(not(feature = "trace"))]
#[macro_export]
macro_rules! trace_realloc {
  ($pointer:expr, $size:expr) => {
    $crate::trace::realloc_raw($pointer, $size)
  };
}

/// Traced `free`. Expands to the bare `libc` call without the `trace`
/// feature.
#[cfg(feature = "trace")]
#[macro_export]
macro_rules! trace_free {
  ($pointer:expr) => {
    $crate::trace::free_traced($pointer, $crate::callsite!())
  };
}

#[cfg(not(feature = "trace"))]
#[macro_export]
macro_rules! trace_free {
  ($pointer:expr) => {
    $crate::trace::free_raw($pointer)
  };
}

#[cfg(test)]
mod tests {
  #[test]
  fn test_func_names_the_enclosing_function() {
    let name = crate::func!();
    assert!(name.ends_with("test_func_names_the_enclosing_function"));
  }

  #[cfg(feature = "trace")]
  #[test]
  fn test_null_pointers_pass_through() {
    unsafe {
      assert!(crate::trace_realloc!(std::ptr::null_mut(), 32).is_null());
      assert!(!crate::trace_free!(std::ptr::null_mut()));
    }
  }

  // the only test that touches the global tracker, so no cross-test races
  #[cfg(feature = "registry")]
  #[test]
  fn test_traced_lifecycle_round_trip() {
    use crate::tracker;

    tracker::init(4).unwrap();
    assert_eq!(tracker::live_allocations(), 0);

    let pointer = unsafe { crate::trace_malloc!(64) };
    assert!(!pointer.is_null());
    assert_eq!(tracker::live_allocations(), 1);

    let provenance = tracker::lookup_allocation(pointer).unwrap();
    assert!(provenance.function.contains("test_traced_lifecycle_round_trip"));
    let first_line = provenance.line;

    // realloc keeps the original call site, only the pointer moves
    let moved = unsafe { crate::trace_realloc!(pointer, 4096) };
    assert!(!moved.is_null());
    assert_eq!(tracker::live_allocations(), 1);
    let provenance = tracker::lookup_allocation(moved).unwrap();
    assert_eq!(provenance.line, first_line);

    assert!(unsafe { crate::trace_free!(moved) });
    assert_eq!(tracker::live_allocations(), 0);
    assert!(tracker::lookup_allocation(moved).is_none());

    let zeroed = unsafe { crate::trace_calloc!(4, 8) };
    assert!(!zeroed.is_null());
    assert_eq!(tracker::live_allocations(), 1);
    for i in 0..32 {
      assert_eq!(unsafe { *zeroed.cast::<u8>().add(i) }, 0);
    }

    tracker::print_all_allocations();
    assert!(unsafe { crate::trace_free!(zeroed) });
    assert_eq!(tracker::live_allocations(), 0);
  }
}
