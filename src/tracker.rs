use std::{fmt, mem};

use libc::c_void;
use parking_lot::Mutex;
use thiserror::Error;

/// Error returned by tracker operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
  #[error("tracker table allocation failed ({bytes} bytes)")]
  OutOfMemory { bytes: usize },
  #[error("tracker capacity overflow growing past {capacity} slots")]
  CapacityOverflow { capacity: usize },
  #[error("pointer {pointer:#x} is not a registered allocation")]
  NotRegistered { pointer: usize },
  #[error("pointer {pointer:#x} is already registered")]
  AlreadyRegistered { pointer: usize },
  #[error("allocation tracker used before init")]
  Uninitialized,
}

/// A call site: the function, file, and line an allocation came from.
///
/// Capture one with [`callsite!`](crate::callsite).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallSite {
  pub function: &'static str,
  pub file: &'static str,
  pub line: u32,
}

impl fmt::Display for CallSite {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "in {} on line {} in {}", self.function, self.line, self.file)
  }
}

/// Owned provenance of a live allocation.
///
/// The strings are copied out of the [`CallSite`] at registration so the
/// tracker never depends on caller string lifetimes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provenance {
  pub function: String,
  pub file: String,
  pub line: u32,
}

impl fmt::Display for Provenance {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "in {} on line {} in {}", self.function, self.line, self.file)
  }
}

struct Slot {
  occupied: bool,
  pointer: usize,
  function: String,
  file: String,
  line: u32,
}

impl Slot {
  fn vacant() -> Self {
    Self {
      occupied: false,
      pointer: 0,
      function: String::new(),
      file: String::new(),
      line: 0,
    }
  }
}

/// A registry mapping live heap allocations to the call site that made them.
///
/// Slots are claimed first-fit and recycled on removal; when every slot is
/// occupied the table grows by a 1.5x factor. Iteration for the leak report
/// is bounded by the table length, the high-water mark of slots ever held.
pub struct AllocationTracker {
  slots: Vec<Slot>,
  live: u64,
}

impl AllocationTracker {
  /// Creates a tracker pre-sized for `capacity` entries.
  ///
  /// Fails with [`TrackerError::OutOfMemory`] if the table cannot be
  /// allocated.
  pub fn with_capacity(capacity: usize) -> Result<Self, TrackerError> {
    let mut slots = Vec::new();
    slots
      .try_reserve_exact(capacity)
      .map_err(|_| TrackerError::OutOfMemory {
        bytes: capacity.saturating_mul(mem::size_of::<Slot>()),
      })?;
    slots.resize_with(capacity, Slot::vacant);

    Ok(Self { slots, live: 0 })
  }

  /// Number of currently-live registered allocations.
  pub fn live_count(&self) -> u64 {
    self.live
  }

  /// Number of slots in the table.
  pub fn capacity(&self) -> usize {
    self.slots.len()
  }

  /// Records `pointer` as a live allocation made at `site`.
  ///
  /// Scans for the first unoccupied slot, growing the table when none is
  /// left. A pointer may be registered at most once; re-registering a live
  /// pointer fails with [`TrackerError::AlreadyRegistered`].
  pub fn register(
    &mut self,
    pointer: *mut c_void,
    site: CallSite,
  ) -> Result<(), TrackerError> {
    let addr = pointer as usize;

    let mut free_idx = None;
    for (idx, slot) in self.slots.iter().enumerate() {
      if slot.occupied {
        if slot.pointer == addr {
          return Err(TrackerError::AlreadyRegistered { pointer: addr });
        }
      } else if free_idx.is_none() {
        free_idx = Some(idx);
      }
    }

    let idx = match free_idx {
      Some(idx) => idx,
      None => self.grow()?,
    };

    let slot = &mut self.slots[idx];
    slot.occupied = true;
    slot.pointer = addr;
    slot.function = site.function.to_owned();
    slot.file = site.file.to_owned();
    slot.line = site.line;

    self.live += 1;

    Ok(())
  }

  /// Vacates the slot registered for `pointer`, returning its provenance.
  pub fn remove(
    &mut self,
    pointer: *mut c_void,
  ) -> Result<Provenance, TrackerError> {
    let addr = pointer as usize;

    let slot = self
      .slots
      .iter_mut()
      .find(|slot| slot.occupied && slot.pointer == addr)
      .ok_or(TrackerError::NotRegistered { pointer: addr })?;

    slot.occupied = false;
    slot.pointer = 0;
    let provenance = Provenance {
      function: mem::take(&mut slot.function),
      file: mem::take(&mut slot.file),
      line: mem::replace(&mut slot.line, 0),
    };

    self.live -= 1;

    Ok(provenance)
  }

  /// Rebinds the slot registered for `original` to `new` after a realloc
  /// moved the block. The provenance is untouched, preserving where the
  /// block was first allocated.
  pub fn update(
    &mut self,
    original: *mut c_void,
    new: *mut c_void,
  ) -> Result<(), TrackerError> {
    let addr = original as usize;

    let slot = self
      .slots
      .iter_mut()
      .find(|slot| slot.occupied && slot.pointer == addr)
      .ok_or(TrackerError::NotRegistered { pointer: addr })?;

    slot.pointer = new as usize;

    Ok(())
  }

  /// Provenance of `pointer`, if it is currently registered.
  pub fn lookup(
    &self,
    pointer: *mut c_void,
  ) -> Option<Provenance> {
    let addr = pointer as usize;

    self
      .slots
      .iter()
      .find(|slot| slot.occupied && slot.pointer == addr)
      .map(|slot| Provenance {
        function: slot.function.clone(),
        file: slot.file.clone(),
        line: slot.line,
      })
  }

  /// Prints every still-live allocation with its provenance, then the live
  /// count. Diagnostic only; intended as an end-of-program leak report.
  pub fn report(&self) {
    if self.live > 0 {
      println!("Remaining allocations:");
      for slot in &self.slots {
        if slot.occupied {
          println!("\t{:#x} in {} on line {} in {}", slot.pointer, slot.function, slot.line, slot.file);
        }
      }
    }

    println!("There are {} remaining allocations", self.live);
  }

  fn grow(&mut self) -> Result<usize, TrackerError> {
    let old = self.slots.len();
    let grown = old
      .checked_mul(3)
      .ok_or(TrackerError::CapacityOverflow { capacity: old })?
      / 2;
    // a 1.5x factor stalls below 2 slots; never grow by less than one
    let new_capacity = grown.max(old + 1);

    let additional = new_capacity - old;
    self
      .slots
      .try_reserve_exact(additional)
      .map_err(|_| TrackerError::OutOfMemory {
        bytes: additional.saturating_mul(mem::size_of::<Slot>()),
      })?;
    self.slots.resize_with(new_capacity, Slot::vacant);

    Ok(old)
  }
}

static GLOBAL: Mutex<Option<AllocationTracker>> = Mutex::new(None);

/// Initializes the process-wide tracker consulted by the traced allocation
/// wrappers. Call once, before any traced allocation; re-initializing
/// replaces the previous table.
pub fn init(capacity: usize) -> Result<(), TrackerError> {
  let tracker = AllocationTracker::with_capacity(capacity)?;
  *GLOBAL.lock() = Some(tracker);

  Ok(())
}

fn with_global<R>(
  f: impl FnOnce(&mut AllocationTracker) -> Result<R, TrackerError>,
) -> Result<R, TrackerError> {
  match GLOBAL.lock().as_mut() {
    Some(tracker) => f(tracker),
    None => Err(TrackerError::Uninitialized),
  }
}

/// Registers `pointer` with the global tracker.
pub fn register_allocation(
  pointer: *mut c_void,
  site: CallSite,
) -> Result<(), TrackerError> {
  with_global(|tracker| tracker.register(pointer, site))
}

/// Removes `pointer` from the global tracker.
pub fn remove_allocation(pointer: *mut c_void) -> Result<Provenance, TrackerError> {
  with_global(|tracker| tracker.remove(pointer))
}

/// Retargets a registration after a realloc moved the block.
pub fn update_allocation(
  original: *mut c_void,
  new: *mut c_void,
) -> Result<(), TrackerError> {
  with_global(|tracker| tracker.update(original, new))
}

/// Provenance of `pointer` in the global tracker, if registered.
pub fn lookup_allocation(pointer: *mut c_void) -> Option<Provenance> {
  GLOBAL.lock().as_ref().and_then(|tracker| tracker.lookup(pointer))
}

/// Live allocation count of the global tracker; 0 when uninitialized.
pub fn live_allocations() -> u64 {
  GLOBAL.lock().as_ref().map_or(0, AllocationTracker::live_count)
}

/// Prints the global tracker's leak report.
pub fn print_all_allocations() {
  match GLOBAL.lock().as_ref() {
    Some(tracker) => tracker.report(),
    None => log::warn!("allocation tracker used before init"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn site(
    function: &'static str,
    line: u32,
    file: &'static str,
  ) -> CallSite {
    CallSite { function, file, line }
  }

  fn ptr(addr: usize) -> *mut c_void {
    addr as *mut c_void
  }

  #[test]
  fn test_register_then_lookup_round_trip() {
    let mut tracker = AllocationTracker::with_capacity(4).unwrap();

    tracker.register(ptr(0x1000), site("f", 10, "file.c")).unwrap();
    assert_eq!(tracker.live_count(), 1);

    let provenance = tracker.lookup(ptr(0x1000)).unwrap();
    assert_eq!(provenance.function, "f");
    assert_eq!(provenance.line, 10);
    assert_eq!(provenance.file, "file.c");
  }

  #[test]
  fn test_remove_vacates_the_slot() {
    let mut tracker = AllocationTracker::with_capacity(4).unwrap();

    tracker.register(ptr(0x2000), site("g", 20, "other.c")).unwrap();
    let provenance = tracker.remove(ptr(0x2000)).unwrap();

    assert_eq!(provenance.function, "g");
    assert_eq!(tracker.live_count(), 0);
    assert!(tracker.lookup(ptr(0x2000)).is_none());

    let err = tracker.remove(ptr(0x2000)).unwrap_err();
    assert_eq!(err, TrackerError::NotRegistered { pointer: 0x2000 });
  }

  #[test]
  fn test_duplicate_registration_is_rejected() {
    let mut tracker = AllocationTracker::with_capacity(4).unwrap();

    tracker.register(ptr(0x3000), site("f", 1, "a.c")).unwrap();
    let err = tracker.register(ptr(0x3000), site("g", 2, "b.c")).unwrap_err();
    assert_eq!(err, TrackerError::AlreadyRegistered { pointer: 0x3000 });
    assert_eq!(tracker.live_count(), 1);
  }

  #[test]
  fn test_slots_are_recycled_first_fit() {
    let mut tracker = AllocationTracker::with_capacity(2).unwrap();

    tracker.register(ptr(0x10), site("a", 1, "f.c")).unwrap();
    tracker.register(ptr(0x20), site("b", 2, "f.c")).unwrap();
    tracker.remove(ptr(0x10)).unwrap();
    tracker.register(ptr(0x30), site("c", 3, "f.c")).unwrap();

    // no growth: the vacated slot was reused
    assert_eq!(tracker.capacity(), 2);
    assert_eq!(tracker.live_count(), 2);
  }

  #[test]
  fn test_growth_keeps_existing_entries() {
    let mut tracker = AllocationTracker::with_capacity(2).unwrap();

    for i in 1..=7usize {
      tracker
        .register(ptr(i * 0x100), site("f", i as u32, "grow.c"))
        .unwrap();
    }

    assert_eq!(tracker.live_count(), 7);
    assert!(tracker.capacity() >= 7);

    for i in 1..=7usize {
      let provenance = tracker.lookup(ptr(i * 0x100)).unwrap();
      assert_eq!(provenance.line, i as u32);
    }
  }

  #[test]
  fn test_growth_from_zero_capacity() {
    let mut tracker = AllocationTracker::with_capacity(0).unwrap();

    tracker.register(ptr(0x40), site("f", 4, "zero.c")).unwrap();
    assert_eq!(tracker.live_count(), 1);
    assert!(tracker.lookup(ptr(0x40)).is_some());
  }

  #[test]
  fn test_update_preserves_provenance() {
    let mut tracker = AllocationTracker::with_capacity(2).unwrap();

    tracker.register(ptr(0x50), site("origin", 5, "o.c")).unwrap();
    tracker.update(ptr(0x50), ptr(0x60)).unwrap();

    assert!(tracker.lookup(ptr(0x50)).is_none());
    let provenance = tracker.lookup(ptr(0x60)).unwrap();
    assert_eq!(provenance.function, "origin");
    assert_eq!(provenance.line, 5);

    let err = tracker.update(ptr(0x50), ptr(0x70)).unwrap_err();
    assert_eq!(err, TrackerError::NotRegistered { pointer: 0x50 });
  }

  #[test]
  fn test_leak_report_scenario() {
    let mut tracker = AllocationTracker::with_capacity(4).unwrap();

    tracker.register(ptr(0xA0), site("alloc_a", 1, "a.c")).unwrap();
    tracker.register(ptr(0xB0), site("alloc_b", 2, "b.c")).unwrap();
    tracker.register(ptr(0xC0), site("alloc_c", 3, "c.c")).unwrap();

    assert_eq!(tracker.live_count(), 3);
    tracker.report();

    tracker.remove(ptr(0xB0)).unwrap();

    assert_eq!(tracker.live_count(), 2);
    assert!(tracker.lookup(ptr(0xA0)).is_some());
    assert!(tracker.lookup(ptr(0xB0)).is_none());
    assert!(tracker.lookup(ptr(0xC0)).is_some());
    tracker.report();
  }
}
