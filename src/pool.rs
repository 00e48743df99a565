use std::ptr::{self, NonNull};

use crate::arena::{Arena, ArenaError};

/// Types that can be handed out by a [`Pool`].
///
/// The pool threads its free list through a link field inside the element
/// itself, so released elements cost no extra memory.
///
/// # Safety
///
/// Implementors must guarantee that:
///
/// - `next_free`/`set_next_free` read and write a dedicated field that the
///   rest of the program does not touch while the element sits on the free
///   list;
/// - the all-zero byte pattern is a valid value of `Self`, since the pool
///   zero-fills every element it hands out, fresh or recycled.
pub unsafe trait PoolItem: Sized {
  fn next_free(&self) -> *mut Self;

  fn set_next_free(
    &mut self,
    next: *mut Self,
  );
}

/// A fixed-size element recycler over an [`Arena`].
///
/// `alloc` pops the free list when it can and bump-allocates from the bound
/// arena when it cannot. `release` pushes an element back onto the free list;
/// memory is never returned to the arena, so N allocate/release cycles after
/// warm-up cause no arena growth.
pub struct Pool<'p, 'a, T: PoolItem> {
  arena: &'p mut Arena<'a>,
  first_free: *mut T,
}

impl<'p, 'a, T: PoolItem> Pool<'p, 'a, T> {
  /// Binds a pool to an arena with an empty free list.
  pub fn bind(arena: &'p mut Arena<'a>) -> Self {
    Self {
      arena,
      first_free: ptr::null_mut(),
    }
  }

  /// The arena backing this pool.
  pub fn arena(&self) -> &Arena<'a> {
    self.arena
  }

  /// Returns a zero-filled element, recycling a released one when possible.
  ///
  /// Inherits [`ArenaError::OutOfSpace`] from the backing arena once the
  /// free list is empty and the arena is exhausted.
  pub fn alloc(&mut self) -> Result<NonNull<T>, ArenaError> {
    match NonNull::new(self.first_free) {
      Some(head) => {
        // SAFETY: every pointer on the free list came from release(),
        // whose caller guaranteed it points at a live element of this
        // pool's arena; nothing else aliases it while it sits here.
        unsafe {
          self.first_free = head.as_ref().next_free();
          ptr::write_bytes(head.as_ptr(), 0, 1);
        }
        Ok(head)
      }
      None => self.arena.push_struct_zero::<T>(),
    }
  }

  /// Pushes `item` onto the free list.
  ///
  /// # Safety
  ///
  /// `item` must have been returned by [`alloc`](Pool::alloc) on this pool,
  /// must not already be on the free list, and the caller must not use it
  /// again until `alloc` hands it back. The pool does not validate any of
  /// this.
  pub unsafe fn release(
    &mut self,
    item: NonNull<T>,
  ) {
    unsafe {
      (*item.as_ptr()).set_next_free(self.first_free);
    }
    self.first_free = item.as_ptr();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Node {
    next: *mut Node,
    value: u64,
  }

  unsafe impl PoolItem for Node {
    fn next_free(&self) -> *mut Self {
      self.next
    }

    fn set_next_free(
      &mut self,
      next: *mut Self,
    ) {
      self.next = next;
    }
  }

  #[test]
  fn test_release_then_alloc_reuses_lifo() {
    let mut buf = [0u8; 256];
    let mut arena = Arena::bind(&mut buf);
    let mut pool: Pool<'_, '_, Node> = Pool::bind(&mut arena);

    let first = pool.alloc().unwrap();
    unsafe {
      (*first.as_ptr()).value = 42;
      pool.release(first);
    }

    let second = pool.alloc().unwrap();
    assert_eq!(first, second);

    // recycled elements come back zeroed
    unsafe {
      assert_eq!((*second.as_ptr()).value, 0);
      assert!((*second.as_ptr()).next.is_null());
    }
  }

  #[test]
  fn test_recycling_causes_no_arena_growth() {
    let mut buf = [0u8; 1024];
    let mut arena = Arena::bind(&mut buf);
    let mut pool: Pool<'_, '_, Node> = Pool::bind(&mut arena);

    let count = 8;
    let mut items = Vec::new();
    for _ in 0..count {
      items.push(pool.alloc().unwrap());
    }

    let warm_pos = pool.arena().pos();

    for item in items.drain(..) {
      unsafe { pool.release(item) };
    }
    for _ in 0..count {
      items.push(pool.alloc().unwrap());
    }

    assert_eq!(pool.arena().pos(), warm_pos);
  }

  #[test]
  fn test_alloc_inherits_arena_exhaustion() {
    let mut buf = [0u8; 16];
    let mut arena = Arena::bind(&mut buf);
    let mut pool: Pool<'_, '_, Node> = Pool::bind(&mut arena);

    // a Node is 16 bytes; at most one fits, and only if the buffer
    // happens to be aligned, so two allocations must fail
    let first = pool.alloc();
    let second = pool.alloc();
    assert!(matches!(second, Err(ArenaError::OutOfSpace { .. })));

    if let Ok(item) = first {
      unsafe { pool.release(item) };
      assert!(pool.alloc().is_ok());
    }
  }
}
