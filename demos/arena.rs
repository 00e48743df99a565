use memkit::{Arena, Pool, PoolItem};

/// A pooled element. The `next` field is the intrusive free-list link the
/// pool threads released elements through.
struct Particle {
  next: *mut Particle,
  x: f32,
  y: f32,
  energy: u64,
}

unsafe impl PoolItem for Particle {
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

fn main() {
  // The arena is a view over memory we own; here a stack buffer. A heap
  // buffer (Vec<u8>) works the same way.
  let mut buf = [0u8; 4096];
  let mut arena = Arena::bind(&mut buf);

  // --------------------------------------------------------------------
  // 1) Plain byte pushes: each one bumps the cursor forward.
  // --------------------------------------------------------------------
  println!("[1] capacity = {}, pos = {}", arena.capacity(), arena.pos());

  let first = arena.push(64).unwrap();
  println!("[1] push(64)  -> {:p}, pos = {}", first.as_ptr(), arena.pos());

  let second = arena.push_zero(32).unwrap();
  println!("[1] push_zero(32) -> {:p}, pos = {}", second.as_ptr(), arena.pos());

  // --------------------------------------------------------------------
  // 2) Checkpoint / scratch / restore: do throwaway work without tracking
  //    individual allocations.
  // --------------------------------------------------------------------
  let checkpoint = arena.pos();
  println!("\n[2] checkpoint at pos = {checkpoint}");

  let scratch = arena.push_array_zero::<u32>(256).unwrap();
  unsafe {
    for i in 0..256 {
      scratch.as_ptr().add(i).write(i as u32);
    }
  }
  println!("[2] scratch work used {} bytes", arena.pos() - checkpoint);

  arena.seek(checkpoint);
  println!("[2] seek back, pos = {} again", arena.pos());

  // --------------------------------------------------------------------
  // 3) Typed pushes respect alignment even after odd-sized allocations.
  // --------------------------------------------------------------------
  arena.push(3).unwrap();
  let aligned = arena.push_struct_zero::<u64>().unwrap();
  println!(
    "\n[3] push_struct_zero::<u64> -> {:p}, addr % 8 = {}",
    aligned.as_ptr(),
    aligned.as_ptr() as usize % 8
  );

  // --------------------------------------------------------------------
  // 4) A pool over the arena: warm up, release everything, allocate
  //    again, and watch the arena cursor stay put.
  // --------------------------------------------------------------------
  let mut pool: Pool<'_, '_, Particle> = Pool::bind(&mut arena);

  let mut particles = Vec::new();
  for i in 0..8 {
    let particle = pool.alloc().unwrap();
    unsafe {
      (*particle.as_ptr()).energy = i;
    }
    particles.push(particle);
  }
  let warm_pos = pool.arena().pos();
  println!("\n[4] 8 particles allocated, arena pos = {warm_pos}");

  for particle in particles.drain(..) {
    unsafe { pool.release(particle) };
  }
  for _ in 0..8 {
    particles.push(pool.alloc().unwrap());
  }
  println!(
    "[4] released and re-allocated 8, arena pos = {} (unchanged: the free list fed every alloc)",
    pool.arena().pos()
  );

  // --------------------------------------------------------------------
  // 5) Exhaustion is an error, not an overrun.
  // --------------------------------------------------------------------
  drop(particles);
  let err = arena.push(usize::MAX).unwrap_err();
  println!("\n[5] oversized push -> {err}");

  // --------------------------------------------------------------------
  // 6) clear() wipes the whole arena in O(1).
  // --------------------------------------------------------------------
  arena.clear();
  println!("\n[6] clear(), pos = {}, remaining = {}", arena.pos(), arena.remaining());
}
