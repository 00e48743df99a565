//! # memkit - Arena, Pool, and Allocation-Tracking Toolkit
//!
//! This crate provides a small set of memory building blocks: a fixed-capacity
//! **arena (bump) allocator**, a **pool allocator** that recycles fixed-size
//! elements over an arena, and a **provenance tracker** with traced
//! malloc/calloc/realloc/free wrappers for finding leaks.
//!
//! ## Overview
//!
//! An arena serves memory by advancing a single cursor through a pre-sized
//! buffer:
//!
//! ```text
//!   Arena Concept:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                      CALLER-SUPPLIED BUFFER                          │
//!   │                                                                      │
//!   │   ┌─────┬─────┬─────┬─────┬───────────────────────────────────────┐  │
//!   │   │ A1  │ A2  │ A3  │ A4  │            Free Space                 │  │
//!   │   └─────┴─────┴─────┴─────┴───────────────────────────────────────┘  │
//!   │   ▲                       ▲                                     ▲    │
//!   │   │                       │                                     │    │
//!   │  base                  cursor (pos)                         capacity │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Each push "bumps" the cursor forward: O(1), no fragmentation.
//!   Reclamation is bulk only: pop, seek to a checkpoint, or clear.
//! ```
//!
//! A pool layers a free list on top of one arena for homogeneous, frequently
//! churned elements:
//!
//! ```text
//!   Pool Concept:
//!
//!   arena:  ┌──────┬──────┬──────┬──────┬────────────┐
//!           │ elem │ elem │ elem │ elem │    free    │
//!           └──────┴──────┴──────┴──────┴────────────┘
//!              │              ▲      │
//!              │ released     │      │ released
//!              ▼              │      ▼
//!   free list: elem ──next──> elem ──next──> null
//!
//!   alloc pops the free list, or bump-allocates when it is empty.
//!   Released elements never go back to the arena.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   memkit
//!   ├── align     - Alignment helpers (align_up, align!, align_to!)
//!   ├── arena     - Arena bump allocator
//!   ├── pool      - Pool allocator (free-list recycler over an Arena)
//!   ├── tracker   - Allocation provenance registry and leak report
//!   └── trace     - Traced malloc/calloc/realloc/free wrappers
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use memkit::{Arena, Pool, PoolItem};
//!
//! struct Particle {
//!     next: *mut Particle,
//!     energy: u64,
//! }
//!
//! unsafe impl PoolItem for Particle {
//!     fn next_free(&self) -> *mut Self { self.next }
//!     fn set_next_free(&mut self, next: *mut Self) { self.next = next; }
//! }
//!
//! let mut buf = [0u8; 4096];
//! let mut arena = Arena::bind(&mut buf);
//!
//! // scratch work between a checkpoint and a restore
//! let checkpoint = arena.pos();
//! let scratch = arena.push_zero(512).unwrap();
//! arena.seek(checkpoint);
//!
//! // fixed-size elements with recycling
//! let mut pool: Pool<'_, '_, Particle> = Pool::bind(&mut arena);
//! let particle = pool.alloc().unwrap();
//! unsafe { pool.release(particle) };
//! assert_eq!(pool.alloc().unwrap(), particle);
//! ```
//!
//! ## Leak Tracking
//!
//! The traced wrappers instrument the raw heap primitives. Every operation is
//! logged with its call site, and the global tracker records where each live
//! block was allocated:
//!
//! ```rust,ignore
//! memkit::tracker::init(64)?;
//!
//! let data = unsafe { memkit::trace_malloc!(1024) };
//! // ... forget to free it ...
//!
//! // end-of-program leak report: prints the allocation above with the
//! // function, line, and file that made it
//! memkit::tracker::print_all_allocations();
//! ```
//!
//! ## Features
//!
//! - **`trace`** (default): compiles the traced wrapper bodies; without it the
//!   `trace_*!` macros expand to the plain `libc` calls with zero overhead
//! - **`registry`** (default, implies `trace`): traced wrappers maintain the
//!   global allocation tracker consulted by the leak report
//!
//! ## Limitations
//!
//! - **No per-allocation free**: arenas reclaim in bulk only (pop/seek/clear)
//! - **Single-owner arenas**: an `Arena` and its `Pool`s are `&mut`-discipline
//!   types; only the tracker singleton is shared, behind a mutex
//! - **Pointers, not references**: allocations are returned as `NonNull` and
//!   writing through them is the caller's `unsafe`
//!
//! ## Safety
//!
//! The arena and pool hand out raw pointers into caller-owned memory, and the
//! traced wrappers are thin shims over the C heap. All of them require
//! `unsafe` at the use site; the invariants each call expects are documented
//! per function.

pub mod align;
mod arena;
mod pool;
pub mod trace;
pub mod tracker;

pub use arena::{Arena, ArenaError};
pub use pool::{Pool, PoolItem};
pub use tracker::{AllocationTracker, CallSite, Provenance, TrackerError};
