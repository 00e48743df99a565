use memkit::{tracker, trace_calloc, trace_free, trace_malloc, trace_realloc};

// Run with RUST_LOG=debug to see the per-operation trace lines.
fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

  // Size the registry before the first traced allocation.
  tracker::init(10).expect("tracker init");

  // --------------------------------------------------------------------
  // 1) Traced allocations register themselves with their call site.
  // --------------------------------------------------------------------
  let block = unsafe { trace_malloc!(8000) };
  assert!(!block.is_null());

  let table = unsafe { trace_calloc!(64, 16) };
  assert!(!table.is_null());

  println!("[1] live allocations: {}", tracker::live_allocations());

  // --------------------------------------------------------------------
  // 2) realloc moves the block but keeps its original provenance: the
  //    report below still names the trace_malloc! line above.
  // --------------------------------------------------------------------
  let block = unsafe { trace_realloc!(block, 16000) };
  assert!(!block.is_null());

  println!("[2] live allocations after realloc: {}", tracker::live_allocations());

  // --------------------------------------------------------------------
  // 3) Leak report with both blocks still live.
  // --------------------------------------------------------------------
  println!("\n[3] leak report, both blocks live:");
  tracker::print_all_allocations();

  // --------------------------------------------------------------------
  // 4) Free one and report again.
  // --------------------------------------------------------------------
  unsafe { trace_free!(table) };

  println!("\n[4] leak report after freeing the table:");
  tracker::print_all_allocations();

  // --------------------------------------------------------------------
  // 5) Clean exit: free the rest; the final report shows zero leaks.
  // --------------------------------------------------------------------
  unsafe { trace_free!(block) };

  println!("\n[5] final report:");
  tracker::print_all_allocations();
}
