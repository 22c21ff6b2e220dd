/// Use mimalloc as the global allocator.
/// The hot path allocates only at startup (one pool, three queues), but the
/// faster thread-local allocation also covers clap, temp buffers in tests,
/// and keeps binary startup lean.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod common;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod reverse;
