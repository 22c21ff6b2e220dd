mod core;

#[cfg(test)]
mod tests;

pub use self::core::{round_up, BufferPool, Job, JobTable, Segment, CACHE_LINE};
