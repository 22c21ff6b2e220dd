mod core;
mod serial;


pub use self::core::{
    run, Config, DEFAULT_BUF_SIZE, DEFAULT_JOBS, DEFAULT_QUEUE_CAPACITY, POISON,
};
pub use self::serial::run_serial;
