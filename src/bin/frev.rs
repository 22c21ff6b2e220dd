use std::io;
use std::path::Path;
use std::process;

use clap::Parser;

use frev::common::io::Fd;
use frev::common::{io_error_msg, reset_sigpipe};
use frev::pipeline::{self, Config, DEFAULT_BUF_SIZE, DEFAULT_JOBS, DEFAULT_QUEUE_CAPACITY};

#[derive(Parser)]
#[command(
    name = "frev",
    version,
    about = "Reverse each line of a UTF-8 file characterwise"
)]
struct Cli {
    /// Input file ('-' for standard input)
    input: String,

    /// Output file ('-' for standard output; otherwise created and appended to)
    output: String,

    /// Chunk size in bytes; every line, terminator included, must fit in one chunk
    #[arg(long = "buf-size", value_name = "BYTES", default_value_t = DEFAULT_BUF_SIZE)]
    buf_size: usize,

    /// Chunks in flight between the pipeline stages
    #[arg(long, value_name = "N", default_value_t = DEFAULT_JOBS)]
    jobs: usize,

    /// Capacity of each inter-stage queue (power of two)
    #[arg(
        long = "queue-capacity",
        value_name = "N",
        default_value_t = DEFAULT_QUEUE_CAPACITY
    )]
    queue_capacity: usize,

    /// Do not pin the pipeline threads to CPUs 0-2
    #[arg(long = "no-pin")]
    no_pin: bool,

    /// Run the single-threaded engine instead of the pipeline
    #[arg(long)]
    serial: bool,
}

fn fail(context: &str, e: &io::Error) -> ! {
    eprintln!("frev: {}: {}", context, io_error_msg(e));
    process::exit(1);
}

fn main() {
    reset_sigpipe();
    let cli = Cli::parse();

    let cfg = Config {
        buf_size: cli.buf_size,
        jobs: cli.jobs,
        queue_capacity: cli.queue_capacity,
        pin_cpus: !cli.no_pin && !cli.serial,
    };
    // Reject bad configuration before the output file is even created.
    if let Err(e) = cfg.validate() {
        eprintln!("frev: {}", e);
        process::exit(1);
    }

    let input = if cli.input == "-" {
        Fd::stdin()
    } else {
        Fd::open_read(Path::new(&cli.input)).unwrap_or_else(|e| fail(&cli.input, &e))
    };
    let output = if cli.output == "-" {
        Fd::stdout()
    } else {
        Fd::create_append(Path::new(&cli.output)).unwrap_or_else(|e| fail(&cli.output, &e))
    };

    let result = if cli.serial {
        pipeline::run_serial(&input, &output, &cfg)
    } else {
        pipeline::run(&input, &output, &cfg)
    };
    if let Err(e) = result {
        eprintln!("frev: {}", io_error_msg(&e));
        process::exit(1);
    }

    if let Err(e) = input.close() {
        fail(&cli.input, &e);
    }
    if let Err(e) = output.close() {
        fail(&cli.output, &e);
    }
}
