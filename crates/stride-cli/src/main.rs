//! Stride command-line interface.
//!
//! Multiply a generated (or loaded) matrix by a vector with one of several
//! execution strategies, or upscale a bitmap:
//! ```sh
//! stride seq 4 3 --seed 7
//! stride tiled 1024 1024 --tile-size 64 --threads 8
//! STRIDE_WORKERS=4 stride distributed 1024 1024 32
//! stride run job.toml
//! stride upscale in.bmp out.bmp --threads 4 --method bicubic
//! ```

mod config;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};

use runner::{BackendChoice, OutputOptions, Problem};
use stride_compute::tiled::DEFAULT_TILE_SIZE;
use stride_image::upscale::DEFAULT_FACTOR;
use stride_image::{Method, UpscaleOptions};

#[derive(Parser)]
#[command(name = "stride")]
#[command(about = "Stride: tiled and distributed matrix-vector multiplication")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn parse_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be greater than 0".into()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Matrix shape and input options shared by every multiply subcommand.
#[derive(Args, Debug)]
struct ProblemArgs {
    /// Number of matrix rows.
    #[arg(value_parser = parse_positive)]
    rows: usize,
    /// Number of matrix columns (and vector length).
    #[arg(value_parser = parse_positive)]
    cols: usize,
    /// Generator seed. Defaults to the current time.
    #[arg(long)]
    seed: Option<u64>,
    /// Load the matrix from a text file instead of generating it.
    #[arg(long)]
    matrix_file: Option<PathBuf>,
    /// Load the vector from a text file instead of generating it.
    #[arg(long)]
    vector_file: Option<PathBuf>,
    /// Print only the resulting vector.
    #[arg(short, long)]
    quiet: bool,
    /// Write a JSON run summary to this path.
    #[arg(long)]
    json: Option<PathBuf>,
}

impl ProblemArgs {
    fn problem(&self) -> Problem {
        Problem {
            rows: self.rows,
            cols: self.cols,
            seed: self.seed,
            matrix_file: self.matrix_file.clone(),
            vector_file: self.vector_file.clone(),
        }
    }

    fn output(&self) -> OutputOptions {
        OutputOptions {
            print_inputs: !self.quiet,
            json: self.json.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Multiply on a single thread.
    Seq {
        #[command(flatten)]
        problem: ProblemArgs,
    },
    /// Split rows across a Rayon thread pool.
    Threads {
        #[command(flatten)]
        problem: ProblemArgs,
        /// Thread count. Defaults to all cores.
        #[arg(short, long, value_parser = parse_positive)]
        threads: Option<usize>,
    },
    /// Cache-blocked product on a Rayon thread pool.
    Tiled {
        #[command(flatten)]
        problem: ProblemArgs,
        /// Tile edge length.
        #[arg(long, default_value_t = DEFAULT_TILE_SIZE, value_parser = parse_positive)]
        tile_size: usize,
        /// Thread count. Defaults to all cores.
        #[arg(short, long, value_parser = parse_positive)]
        threads: Option<usize>,
    },
    /// Scatter row blocks to message-passing workers and gather the result.
    Distributed {
        #[command(flatten)]
        problem: ProblemArgs,
        /// Tile edge; rows and cols must be divisible by it.
        #[arg(value_parser = parse_positive)]
        tile_size: Option<usize>,
        /// Worker count. Defaults to the available parallelism.
        #[arg(short, long, env = "STRIDE_WORKERS", value_parser = parse_positive)]
        workers: Option<usize>,
    },
    /// Distributed product across MPI processes (launch with mpirun).
    #[cfg(feature = "mpi")]
    Mpi {
        #[command(flatten)]
        problem: ProblemArgs,
        /// Tile edge; rows and cols must be divisible by it.
        #[arg(value_parser = parse_positive)]
        tile_size: Option<usize>,
    },
    /// Run a job from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Validate a configuration file without running the job.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Enlarge a 24/32-bit BMP and optionally edge-filter it.
    Upscale {
        input: PathBuf,
        output: PathBuf,
        /// Thread count. Defaults to all cores.
        #[arg(short, long, value_parser = parse_positive)]
        threads: Option<usize>,
        /// Integer scale factor.
        #[arg(short, long, default_value_t = DEFAULT_FACTOR, value_parser = parse_positive)]
        factor: usize,
        /// Interpolation method.
        #[arg(short, long, value_enum, default_value_t = MethodArg::Bicubic)]
        method: MethodArg,
        /// Skip the edge-detection pass.
        #[arg(long)]
        no_edge_filter: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MethodArg {
    Nearest,
    Bicubic,
    /// Nearest, with output rows split across `--threads` workers.
    Banded,
}

impl From<MethodArg> for Method {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Nearest => Method::Nearest,
            MethodArg::Bicubic => Method::Bicubic,
            MethodArg::Banded => Method::Banded,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Seq { problem } => {
            runner::run_matvec(&problem.problem(), &BackendChoice::Sequential, &problem.output())?;
        }
        Commands::Threads { problem, threads } => {
            runner::run_matvec(
                &problem.problem(),
                &BackendChoice::Threads { threads },
                &problem.output(),
            )?;
        }
        Commands::Tiled {
            problem,
            tile_size,
            threads,
        } => {
            runner::run_matvec(
                &problem.problem(),
                &BackendChoice::Tiled { tile_size, threads },
                &problem.output(),
            )?;
        }
        Commands::Distributed {
            problem,
            tile_size,
            workers,
        } => {
            runner::run_matvec(
                &problem.problem(),
                &BackendChoice::Distributed { workers, tile_size },
                &problem.output(),
            )?;
        }
        #[cfg(feature = "mpi")]
        Commands::Mpi { problem, tile_size } => {
            runner::run_mpi(&problem.problem(), tile_size, &problem.output())?;
        }
        Commands::Run { config } => {
            let job = config::load_config(&config)
                .with_context(|| format!("failed to load {}", config.display()))?;
            job.validate()?;
            log::info!("Configuration: {}", config.display());

            match job.backend()? {
                #[cfg(feature = "mpi")]
                BackendChoice::Mpi { tile_size } => {
                    runner::run_mpi(&job.problem(), tile_size, &job.output())?;
                }
                choice => {
                    runner::run_matvec(&job.problem(), &choice, &job.output())?;
                }
            }
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)
                .with_context(|| format!("failed to load {}", config.display()))?;
            job.validate()?;
            println!("Configuration is valid: {}", config.display());
        }
        Commands::Upscale {
            input,
            output,
            threads,
            factor,
            method,
            no_edge_filter,
        } => {
            let options = UpscaleOptions {
                factor,
                method: method.into(),
                edge_filter: !no_edge_filter,
            };
            runner::run_upscale(&input, &output, threads, options)?;
        }
    }
    Ok(())
}
