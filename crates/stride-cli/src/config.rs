//! TOML configuration deserialisation for matrix-vector jobs.

use std::path::PathBuf;

use serde::Deserialize;

use crate::runner::{BackendChoice, OutputOptions, Problem};

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    pub problem: ProblemConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Problem size and input sources.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProblemConfig {
    pub rows: usize,
    pub cols: usize,
    /// Generator seed. Without one the clock seeds the run.
    pub seed: Option<u64>,
    pub matrix_file: Option<PathBuf>,
    pub vector_file: Option<PathBuf>,
}

/// Execution strategy.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComputeConfig {
    /// "sequential", "threads", "tiled", "distributed", or "mpi".
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Rayon threads for "threads" and "tiled". Default: all cores.
    pub threads: Option<usize>,
    /// Worker threads for "distributed". Default: available parallelism.
    pub workers: Option<usize>,
    /// Tile edge for "tiled" (default 64) and optionally "distributed"/"mpi".
    pub tile_size: Option<usize>,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            threads: None,
            workers: None,
            tile_size: None,
        }
    }
}

fn default_backend() -> String {
    "sequential".into()
}

/// Report options.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Print the generated matrix and vector before the result (default: true).
    #[serde(default = "default_true")]
    pub print_inputs: bool,
    /// Write a JSON run summary to this path.
    pub json: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            print_inputs: true,
            json: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl JobConfig {
    pub fn problem(&self) -> Problem {
        Problem {
            rows: self.problem.rows,
            cols: self.problem.cols,
            seed: self.problem.seed,
            matrix_file: self.problem.matrix_file.clone(),
            vector_file: self.problem.vector_file.clone(),
        }
    }

    /// Resolve the backend section into a concrete choice.
    pub fn backend(&self) -> anyhow::Result<BackendChoice> {
        let c = &self.compute;
        let choice = match c.backend.as_str() {
            "sequential" | "seq" => BackendChoice::Sequential,
            "threads" | "cpu" => BackendChoice::Threads { threads: c.threads },
            "tiled" => BackendChoice::Tiled {
                tile_size: c.tile_size.unwrap_or(stride_compute::tiled::DEFAULT_TILE_SIZE),
                threads: c.threads,
            },
            "distributed" => BackendChoice::Distributed {
                workers: c.workers,
                tile_size: c.tile_size,
            },
            "mpi" => BackendChoice::Mpi {
                tile_size: c.tile_size,
            },
            other => anyhow::bail!(
                "unknown backend '{other}' (expected sequential, threads, tiled, distributed, or mpi)"
            ),
        };
        Ok(choice)
    }

    pub fn output(&self) -> OutputOptions {
        OutputOptions {
            print_inputs: self.output.print_inputs,
            json: self.output.json.clone(),
        }
    }

    /// Check everything that can be checked without allocating the problem.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.problem.rows == 0 || self.problem.cols == 0 {
            anyhow::bail!(
                "matrix dimensions must be positive (got {}x{})",
                self.problem.rows,
                self.problem.cols
            );
        }
        match self.backend()? {
            BackendChoice::Threads { threads: Some(0) }
            | BackendChoice::Tiled {
                threads: Some(0), ..
            } => anyhow::bail!("thread count must be at least 1"),
            BackendChoice::Distributed {
                workers: Some(0), ..
            } => anyhow::bail!("worker count must be at least 1"),
            BackendChoice::Tiled { tile_size: 0, .. } => anyhow::bail!("tile size must be at least 1"),
            BackendChoice::Distributed {
                tile_size: Some(t), ..
            }
            | BackendChoice::Mpi { tile_size: Some(t) } => {
                stride_core::kernel::check_tile_divisible(self.problem.rows, self.problem.cols, t)?;
            }
            _ => {}
        }
        for path in [&self.problem.matrix_file, &self.problem.vector_file]
            .into_iter()
            .flatten()
        {
            if !path.exists() {
                anyhow::bail!("input file not found: {}", path.display());
            }
        }
        Ok(())
    }
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: JobConfig = toml::from_str(&content)?;
    Ok(config)
}
