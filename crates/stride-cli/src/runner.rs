//! Run driver: ties together input generation, backends, and reporting.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;

use stride_compute::{ComputeBackend, CpuBackend, DistributedBackend, SequentialBackend, TiledBackend};
use stride_core::generate::{clock_seed, generate_matrix, generate_vector};
use stride_core::io::{load_matrix, load_vector};
use stride_core::report::write_report;
use stride_core::{Matrix, PartitionPlan, Vector};
use stride_image::{bmp, UpscaleOptions, Upscaler};

/// Execution strategy selected on the command line or in a job file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendChoice {
    Sequential,
    Threads { threads: Option<usize> },
    Tiled { tile_size: usize, threads: Option<usize> },
    Distributed { workers: Option<usize>, tile_size: Option<usize> },
    Mpi { tile_size: Option<usize> },
}

/// Where the matrix and vector come from.
#[derive(Debug, Clone, Default)]
pub struct Problem {
    pub rows: usize,
    pub cols: usize,
    pub seed: Option<u64>,
    pub matrix_file: Option<PathBuf>,
    pub vector_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub print_inputs: bool,
    pub json: Option<PathBuf>,
}

/// JSON run summary.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub rows: usize,
    pub cols: usize,
    pub backend: String,
    pub workers: usize,
    /// Seed used for generated inputs; absent when both came from files.
    pub seed: Option<u64>,
    pub plan: Option<PartitionPlan>,
    pub phases: Option<Vec<String>>,
    pub elapsed_ms: f64,
    pub result: Vector,
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Build the backend for a choice. MPI is driven separately by [`run_mpi`].
pub fn create_backend(choice: &BackendChoice) -> Result<Box<dyn ComputeBackend>> {
    let backend: Box<dyn ComputeBackend> = match *choice {
        BackendChoice::Sequential => Box::new(SequentialBackend),
        BackendChoice::Threads { threads } => match threads {
            Some(n) => Box::new(CpuBackend::with_threads(n)?),
            None => Box::new(CpuBackend::new()?),
        },
        BackendChoice::Tiled { tile_size, threads } => Box::new(TiledBackend::new(
            tile_size,
            threads.unwrap_or_else(default_parallelism),
        )?),
        BackendChoice::Distributed { workers, tile_size } => {
            Box::new(distributed_backend(workers, tile_size)?)
        }
        BackendChoice::Mpi { .. } => {
            anyhow::bail!("the MPI backend runs only through the `mpi` subcommand under mpirun")
        }
    };
    log::info!("Backend: {}", backend.device_info().name);
    Ok(backend)
}

fn distributed_backend(workers: Option<usize>, tile_size: Option<usize>) -> Result<DistributedBackend> {
    let backend = DistributedBackend::new(workers.unwrap_or_else(default_parallelism))?;
    Ok(match tile_size {
        Some(t) => backend.with_tile_size(t)?,
        None => backend,
    })
}

/// Generate or load the inputs. The vector is seeded with `seed + 1` so the
/// two streams differ.
pub fn build_inputs(problem: &Problem) -> Result<(Matrix, Vector, Option<u64>)> {
    if problem.rows == 0 || problem.cols == 0 {
        anyhow::bail!(
            "matrix dimensions must be positive (got {}x{})",
            problem.rows,
            problem.cols
        );
    }

    let needs_seed = problem.matrix_file.is_none() || problem.vector_file.is_none();
    let seed = needs_seed.then(|| problem.seed.unwrap_or_else(clock_seed));

    // only read when at least one input is generated
    let base = seed.unwrap_or_default();

    let matrix = match &problem.matrix_file {
        Some(path) => load_matrix(path)
            .with_context(|| format!("failed to load matrix from {}", path.display()))?,
        None => generate_matrix(problem.rows, problem.cols, base)?,
    };
    if (matrix.rows(), matrix.cols()) != (problem.rows, problem.cols) {
        anyhow::bail!(
            "matrix file holds {}x{}, expected {}x{}",
            matrix.rows(),
            matrix.cols(),
            problem.rows,
            problem.cols
        );
    }

    let vector = match &problem.vector_file {
        Some(path) => load_vector(path)
            .with_context(|| format!("failed to load vector from {}", path.display()))?,
        None => generate_vector(problem.cols, base.wrapping_add(1))?,
    };
    if vector.len() != problem.cols {
        anyhow::bail!(
            "vector file holds {} values, expected {}",
            vector.len(),
            problem.cols
        );
    }

    if let Some(seed) = seed {
        log::debug!("inputs seeded with {seed}");
    }
    Ok((matrix, vector, seed))
}

/// Build inputs, multiply with the chosen backend, and report to stdout.
pub fn run_matvec(problem: &Problem, choice: &BackendChoice, output: &OutputOptions) -> Result<RunSummary> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = run_matvec_to(&mut out, problem, choice, output)?;
    out.flush()?;
    Ok(summary)
}

/// As [`run_matvec`], writing the report to `out`.
pub fn run_matvec_to<W: Write>(
    out: &mut W,
    problem: &Problem,
    choice: &BackendChoice,
    output: &OutputOptions,
) -> Result<RunSummary> {
    let (matrix, vector, seed) = build_inputs(problem)?;

    let start = Instant::now();
    let (result, info, plan, phases) = match *choice {
        BackendChoice::Distributed { workers, tile_size } => {
            let backend = distributed_backend(workers, tile_size)?;
            let info = backend.device_info();
            log::info!("Backend: {}", info.name);
            let run = backend.run(&matrix, &vector)?;
            let phases = run.trace.iter().map(|p| format!("{p:?}")).collect();
            (run.result, info, Some(run.plan), Some(phases))
        }
        _ => {
            let backend = create_backend(choice)?;
            let result = backend.matvec(&matrix, &vector)?;
            (result, backend.device_info(), None, None)
        }
    };
    let elapsed = start.elapsed();
    log::info!("{}x{} product in {:.3?}", matrix.rows(), matrix.cols(), elapsed);

    write_report(out, &matrix, &vector, &result, output.print_inputs)
        .context("failed to write report")?;
    if output.print_inputs {
        write_timing(out, info.backend_type.name(), elapsed)?;
    }

    let summary = RunSummary {
        rows: matrix.rows(),
        cols: matrix.cols(),
        backend: info.backend_type.name().to_string(),
        workers: info.workers,
        seed,
        plan,
        phases,
        elapsed_ms: elapsed.as_secs_f64() * 1e3,
        result,
    };
    if let Some(path) = &output.json {
        write_summary_json(&summary, path)?;
    }
    Ok(summary)
}

/// Trailing timing line of a full (non-quiet) report.
fn write_timing<W: Write>(out: &mut W, label: &str, elapsed: Duration) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Processing time ({label}): {:.6} seconds", elapsed.as_secs_f64())
}

/// Write a run summary as pretty-printed JSON.
pub fn write_summary_json(summary: &RunSummary, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write {}", path.display()))?;

    log::info!("Summary (JSON) written to: {}", path.display());
    Ok(())
}

/// Run the distributed product over MPI. Rank 0 builds the inputs and
/// reports; every other rank serves its share.
#[cfg(feature = "mpi")]
pub fn run_mpi(problem: &Problem, tile_size: Option<usize>, output: &OutputOptions) -> Result<()> {
    let backend = stride_compute::MpiBackend::initialize(tile_size)?;
    if !backend.is_root() {
        backend.serve()?;
        return Ok(());
    }

    log::info!("Backend: {}", backend.device_info().name);
    let (matrix, vector, seed) = match build_inputs(problem) {
        Ok(inputs) => inputs,
        Err(e) => {
            // release the waiting ranks before failing
            backend.abort_run();
            return Err(e);
        }
    };

    let start = Instant::now();
    let result = backend.matvec_root(&matrix, &vector)?;
    let elapsed = start.elapsed();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_report(&mut out, &matrix, &vector, &result, output.print_inputs)?;
    if output.print_inputs {
        write_timing(&mut out, "mpi", elapsed)?;
    }
    out.flush()?;

    if let Some(path) = &output.json {
        let info = backend.device_info();
        let summary = RunSummary {
            rows: matrix.rows(),
            cols: matrix.cols(),
            backend: info.backend_type.name().to_string(),
            workers: info.workers,
            seed,
            plan: Some(PartitionPlan::new(matrix.rows(), info.workers)?),
            phases: None,
            elapsed_ms: elapsed.as_secs_f64() * 1e3,
            result,
        };
        write_summary_json(&summary, path)?;
    }
    Ok(())
}

/// Upscale a bitmap file and write the result.
pub fn run_upscale(input: &Path, output: &Path, threads: Option<usize>, options: UpscaleOptions) -> Result<()> {
    let source = bmp::load(input).with_context(|| format!("failed to load {}", input.display()))?;
    let upscaler = Upscaler::new(threads.unwrap_or_else(default_parallelism), options)?;

    let start = Instant::now();
    let enlarged = upscaler.run(&source.image)?;
    let elapsed = start.elapsed();

    let (w, h) = (enlarged.width(), enlarged.height());
    let bitmap = source.with_image(enlarged)?;
    bmp::save(output, &bitmap).with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "Upscaled {} ({}x{}) to {} ({}x{}) using {}",
        input.display(),
        source.image.width(),
        source.image.height(),
        output.display(),
        w,
        h,
        options.method.name()
    );
    println!("Processing time: {:.6} seconds", elapsed.as_secs_f64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stride_image::{Image, Method};
    use tempfile::tempdir;

    fn quiet() -> OutputOptions {
        OutputOptions {
            print_inputs: false,
            json: None,
        }
    }

    fn seeded(rows: usize, cols: usize, seed: u64) -> Problem {
        Problem {
            rows,
            cols,
            seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn test_backends_produce_same_report() {
        let problem = seeded(9, 7, 5);
        let choices = [
            BackendChoice::Sequential,
            BackendChoice::Threads { threads: Some(2) },
            BackendChoice::Tiled {
                tile_size: 4,
                threads: Some(3),
            },
            BackendChoice::Distributed {
                workers: Some(4),
                tile_size: None,
            },
        ];

        let mut reports = Vec::new();
        for choice in &choices {
            let mut buf = Vec::new();
            run_matvec_to(&mut buf, &problem, choice, &quiet()).unwrap();
            reports.push(String::from_utf8(buf).unwrap());
        }
        assert!(reports.windows(2).all(|w| w[0] == w[1]));
        assert!(reports[0].starts_with("Resulting vector:\n"));
        assert_eq!(reports[0].lines().count(), 10);
    }

    #[test]
    fn test_report_includes_inputs() {
        let mut buf = Vec::new();
        let output = OutputOptions {
            print_inputs: true,
            json: None,
        };
        run_matvec_to(&mut buf, &seeded(2, 3, 1), &BackendChoice::Sequential, &output).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("Generated matrix:\n"));
        assert!(text.contains("\nGenerated vector:\n"));
        assert!(text.contains("\nResulting vector:\n"));
        let last = text.lines().last().unwrap();
        assert!(last.starts_with("Processing time (sequential): "));
        assert!(last.ends_with(" seconds"));
    }

    #[test]
    fn test_vector_uses_next_seed() {
        let (a, v, seed) = build_inputs(&seeded(3, 3, 10)).unwrap();
        assert_eq!(seed, Some(10));
        assert_eq!(a, generate_matrix(3, 3, 10).unwrap());
        assert_eq!(v, generate_vector(3, 11).unwrap());

        let (_, v, _) = build_inputs(&seeded(2, 2, u64::MAX)).unwrap();
        assert_eq!(v, generate_vector(2, 0).unwrap());
    }

    #[test]
    fn test_inputs_from_files() {
        let dir = tempdir().unwrap();
        let m = dir.path().join("a.txt");
        let v = dir.path().join("v.txt");
        std::fs::write(&m, "3 2\n1 2\n3 4\n5 6\n").unwrap();
        std::fs::write(&v, "2\n1 1\n").unwrap();

        let problem = Problem {
            rows: 3,
            cols: 2,
            seed: None,
            matrix_file: Some(m),
            vector_file: Some(v),
        };
        let summary = run_matvec_to(
            &mut Vec::new(),
            &problem,
            &BackendChoice::Distributed {
                workers: Some(2),
                tile_size: None,
            },
            &quiet(),
        )
        .unwrap();
        assert_eq!(summary.seed, None);
        assert_eq!(summary.result.as_slice(), &[3.0, 7.0, 11.0]);
        assert_eq!(summary.plan.unwrap().counts(), &[2, 1]);
        assert_eq!(summary.phases.unwrap().last().map(String::as_str), Some("Done"));
    }

    #[test]
    fn test_file_shape_must_match_dimensions() {
        let dir = tempdir().unwrap();
        let m = dir.path().join("a.txt");
        std::fs::write(&m, "2 2\n1 0\n0 1\n").unwrap();
        let problem = Problem {
            rows: 3,
            cols: 2,
            seed: Some(1),
            matrix_file: Some(m),
            vector_file: None,
        };
        assert!(build_inputs(&problem).is_err());
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(build_inputs(&seeded(0, 4, 1)).is_err());
        assert!(build_inputs(&seeded(4, 0, 1)).is_err());
    }

    #[test]
    fn test_distributed_tile_mismatch_fails() {
        let choice = BackendChoice::Distributed {
            workers: Some(2),
            tile_size: Some(4),
        };
        assert!(run_matvec_to(&mut Vec::new(), &seeded(6, 8, 1), &choice, &quiet()).is_err());
    }

    #[test]
    fn test_json_summary_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("summary.json");
        let output = OutputOptions {
            print_inputs: false,
            json: Some(path.clone()),
        };
        let choice = BackendChoice::Distributed {
            workers: Some(3),
            tile_size: None,
        };
        run_matvec_to(&mut Vec::new(), &seeded(5, 4, 2), &choice, &output).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["rows"], 5);
        assert_eq!(json["seed"], 2);
        assert_eq!(json["result"].as_array().unwrap().len(), 5);
        assert_eq!(json["plan"]["counts"], serde_json::json!([2, 2, 1]));
    }

    #[test]
    fn test_mpi_choice_needs_subcommand() {
        assert!(create_backend(&BackendChoice::Mpi { tile_size: None }).is_err());
    }

    #[test]
    fn test_upscale_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.bmp");
        let output = dir.path().join("out.bmp");
        let img = Image::new(3, 2, 3, (0..18).map(|i| i as u8 * 10).collect()).unwrap();
        bmp::save(&input, &bmp::Bitmap::from_image(img).unwrap()).unwrap();

        let mut images = Vec::new();
        for method in [Method::Bicubic, Method::Nearest, Method::Banded] {
            let options = UpscaleOptions {
                factor: 3,
                method,
                edge_filter: true,
            };
            run_upscale(&input, &output, Some(2), options).unwrap();

            let result = bmp::load(&output).unwrap();
            assert_eq!((result.image.width(), result.image.height()), (9, 6));
            images.push(result.image);
        }
        assert_eq!(images[1], images[2]);
    }
}
