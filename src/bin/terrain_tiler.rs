use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Env, Target};
use log::{error, info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};
use terrain_tiler::{CancellationToken, DtmError, Pipeline, PipelineConfig};

/// Tiled DSM to DTM reconstruction
#[derive(Parser, Debug)]
#[command(author, version, about = "DSM to DTM: overlap tiling, parallel solving, feathered mosaic", long_about = None)]
struct Cli {
    /// YAML run configuration
    config: PathBuf,

    /// Input DSM (overrides input.dsm_file)
    #[arg(long)]
    dsm: Option<PathBuf>,

    /// Ground classification raster (overrides input.mask_file)
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Solver initialization raster (overrides input.init_file)
    #[arg(long)]
    init: Option<PathBuf>,

    /// Output DTM (overrides input.output_file)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Working directory (overrides input.work_dir)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Solver executable
    #[arg(long)]
    solver: Option<PathBuf>,

    #[arg(long)]
    sigma: Option<f64>,

    /// Regularization weight
    #[arg(long)]
    regul: Option<f64>,

    #[arg(long)]
    norm: Option<String>,

    /// Working resolution in metres
    #[arg(long)]
    resolution: Option<f64>,

    #[arg(long)]
    tile_size: Option<usize>,

    /// Tile overlap in pixels
    #[arg(long)]
    pad_size: Option<usize>,

    /// Number of worker threads
    #[arg(long)]
    cpu: Option<usize>,

    /// Remove the temporary directory after a successful run
    #[arg(long)]
    clean_temp: bool,

    /// Log to the console instead of the log file
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(self, mut config: PipelineConfig) -> PipelineConfig {
        let input = &mut config.input;
        if let Some(v) = self.dsm {
            input.dsm_file = v;
        }
        if let Some(v) = self.mask {
            input.mask_file = v;
        }
        if let Some(v) = self.init {
            input.init_file = Some(v);
        }
        if let Some(v) = self.output {
            input.output_file = v;
        }
        if let Some(v) = self.work_dir {
            input.work_dir = v;
        }

        if let Some(v) = self.solver {
            config.solver.program = v;
        }
        if let Some(v) = self.sigma {
            config.solver.sigma = v;
        }
        if let Some(v) = self.regul {
            config.solver.regul = v;
        }
        if let Some(v) = self.norm {
            config.solver.norm = v;
        }

        if let Some(v) = self.tile_size {
            config.tiling.tile_size = v;
        }
        if let Some(v) = self.pad_size {
            config.tiling.pad_size = v;
        }

        let processing = &mut config.processing;
        if self.resolution.is_some() {
            processing.resolution = self.resolution;
        }
        if let Some(v) = self.cpu {
            processing.cpu_count = v;
        }
        processing.clean_temp |= self.clean_temp;
        processing.verbose |= self.verbose;
        config
    }
}

fn init_logging(verbose: bool, output: &Path) -> Result<Option<PathBuf>> {
    let mut builder = Builder::from_env(Env::default().default_filter_or(if verbose { "debug" } else { "info" }));
    builder.format_timestamp_secs();

    if verbose {
        builder.target(Target::Stderr).init();
        return Ok(None);
    }

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).with_context(|| format!("cannot create {}", dir.display()))?;
    let log_path = dir.join(format!("log_{}.txt", chrono::Local::now().format("%Y%m%d_%H%M%S")));
    let file = File::create(&log_path).with_context(|| format!("cannot create log file {}", log_path.display()))?;

    builder.target(Target::Pipe(Box::new(file))).init();
    Ok(Some(log_path))
}

/// Cancel the run on Ctrl-C; solver children sit in their own process group
/// and are killed by the dispatcher.
fn spawn_interrupt_listener(token: CancellationToken) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Interrupt handler unavailable: {}", e);
                return;
            }
        };
        if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
            warn!("Interrupt received, stopping solver processes");
            token.cancel();
        }
    });
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone();
    let config = PipelineConfig::from_yaml_file(&config_path)
        .with_context(|| format!("cannot load configuration {}", config_path.display()))?;
    let config = cli.apply(config);

    let log_path = init_logging(config.processing.verbose, &config.input.output_file)?;
    if let Some(path) = &log_path {
        eprintln!("Logging to {}", path.display());
    }
    info!("Configuration: {}", config_path.display());

    let pipeline = Pipeline::new(config).context("invalid configuration")?;
    spawn_interrupt_listener(pipeline.cancellation_token());

    match pipeline.run() {
        Ok(summary) => {
            info!(
                "{}x{} tiles: {} solved, {} empty",
                summary.grid.nb_tiles_x, summary.grid.nb_tiles_y, summary.tiles_solved, summary.tiles_copied
            );
            eprintln!(
                "DTM written to {} ({:.1}s)",
                summary.output.display(),
                summary.elapsed.as_secs_f64()
            );
            Ok(())
        }
        Err(DtmError::TileFailures(failures)) => {
            for failure in &failures {
                match failure.exit_code {
                    Some(code) => eprintln!("tile {}_{}: solver exit code {}", failure.x, failure.y, code),
                    None => eprintln!("{}", failure),
                }
            }
            error!("{} tile(s) failed, no mosaic written", failures.len());
            anyhow::bail!("{} tile(s) failed", failures.len())
        }
        Err(e) => {
            error!("❌ {}", e);
            Err(e).context("terrain extraction failed")
        }
    }
}
