#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::uninlined_format_args)]

mod cohort;
mod config;
mod csv_reader;
mod ml;
mod structs;
mod synthetic;

use clap::{Parser, Subcommand};
use cohort::Cohort;
use config::PipelineConfig;
use ml::masker::LabelsMasker;
use std::path::{Path, PathBuf};
use structs::{AnalysisResult, Atlas, ConnectivityKind, FconnError, Result};
use synthetic::SyntheticSpec;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// fconn - resting-state functional connectivity classification
#[derive(Parser, Debug)]
#[command(name = "fconn")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify subjects from their connectivity, write result files
    Analyze {
        /// Phenotype table (CSV/TSV) listing subjects, data paths and labels
        #[arg(short, long)]
        phenotype: PathBuf,

        /// Atlas table with x, y, z, label columns, one row per voxel
        #[arg(short, long)]
        atlas: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "./fconn_output")]
        output_dir: PathBuf,

        /// JSON pipeline configuration; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Connectivity kind to evaluate (repeatable)
        #[arg(short, long, value_enum)]
        kind: Vec<ConnectivityKind>,

        /// Number of cross-validation splits
        #[arg(long)]
        n_splits: Option<usize>,

        /// Fraction of subjects in each training set
        #[arg(long)]
        train_fraction: Option<f64>,

        /// Split seed
        #[arg(long)]
        seed: Option<u64>,

        /// SVM inverse regularisation strength
        #[arg(long)]
        svm_c: Option<f64>,

        /// Smoothing kernel FWHM in mm (0 disables smoothing)
        #[arg(long)]
        fwhm: Option<f64>,
    },

    /// Write a synthetic on-disk cohort usable by `analyze`
    Generate {
        /// Directory for the generated files
        #[arg(short, long)]
        output_dir: PathBuf,

        #[command(flatten)]
        cohort: SyntheticArgs,
    },

    /// Run the classification stages on an in-memory synthetic cohort
    Demo {
        #[command(flatten)]
        cohort: SyntheticArgs,

        /// Number of cross-validation splits
        #[arg(long, default_value = "100")]
        n_splits: usize,

        /// Connectivity kind to evaluate (repeatable)
        #[arg(short, long, value_enum)]
        kind: Vec<ConnectivityKind>,

        /// Also write result files here
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct SyntheticArgs {
    /// Subjects per class
    #[arg(long, default_value = "10")]
    n_per_class: usize,

    /// Timepoints per subject
    #[arg(long, default_value = "50")]
    timepoints: usize,

    /// Number of regions
    #[arg(long, default_value = "5")]
    regions: usize,

    /// Coupling between regions 0 and 1 in the positive class
    #[arg(long, default_value = "0.0")]
    effect: f64,

    /// Generator seed
    #[arg(long, default_value = "0")]
    seed: u64,
}

impl From<SyntheticArgs> for SyntheticSpec {
    fn from(args: SyntheticArgs) -> Self {
        Self {
            n_per_class: args.n_per_class,
            timepoints: args.timepoints,
            regions: args.regions,
            effect: args.effect,
            seed: args.seed,
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);

    if let Err(e) = run(args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Install the stderr subscriber; `RUST_LOG` wins over `--log-level`
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Some(Commands::Analyze {
            phenotype,
            atlas,
            output_dir,
            config,
            kind,
            n_splits,
            train_fraction,
            seed,
            svm_c,
            fwhm,
        }) => {
            let mut cfg = match config {
                Some(path) => PipelineConfig::from_file(&path)?,
                None => PipelineConfig::default(),
            };
            if !kind.is_empty() {
                cfg.kinds = kind;
            }
            if let Some(n) = n_splits {
                cfg.cv.n_splits = n;
            }
            if let Some(f) = train_fraction {
                cfg.cv.train_fraction = f;
            }
            if let Some(s) = seed {
                cfg.cv.seed = s;
            }
            if let Some(c) = svm_c {
                cfg.cv.svm_c = c;
            }
            if let Some(w) = fwhm {
                cfg.signal.smoothing_fwhm = w;
            }
            run_analyze(&phenotype, &atlas, &output_dir, &cfg)
        }

        Some(Commands::Generate { output_dir, cohort }) => {
            synthetic::write_dataset(&output_dir, &cohort.into())?;
            eprintln!("Synthetic cohort written to {}", output_dir.display());
            Ok(())
        }

        Some(Commands::Demo {
            cohort,
            n_splits,
            kind,
            output_dir,
        }) => {
            let mut cfg = PipelineConfig::default();
            cfg.cv.n_splits = n_splits;
            if !kind.is_empty() {
                cfg.kinds = kind;
            }
            run_demo(&cohort.into(), &cfg, output_dir.as_deref())
        }

        None => {
            eprintln!("No subcommand provided. Use 'fconn analyze', 'fconn generate' or 'fconn demo'.");
            eprintln!("Run 'fconn --help' for usage information.");
            std::process::exit(1);
        }
    }
}

/// Run every stage on an on-disk cohort
fn run_analyze(
    phenotype: &Path,
    atlas_path: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
) -> Result<()> {
    config.validate()?;
    for (what, path) in [("Phenotype file", phenotype), ("Atlas file", atlas_path)] {
        if !path.exists() {
            return Err(FconnError::Config(format!(
                "{what} not found: {}",
                path.display()
            )));
        }
    }

    let cohort = Cohort::from_phenotype(phenotype, &config.cohort)?;
    let atlas = Atlas::from_file(atlas_path)?;
    info!(
        subjects = cohort.len(),
        positive = cohort.n_positive(),
        voxels = atlas.n_voxels(),
        regions = atlas.n_regions(),
        "loaded cohort"
    );

    let masker = LabelsMasker::new(&atlas, &config.signal);
    let timeseries = ml::pipeline::extract_cohort(&cohort, &masker)?;
    let labels = cohort.labels();

    let result = ml::pipeline::run_pipeline(&timeseries, &labels, config)?;

    write_outputs(
        output_dir,
        &phenotype.display().to_string(),
        &labels,
        &atlas.region_names(),
        config,
        &result,
    )
}

/// Run stages 3 to 5 on generated timeseries
fn run_demo(spec: &SyntheticSpec, config: &PipelineConfig, output_dir: Option<&Path>) -> Result<()> {
    let (timeseries, labels) = synthetic::generate_timeseries(spec);
    info!(
        subjects = labels.len(),
        regions = spec.regions,
        timepoints = spec.timepoints,
        "generated synthetic cohort"
    );

    let result = ml::pipeline::run_pipeline(&timeseries, &labels, config)?;
    for report in &result.reports {
        println!("{:<20} {}", report.kind.name(), report.cv.summary());
    }

    if let Some(dir) = output_dir {
        let names: Vec<String> = (1..=spec.regions).map(|r| format!("region_{r}")).collect();
        write_outputs(dir, "synthetic", &labels, &names, config, &result)?;
    }
    Ok(())
}

fn write_outputs(
    output_dir: &Path,
    source: &str,
    labels: &[bool],
    region_names: &[String],
    config: &PipelineConfig,
    result: &AnalysisResult,
) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    let n_positive = labels.iter().filter(|&&l| l).count();

    let summary = ml::output::build_summary(source, labels.len(), n_positive, result);
    print!("{summary}");
    ml::output::write_summary(output_dir, &summary)?;
    ml::output::write_scores(output_dir, result)?;
    ml::output::write_results_json(output_dir, config, labels.len(), n_positive, result)?;
    let matrices = ml::output::write_mean_matrices(output_dir, result, region_names)?;

    eprintln!("Output written to {}", output_dir.display());
    eprintln!("  - summary.txt");
    eprintln!("  - scores.csv");
    eprintln!("  - results.json");
    for path in &matrices {
        if let Some(name) = path.file_name() {
            eprintln!("  - {}", name.to_string_lossy());
        }
    }
    Ok(())
}
