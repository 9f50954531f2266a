#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::process;

use camcann::catalog::FeatureCatalog;
use camcann::config::PipelineConfig;
use camcann::data::{ensure_same_features, load_fingerprints};
use camcann::frequency::Threshold;
use camcann::model::{LinearCmcModel, ModelError, Split};
use camcann::report::{Subset, prediction_rows, save_catalog, save_predictions};

#[derive(Args)]
pub struct FitArgs {
    /// Training TSV with a log CMC column and one column per subgraph
    #[arg(long, value_name = "TSV")]
    pub train: PathBuf,

    /// Test TSV with the same columns as the training table
    #[arg(long, value_name = "TSV")]
    pub test: PathBuf,

    /// Pipeline configuration in TOML; defaults apply to anything it omits
    #[arg(long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Occurrence threshold: an integer count or a fraction of training molecules
    #[arg(long, value_name = "N|FRACTION")]
    pub threshold: Option<Threshold>,

    /// Skip low-frequency subgraph removal
    #[arg(long, conflicts_with = "threshold")]
    pub no_filter: bool,

    /// Where to write the annotated subgraph catalog
    #[arg(long, value_name = "TSV")]
    pub catalog_out: Option<PathBuf>,

    /// Where to write observed and predicted values for both splits
    #[arg(long, value_name = "TSV")]
    pub predictions_out: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "camcann",
    about = "Interpretable linear models of log CMC from subgraph fingerprints",
    long_about = "Removes rare subgraphs, selects informative ones with a cross-validated \
                 elastic net, and fits ridge regression on the selection, reporting a \
                 per-subgraph contribution to log CMC."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fit the model on a training table and score a test table")]
    Fit(FitArgs),

    #[command(about = "Write the default configuration to a TOML file")]
    InitConfig {
        /// Destination of the configuration file
        #[arg(default_value = "camcann.toml")]
        path: PathBuf,
    },

    #[command(about = "Display version information")]
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Fit(args)) => fit(args),
        Some(Commands::InitConfig { path }) => init_config(path),
        Some(Commands::Version) => {
            println!("camcann {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load_config(args: &FitArgs) -> Result<PipelineConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    Ok(config)
}

pub fn fit(args: FitArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args)?;

    let train = load_fingerprints(&args.train, &config.data)?;
    let test = load_fingerprints(&args.test, &config.data)?;
    ensure_same_features(&train, &test)?;

    let mut catalog = FeatureCatalog::from_ids(train.feature_ids.iter().cloned());
    let mut model = LinearCmcModel::from_config(
        Split::new(train.fingerprints.clone(), train.targets.clone())?,
        Split::new(test.fingerprints.clone(), test.targets.clone())?,
        &config,
    )?;

    if args.no_filter {
        println!("Low-frequency filtering skipped.");
    } else {
        let filtered = model.remove_low_freq_subgraphs(config.threshold)?;
        catalog.apply(&filtered.annotations)?;
        println!(
            "Removed {} of {} subgraphs occurring in too few molecules.",
            filtered.value,
            catalog.len()
        );
    }

    let selection = model.elastic_feature_select()?;
    catalog.apply(&selection.annotations)?;
    println!(
        "Elastic-net selection excluded {} subgraphs; {} remain.",
        selection.value,
        catalog.selected_indices().len()
    );

    let fit = model.ridge_model_train_test()?;
    catalog.apply(&fit.annotations)?;
    println!("{}", fit.value);

    if let Some(path) = &args.catalog_out {
        save_catalog(&catalog, path)?;
    }

    if let Some(path) = &args.predictions_out {
        let train_predictions = model.predict(train.fingerprints.view())?;
        let test_predictions = model.test_predictions().ok_or(ModelError::NotFitted)?;
        let mut rows = prediction_rows(
            &train.ids,
            train.targets.view(),
            train_predictions.view(),
            Subset::Train,
        )?;
        rows.extend(prediction_rows(
            &test.ids,
            test.targets.view(),
            test_predictions,
            Subset::Test,
        )?);
        save_predictions(&rows, path)?;
    }

    Ok(())
}

fn init_config(path: PathBuf) -> Result<(), Box<dyn Error>> {
    PipelineConfig::default().save(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
