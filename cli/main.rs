//! This module contains the main entrypoint to the bdt cli.

use self::config::{load_config, BoundsConfig, Config};
use anyhow::{format_err, Context, Result};
use bdt_dataframe::DataFrame;
use bdt_tree::{Ensemble, ModelDescription, PrintOptions};
use clap::{Args, Parser};
use colored::Colorize;
use std::{
	io::Write,
	path::{Path, PathBuf},
};
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser)]
#[clap(about = "Decode, score, and inspect boosted decision trees exported as text.")]
enum Options {
	#[clap(name = "print", about = "print the decoded trees")]
	Print(PrintArgs),
	#[clap(name = "score", about = "score the rows of a csv file")]
	Score(ScoreArgs),
	#[clap(name = "weight", about = "print the weight of a tree")]
	Weight(WeightArgs),
	#[clap(name = "partition", about = "write the rectangles a tree divides the plane of the first two features into as json")]
	Partition(PartitionArgs),
}

#[derive(Args, Debug)]
struct ModelArgs {
	#[clap(short, long, help = "the path to the model description, a .json or .yaml file")]
	model: PathBuf,
	#[clap(short, long, help = "the path to a config file")]
	config: Option<PathBuf>,
	#[clap(short, long, help = "log each decoded node")]
	verbose: bool,
}

#[derive(Args, Debug)]
struct PrintArgs {
	#[clap(flatten)]
	model: ModelArgs,
	#[clap(short, long, help = "print only the tree with this index")]
	tree: Option<usize>,
	#[clap(long = "no-color", help = "do not highlight leaf classes", parse(from_flag = std::ops::Not::not))]
	color: bool,
}

#[derive(Args, Debug)]
struct ScoreArgs {
	#[clap(flatten)]
	model: ModelArgs,
	#[clap(short, long, help = "the path to a .csv file with one column per feature")]
	data: PathBuf,
	#[clap(long, help = "use only the first n trees")]
	n_trees: Option<usize>,
	#[clap(long, help = "divide scores by the total tree weight")]
	normalize: bool,
	#[clap(long, help = "output probabilities instead of raw scores")]
	proba: bool,
}

#[derive(Args, Debug)]
struct WeightArgs {
	#[clap(flatten)]
	model: ModelArgs,
	#[clap(short, long)]
	tree: usize,
}

#[derive(Args, Debug)]
struct PartitionArgs {
	#[clap(flatten)]
	model: ModelArgs,
	#[clap(short, long)]
	tree: usize,
	#[clap(long, allow_hyphen_values = true)]
	xmin: Option<f64>,
	#[clap(long, allow_hyphen_values = true)]
	xmax: Option<f64>,
	#[clap(long, allow_hyphen_values = true)]
	ymin: Option<f64>,
	#[clap(long, allow_hyphen_values = true)]
	ymax: Option<f64>,
	#[clap(long, help = "tag each rectangle with the leaf value instead of the purity")]
	leaf_value: bool,
}

#[derive(serde::Serialize)]
struct RegionOutput {
	corners: [(f64, f64); 4],
	purity: f64,
	value: f64,
}

fn main() {
	let options = Options::parse();
	let result = match options {
		Options::Print(options) => cli_print(options),
		Options::Score(options) => cli_score(options),
		Options::Weight(options) => cli_weight(options),
		Options::Partition(options) => cli_partition(options),
	};
	if let Err(error) = result {
		eprintln!("{}: {:#}", "error".red().bold(), error);
		std::process::exit(1);
	}
}

fn cli_print(options: PrintArgs) -> Result<()> {
	let (_, ensemble) = load(&options.model)?;
	let print_options = PrintOptions {
		color: options.color,
	};
	let tree_indexes: Vec<usize> = match options.tree {
		Some(tree) => vec![tree],
		None => (0..ensemble.n_trees()).collect(),
	};
	let stdout = std::io::stdout();
	let mut stdout = stdout.lock();
	for tree_index in tree_indexes {
		ensemble.print_tree(tree_index, &mut stdout, &print_options)?;
	}
	Ok(())
}

fn cli_score(options: ScoreArgs) -> Result<()> {
	let (config, ensemble) = load(&options.model)?;
	let dataframe = DataFrame::from_path(&options.data)
		.with_context(|| format!("failed to read data file {}", options.data.display()))?;
	for feature_name in ensemble.feature_names() {
		if dataframe.column(feature_name).is_none() {
			tracing::warn!(%feature_name, "the data file has no column for this feature");
		}
	}
	let score_options = config.score_options(options.n_trees, options.normalize);
	tracing::info!(n_rows = dataframe.nrows(), ?score_options, "scoring");
	let scores = if options.proba {
		ensemble.predict_proba_dataframe(&dataframe, &score_options)?
	} else {
		ensemble.decision_function_dataframe(&dataframe, &score_options)?
	};
	let stdout = std::io::stdout();
	let mut stdout = stdout.lock();
	for score in scores {
		writeln!(stdout, "{}", score)?;
	}
	Ok(())
}

fn cli_weight(options: WeightArgs) -> Result<()> {
	let (_, ensemble) = load(&options.model)?;
	let weight = ensemble.weight(options.tree).ok_or_else(|| {
		format_err!(
			"tree index {} is out of range for a model with {} trees",
			options.tree,
			ensemble.n_trees()
		)
	})?;
	println!("{}", weight);
	Ok(())
}

fn cli_partition(options: PartitionArgs) -> Result<()> {
	let (config, ensemble) = load(&options.model)?;
	let bounds = config.partition_bounds(&BoundsConfig {
		xmin: options.xmin,
		xmax: options.xmax,
		ymin: options.ymin,
		ymax: options.ymax,
	})?;
	let value = config.partition_value(options.leaf_value);
	let regions: Vec<RegionOutput> = ensemble
		.partition(options.tree, bounds, value)?
		.into_iter()
		.map(|region| RegionOutput {
			corners: region.rectangle.corners(),
			purity: region.purity,
			value: region.value,
		})
		.collect();
	let stdout = std::io::stdout();
	let mut stdout = stdout.lock();
	serde_json::to_writer_pretty(&mut stdout, &regions)?;
	writeln!(stdout)?;
	Ok(())
}

/// Install the logger, then read the config and the model.
fn load(options: &ModelArgs) -> Result<(Config, Ensemble)> {
	init_logging(options.verbose);
	let config = load_config(options.config.as_deref())?;
	let ensemble = load_ensemble(&options.model, &config)?;
	Ok((config, ensemble))
}

fn load_ensemble(path: &Path, config: &Config) -> Result<Ensemble> {
	let description = ModelDescription::from_path(path)
		.with_context(|| format!("failed to read model description {}", path.display()))?;
	let ensemble = Ensemble::from_description(&description, &config.decode_options())
		.with_context(|| format!("failed to decode the trees in {}", path.display()))?;
	Ok(ensemble)
}

fn init_logging(verbose: bool) {
	let filter = if verbose {
		EnvFilter::new("debug")
	} else {
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
	};
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}
