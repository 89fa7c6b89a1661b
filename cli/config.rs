/*!
This module defines the `Config` struct, which is read from the yaml file passed with `--config`. Every value is optional. Values given on the command line take precedence over values in the config, and values in neither fall back to the library defaults.
*/

use anyhow::{format_err, Context, Result};
use bdt_tree::{DecodeOptions, PartitionValue, Rectangle, ScoreOptions};
use std::path::Path;

#[derive(Debug, Default, serde::Deserialize)]
pub struct Config {
	pub max_depth: Option<usize>,
	pub n_trees: Option<usize>,
	pub normalize: Option<bool>,
	pub partition: Option<PartitionConfig>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct PartitionConfig {
	pub value: Option<PartitionValue>,
	pub bounds: Option<BoundsConfig>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct BoundsConfig {
	pub xmin: Option<f64>,
	pub xmax: Option<f64>,
	pub ymin: Option<f64>,
	pub ymax: Option<f64>,
}

pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
	if let Some(config_path) = config_path {
		let config = std::fs::read_to_string(config_path)
			.with_context(|| format!("failed to read config file {}", config_path.display()))?;
		let config = serde_yaml::from_str(&config)
			.with_context(|| format!("failed to parse config file {}", config_path.display()))?;
		Ok(config)
	} else {
		Ok(Config::default())
	}
}

impl Config {
	pub fn decode_options(&self) -> DecodeOptions {
		let mut options = DecodeOptions::default();
		if let Some(max_depth) = self.max_depth {
			options.max_depth = max_depth;
		}
		options
	}

	pub fn score_options(&self, n_trees: Option<usize>, normalize: bool) -> ScoreOptions {
		ScoreOptions {
			n_trees: n_trees.or(self.n_trees),
			normalize: normalize || self.normalize.unwrap_or(false),
		}
	}

	pub fn partition_value(&self, leaf_value: bool) -> PartitionValue {
		if leaf_value {
			return PartitionValue::LeafValue;
		}
		self.partition
			.as_ref()
			.and_then(|partition| partition.value)
			.unwrap_or_default()
	}

	/// Each bound comes from `bounds` if given there and from the config otherwise. All four must be known.
	pub fn partition_bounds(&self, bounds: &BoundsConfig) -> Result<Rectangle> {
		let default = BoundsConfig::default();
		let config_bounds = self
			.partition
			.as_ref()
			.and_then(|partition| partition.bounds.as_ref())
			.unwrap_or(&default);
		let bound = |name: &str, value: Option<f64>, config_value: Option<f64>| {
			value
				.or(config_value)
				.ok_or_else(|| format_err!("no value for --{} on the command line or in the config", name))
		};
		Ok(Rectangle::new(
			bound("xmin", bounds.xmin, config_bounds.xmin)?,
			bound("xmax", bounds.xmax, config_bounds.xmax)?,
			bound("ymin", bounds.ymin, config_bounds.ymin)?,
			bound("ymax", bounds.ymax, config_bounds.ymax)?,
		))
	}
}

#[test]
fn test_config_precedence() {
	let config: Config = serde_yaml::from_str(
		"
max_depth: 12
n_trees: 5
normalize: true
partition:
  value: leaf_value
  bounds:
    xmin: -1.0
    xmax: 1.0
    ymin: 0.0
",
	)
	.unwrap();
	assert_eq!(config.decode_options().max_depth, 12);
	let options = config.score_options(None, false);
	assert_eq!(options.n_trees, Some(5));
	assert!(options.normalize);
	assert_eq!(config.score_options(Some(2), false).n_trees, Some(2));
	assert_eq!(config.partition_value(false), PartitionValue::LeafValue);
	let bounds = BoundsConfig {
		xmax: Some(2.0),
		ymax: Some(3.0),
		..Default::default()
	};
	assert_eq!(
		config.partition_bounds(&bounds).unwrap(),
		Rectangle::new(-1.0, 2.0, 0.0, 3.0)
	);
	assert!(config
		.partition_bounds(&BoundsConfig::default())
		.unwrap_err()
		.to_string()
		.contains("--ymax"));
}

#[test]
fn test_default_config() {
	let config = load_config(None).unwrap();
	assert_eq!(config.decode_options().max_depth, 100);
	let options = config.score_options(None, false);
	assert_eq!(options.n_trees, None);
	assert!(!options.normalize);
	assert_eq!(config.partition_value(false), PartitionValue::Purity);
	assert_eq!(config.partition_value(true), PartitionValue::LeafValue);
}
