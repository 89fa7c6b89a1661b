use crate::{
	export::{parse_exported_tree, DecodeOptions, ExportError},
	partition::{partition, PartitionValue, Rectangle, Region},
	print::{PrintOptions, TreeDump},
	ModelDescription, Node, TraversalError,
};
use bdt_dataframe::{DataFrame, Row};
use itertools::izip;
use num_traits::clamp;
use rayon::prelude::*;
use std::{io::Write, ops::Neg};
use thiserror::Error;

/// A walk from the root of a tree to a leaf that takes this many steps is assumed to never end.
pub const MAX_TRAVERSAL_STEPS: usize = 500;

#[derive(Debug, Error)]
pub enum Error {
	#[error("tree {tree}: {source}")]
	Decode {
		tree: usize,
		#[source]
		source: ExportError,
	},
	#[error("tree {tree}: {source}")]
	Traversal {
		tree: usize,
		#[source]
		source: TraversalError,
	},
	#[error("tree {tree}: split feature \"{feature}\" is not one of the model's features")]
	UnknownFeature { tree: usize, feature: String },
	#[error("the model has {n_trees} trees but {n_weights} weights")]
	LengthMismatch { n_trees: usize, n_weights: usize },
	#[error("tree index {index} is out of range for a model with {n_trees} trees")]
	TreeIndexOutOfRange { index: usize, n_trees: usize },
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Json(#[from] serde_json::Error),
	#[error(transparent)]
	Yaml(#[from] serde_yaml::Error),
}

/// These are the options for `Ensemble::decision_function` and `Ensemble::predict_proba`.
#[derive(Clone, Debug, Default)]
pub struct ScoreOptions {
	/// Only the first `n_trees` trees contribute to the score. `None` or `Some(0)` uses every tree.
	pub n_trees: Option<usize>,
	/// If true, the score is divided by the sum of all tree weights.
	pub normalize: bool,
}

/// An `Ensemble` is a boosted forest: the score of an example is the weighted sum of the values of the leaves it reaches in each tree.
#[derive(Clone, Debug, PartialEq)]
pub struct Ensemble {
	trees: Vec<Node>,
	weights: Vec<f64>,
	feature_names: Vec<String>,
}

impl Ensemble {
	pub fn new(trees: Vec<Node>, weights: Vec<f64>, feature_names: Vec<String>) -> Result<Self, Error> {
		if trees.len() != weights.len() {
			return Err(Error::LengthMismatch {
				n_trees: trees.len(),
				n_weights: weights.len(),
			});
		}
		for (tree_index, tree) in trees.iter().enumerate() {
			if let Some(feature) =
				tree.find_feature(|feature| feature_names.iter().any(|name| name == feature))
			{
				return Err(Error::UnknownFeature {
					tree: tree_index,
					feature: feature.to_owned(),
				});
			}
		}
		Ok(Self {
			trees,
			weights,
			feature_names,
		})
	}

	/// Decode every tree in `description`. The trees are decoded in parallel.
	pub fn from_description(
		description: &ModelDescription,
		options: &DecodeOptions,
	) -> Result<Self, Error> {
		if description.trees.len() != description.weights.len() {
			return Err(Error::LengthMismatch {
				n_trees: description.trees.len(),
				n_weights: description.weights.len(),
			});
		}
		let trees = description
			.trees
			.par_iter()
			.enumerate()
			.map(|(tree_index, text)| {
				parse_exported_tree(text, &description.feature_names, options).map_err(|source| {
					Error::Decode {
						tree: tree_index,
						source,
					}
				})
			})
			.collect::<Result<Vec<_>, _>>()?;
		tracing::info!(
			n_trees = trees.len(),
			feature_names = ?description.feature_names,
			"decoded forest"
		);
		Ok(Self {
			trees,
			weights: description.weights.clone(),
			feature_names: description.feature_names.clone(),
		})
	}

	pub fn n_trees(&self) -> usize {
		self.trees.len()
	}

	pub fn tree(&self, index: usize) -> Option<&Node> {
		self.trees.get(index)
	}

	/// The weight of the tree at `index`, or `None` if there is no such tree.
	pub fn weight(&self, index: usize) -> Option<f64> {
		self.weights.get(index).copied()
	}

	pub fn total_weight(&self) -> f64 {
		self.weights.iter().sum()
	}

	pub fn feature_names(&self) -> &[String] {
		&self.feature_names
	}

	/// Compute the raw score of a single example.
	pub fn decision_function_one<R>(&self, row: &R, options: &ScoreOptions) -> Result<f64, Error>
	where
		R: Row + ?Sized,
	{
		let n_trees = match options.n_trees {
			Some(n_trees) if n_trees > 0 => n_trees.min(self.trees.len()),
			_ => self.trees.len(),
		};
		let mut decision = 0.0;
		for (tree_index, tree, weight) in izip!(0.., &self.trees, &self.weights).take(n_trees) {
			let value = tree.predict(row).map_err(|source| Error::Traversal {
				tree: tree_index,
				source,
			})?;
			decision += weight * value;
		}
		let total_weight = if options.normalize {
			self.total_weight()
		} else {
			1.0
		};
		Ok(decision / total_weight)
	}

	/// Compute the raw score of each example. Examples are scored in parallel and the scores are returned in the order of `rows`.
	pub fn decision_function<R>(&self, rows: &[R], options: &ScoreOptions) -> Result<Vec<f64>, Error>
	where
		R: Row + Sync,
	{
		rows.par_iter()
			.map(|row| self.decision_function_one(row, options))
			.collect()
	}

	pub fn decision_function_dataframe(
		&self,
		dataframe: &DataFrame,
		options: &ScoreOptions,
	) -> Result<Vec<f64>, Error> {
		let rows: Vec<_> = dataframe.rows().collect();
		self.decision_function(&rows, options)
	}

	/// Compute the probability that a single example is signal.
	pub fn predict_proba_one<R>(&self, row: &R, options: &ScoreOptions) -> Result<f64, Error>
	where
		R: Row + ?Sized,
	{
		self.decision_function_one(row, options).map(sigmoid)
	}

	pub fn predict_proba<R>(&self, rows: &[R], options: &ScoreOptions) -> Result<Vec<f64>, Error>
	where
		R: Row + Sync,
	{
		let mut scores = self.decision_function(rows, options)?;
		scores.iter_mut().for_each(|score| *score = sigmoid(*score));
		Ok(scores)
	}

	pub fn predict_proba_dataframe(
		&self,
		dataframe: &DataFrame,
		options: &ScoreOptions,
	) -> Result<Vec<f64>, Error> {
		let rows: Vec<_> = dataframe.rows().collect();
		self.predict_proba(&rows, options)
	}

	/// Write a depth first dump of the tree at `index` to `writer`.
	pub fn print_tree(
		&self,
		index: usize,
		writer: &mut dyn Write,
		options: &PrintOptions,
	) -> Result<(), Error> {
		let dump = self.dump(index, options)?;
		write!(writer, "{}", dump)?;
		Ok(())
	}

	pub fn dump<'a>(&'a self, index: usize, options: &'a PrintOptions) -> Result<TreeDump<'a>, Error> {
		let tree = self.tree_or_err(index)?;
		Ok(TreeDump {
			tree_index: index,
			weight: self.weights[index],
			tree,
			options,
		})
	}

	/// Partition `bounds` into one rectangle per leaf of the tree at `index`. The tree may only split on the first two feature names, which are the x and y axes.
	pub fn partition(
		&self,
		index: usize,
		bounds: Rectangle,
		value: PartitionValue,
	) -> Result<Vec<Region>, Error> {
		let tree = self.tree_or_err(index)?;
		partition(tree, &self.feature_names, bounds, value).map_err(|source| Error::Traversal {
			tree: index,
			source,
		})
	}

	fn tree_or_err(&self, index: usize) -> Result<&Node, Error> {
		self.trees.get(index).ok_or(Error::TreeIndexOutOfRange {
			index,
			n_trees: self.trees.len(),
		})
	}
}

fn sigmoid(value: f64) -> f64 {
	clamp(
		1.0 / (value.neg().exp() + 1.0),
		std::f64::EPSILON,
		1.0 - std::f64::EPSILON,
	)
}

#[cfg(test)]
use crate::{fixtures, Branch};
#[cfg(test)]
use maplit::hashmap;

#[cfg(test)]
fn names() -> Vec<String> {
	vec!["x".to_owned(), "y".to_owned()]
}

#[cfg(test)]
fn stump(threshold: f64, left_value: f64, right_value: f64) -> Node {
	fixtures::split(
		Branch::Root,
		"x",
		threshold,
		fixtures::leaf(Branch::Left, 3.0, 7.0, left_value),
		fixtures::leaf(Branch::Right, 8.0, 2.0, right_value),
	)
}

#[test]
fn test_single_tree_scores_leaf_value() {
	let ensemble = Ensemble::new(vec![fixtures::two_feature_tree()], vec![1.0], names()).unwrap();
	let options = ScoreOptions::default();
	let row = hashmap! { "x".to_owned() => 0.2, "y".to_owned() => 0.9 };
	assert_eq!(ensemble.decision_function_one(&row, &options).unwrap(), 1.0);
	let row = hashmap! { "x".to_owned() => 0.7, "y".to_owned() => 0.9 };
	assert_eq!(ensemble.decision_function_one(&row, &options).unwrap(), -1.0);
}

#[test]
fn test_additivity() {
	let (w1, w2) = (0.8, 0.3);
	let ensemble = Ensemble::new(
		vec![stump(0.5, 1.0, -1.0), stump(0.25, 0.5, -2.0)],
		vec![w1, w2],
		names(),
	)
	.unwrap();
	let row = hashmap! { "x".to_owned() => 0.4 };
	let options = ScoreOptions::default();
	assert_eq!(
		ensemble.decision_function_one(&row, &options).unwrap(),
		w1 * 1.0 + w2 * -2.0
	);
	let options = ScoreOptions {
		normalize: true,
		..Default::default()
	};
	assert_eq!(
		ensemble.decision_function_one(&row, &options).unwrap(),
		(w1 * 1.0 + w2 * -2.0) / (w1 + w2)
	);
	// Only the first tree, still normalized by the total weight.
	let options = ScoreOptions {
		n_trees: Some(1),
		normalize: true,
	};
	assert_eq!(
		ensemble.decision_function_one(&row, &options).unwrap(),
		w1 / (w1 + w2)
	);
	let options = ScoreOptions {
		n_trees: Some(10),
		normalize: false,
	};
	assert_eq!(
		ensemble.decision_function_one(&row, &options).unwrap(),
		w1 * 1.0 + w2 * -2.0
	);
}

#[test]
fn test_batch_scores_keep_order() {
	let ensemble = Ensemble::new(vec![stump(0.5, 1.0, -1.0)], vec![2.0], names()).unwrap();
	let rows: Vec<_> = (0..100)
		.map(|i| hashmap! { "x".to_owned() => f64::from(i) / 100.0 })
		.collect();
	let scores = ensemble
		.decision_function(&rows, &ScoreOptions::default())
		.unwrap();
	assert_eq!(scores.len(), 100);
	for (i, score) in scores.iter().enumerate() {
		let expected = if i <= 50 { 2.0 } else { -2.0 };
		assert_eq!(*score, expected);
	}
	let mut dataframe = DataFrame::new(vec!["x".to_owned()]);
	dataframe.columns[0].data = vec![0.5, 0.75];
	assert_eq!(
		ensemble
			.decision_function_dataframe(&dataframe, &ScoreOptions::default())
			.unwrap(),
		vec![2.0, -2.0]
	);
	assert!(ensemble
		.decision_function(&Vec::<std::collections::HashMap<String, f64>>::new(), &ScoreOptions::default())
		.unwrap()
		.is_empty());
}

#[test]
fn test_predict_proba() {
	let ensemble = Ensemble::new(
		vec![stump(0.5, 1.0, 0.0), stump(0.5, -1.0, 0.0)],
		vec![1.0, 1.0],
		names(),
	)
	.unwrap();
	let options = ScoreOptions::default();
	let row = hashmap! { "x".to_owned() => 0.0 };
	assert_eq!(ensemble.predict_proba_one(&row, &options).unwrap(), 0.5);
	let options = ScoreOptions {
		n_trees: Some(1),
		normalize: false,
	};
	assert_eq!(
		ensemble.predict_proba_one(&row, &options).unwrap(),
		1.0 / (1.0 + (-1.0f64).exp())
	);
	for score in &[-1000.0, -40.0, -1.0, 0.0, 1.0, 40.0, 1000.0] {
		let probability = sigmoid(*score);
		assert!(probability > 0.0 && probability < 1.0);
	}
	let mut dataframe = DataFrame::new(vec!["x".to_owned()]);
	dataframe.columns[0].data = vec![0.0, 1.0];
	assert_eq!(
		ensemble
			.predict_proba_dataframe(&dataframe, &ScoreOptions::default())
			.unwrap(),
		vec![0.5, 0.5]
	);
}

#[test]
fn test_weight_lookup() {
	let ensemble = Ensemble::new(
		vec![stump(0.5, 1.0, -1.0), stump(0.5, 1.0, -1.0)],
		vec![0.25, -1.0],
		names(),
	)
	.unwrap();
	assert_eq!(ensemble.weight(0), Some(0.25));
	assert_eq!(ensemble.weight(1), Some(-1.0));
	assert_eq!(ensemble.weight(2), None);
	assert_eq!(ensemble.total_weight(), -0.75);
	assert!(matches!(
		ensemble.partition(2, Rectangle::new(0.0, 1.0, 0.0, 1.0), PartitionValue::Purity),
		Err(Error::TreeIndexOutOfRange { index: 2, n_trees: 2 })
	));
}

#[test]
fn test_invalid_ensembles() {
	assert!(matches!(
		Ensemble::new(vec![stump(0.5, 1.0, -1.0)], vec![1.0, 2.0], names()),
		Err(Error::LengthMismatch {
			n_trees: 1,
			n_weights: 2
		})
	));
	assert!(matches!(
		Ensemble::new(vec![stump(0.5, 1.0, -1.0)], vec![1.0], vec!["y".to_owned()]),
		Err(Error::UnknownFeature { tree: 0, .. })
	));
}

#[test]
fn test_traversal_errors_name_the_tree() {
	let ensemble = Ensemble::new(
		vec![stump(0.5, 1.0, -1.0), fixtures::chain(600)],
		vec![1.0, 1.0],
		names(),
	)
	.unwrap();
	let row = hashmap! { "x".to_owned() => 0.0 };
	let error = ensemble
		.decision_function_one(&row, &ScoreOptions::default())
		.unwrap_err();
	assert_eq!(
		error.to_string(),
		"tree 1: traversal did not terminate within 500 steps"
	);
	// The first tree alone is fine.
	let options = ScoreOptions {
		n_trees: Some(1),
		normalize: false,
	};
	assert_eq!(ensemble.decision_function_one(&row, &options).unwrap(), 1.0);
	let row = hashmap! { "y".to_owned() => 0.0 };
	assert!(matches!(
		ensemble.decision_function(&[row], &options),
		Err(Error::Traversal {
			tree: 0,
			source: TraversalError::MissingFeature { .. }
		})
	));
}

#[test]
fn test_from_description() {
	let description = ModelDescription {
		feature_names: names(),
		weights: vec![0.5, 1.5],
		trees: vec![
			"|--- x <= 0.50000\n|   |--- weights: [3.00000, 7.00000] class: 1\n|--- x >  0.50000\n|   |--- weights: [8.00000, 2.00000] class: -1\n".to_owned(),
			"|--- y <= 0.10000\n|   |--- weights: [1.00000, 0.00000] class: -1\n|--- y >  0.10000\n|   |--- weights: [0.00000, 1.00000] class: 1\n".to_owned(),
		],
	};
	let ensemble = Ensemble::from_description(&description, &DecodeOptions::default()).unwrap();
	assert_eq!(ensemble.n_trees(), 2);
	assert_eq!(ensemble.feature_names(), &names()[..]);
	assert_eq!(ensemble.tree(0).unwrap(), &stump(0.5, 1.0, -1.0));
	let row = hashmap! { "x".to_owned() => 0.5, "y".to_owned() => 0.5 };
	assert_eq!(
		ensemble
			.decision_function_one(&row, &ScoreOptions::default())
			.unwrap(),
		0.5 * 1.0 + 1.5 * 1.0
	);
	let mut description = description;
	description.trees[1] = "|--- y <= 0.10000\n".to_owned();
	let error = Ensemble::from_description(&description, &DecodeOptions::default()).unwrap_err();
	assert!(matches!(error, Error::Decode { tree: 1, .. }));
	description.weights.pop();
	assert!(matches!(
		Ensemble::from_description(&description, &DecodeOptions::default()),
		Err(Error::LengthMismatch { .. })
	));
}

#[test]
fn test_print_tree() {
	let ensemble = Ensemble::new(vec![stump(0.5, 1.0, -1.0)], vec![1.0], names()).unwrap();
	let mut output = Vec::new();
	ensemble
		.print_tree(0, &mut output, &PrintOptions::default())
		.unwrap();
	let output = String::from_utf8(output).unwrap();
	let lines: Vec<&str> = output.lines().collect();
	assert_eq!(lines.len(), 5);
	assert!(lines[2].contains("ROOT"));
	assert!(lines[3].contains("LEFT") && lines[3].contains("SIG"));
	assert!(lines[4].contains("RIGHT") && lines[4].contains("BKG"));
	assert!(matches!(
		ensemble.print_tree(1, &mut Vec::<u8>::new(), &PrintOptions::default()),
		Err(Error::TreeIndexOutOfRange { index: 1, n_trees: 1 })
	));
}
