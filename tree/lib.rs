/*!
This crate reads boosted decision tree ensembles from the indented text that tree learners print to describe a fitted tree, and reimplements inference over them. For the text format, see [`export`]. Once decoded, an [`Ensemble`] scores examples, prints its trees, and computes the exact partition of a two feature plane into the rectangles induced by a tree's splits.
*/

#![allow(clippy::tabs_in_doc_comments)]

use bdt_dataframe::Row;
use std::fmt;
use thiserror::Error;

mod description;
mod ensemble;
pub mod export;
mod partition;
mod print;

pub use description::ModelDescription;
pub use ensemble::{Ensemble, Error, ScoreOptions, MAX_TRAVERSAL_STEPS};
pub use export::{parse_exported_tree, DecodeOptions, ExportError};
pub use partition::{partition, PartitionValue, Rectangle, Region, MAX_PARTITION_DEPTH};
pub use print::{PrintOptions, TreeDump};

/// Trees are stored as nested nodes. Each branch owns its two children.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
	Branch(BranchNode),
	Leaf(LeafNode),
	/// A subtree that was cut off, either by the exporter or by the decoder's depth limit. It cannot be traversed.
	Truncated(TruncatedNode),
}

/// `Branch` records which side of its parent a node hangs from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Branch {
	Root,
	Left,
	Right,
}

/// A `BranchNode` sends an example left if the value of `feature` is <= `threshold` and right otherwise.
#[derive(Clone, Debug, PartialEq)]
pub struct BranchNode {
	pub branch: Branch,
	/// This is the name of the feature to get the value for.
	pub feature: String,
	/// This is the threshold value of the split.
	pub threshold: f64,
	pub left: Box<Node>,
	pub right: Box<Node>,
}

/// The leaves in a tree hold the class weights of the training examples that reached them and the value to output.
#[derive(Clone, Debug, PartialEq)]
pub struct LeafNode {
	pub branch: Branch,
	pub background_weight: f64,
	pub signal_weight: f64,
	/// This is the value to output. Its sign is the class: positive for signal, otherwise background.
	pub value: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TruncatedNode {
	pub branch: Branch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Class {
	Signal,
	Background,
}

/// These are the ways a walk over a single tree can fail.
#[derive(Debug, Error, PartialEq)]
pub enum TraversalError {
	#[error("the example has no value for feature \"{feature}\"")]
	MissingFeature { feature: String },
	#[error("traversal did not terminate within {limit} steps")]
	NonTermination { limit: usize },
	#[error("reached a truncated branch")]
	TruncatedBranch,
	#[error("feature \"{feature}\" is neither of the two partition axes")]
	UnsupportedFeatureInPartition { feature: String },
}

impl Node {
	pub fn branch(&self) -> Branch {
		match self {
			Self::Branch(BranchNode { branch, .. }) => *branch,
			Self::Leaf(LeafNode { branch, .. }) => *branch,
			Self::Truncated(TruncatedNode { branch }) => *branch,
		}
	}

	/// Return the value of the leaf `row` is sent to.
	pub fn predict<R>(&self, row: &R) -> Result<f64, TraversalError>
	where
		R: Row + ?Sized,
	{
		let mut node = self;
		let mut steps = 0;
		loop {
			steps += 1;
			if steps >= MAX_TRAVERSAL_STEPS {
				return Err(TraversalError::NonTermination {
					limit: MAX_TRAVERSAL_STEPS,
				});
			}
			match node {
				Self::Branch(BranchNode {
					feature,
					threshold,
					left,
					right,
					..
				}) => {
					let value = row
						.get(feature)
						.ok_or_else(|| TraversalError::MissingFeature {
							feature: feature.clone(),
						})?;
					node = if value <= *threshold {
						left.as_ref()
					} else {
						right.as_ref()
					};
				}
				Self::Leaf(LeafNode { value, .. }) => return Ok(*value),
				Self::Truncated(_) => return Err(TraversalError::TruncatedBranch),
			}
		}
	}

	pub fn n_leaves(&self) -> usize {
		let mut count = 0;
		let mut stack = vec![self];
		while let Some(node) = stack.pop() {
			match node {
				Self::Branch(branch) => {
					stack.push(&branch.right);
					stack.push(&branch.left);
				}
				Self::Leaf(_) => count += 1,
				Self::Truncated(_) => {}
			}
		}
		count
	}

	/// Find the first split feature, in depth first order, for which `known` returns false.
	pub fn find_feature<'a>(&'a self, known: impl Fn(&str) -> bool) -> Option<&'a str> {
		let mut stack = vec![self];
		while let Some(node) = stack.pop() {
			if let Self::Branch(branch) = node {
				if !known(&branch.feature) {
					return Some(&branch.feature);
				}
				stack.push(&branch.right);
				stack.push(&branch.left);
			}
		}
		None
	}
}

impl LeafNode {
	/// The fraction of the leaf's weight that is signal, or 0 for a leaf with no weight.
	pub fn purity(&self) -> f64 {
		let total = self.signal_weight + self.background_weight;
		if total != 0.0 {
			self.signal_weight / total
		} else {
			0.0
		}
	}

	pub fn class(&self) -> Class {
		if self.value > 0.0 {
			Class::Signal
		} else {
			Class::Background
		}
	}
}

impl fmt::Display for Branch {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			Self::Root => "ROOT",
			Self::Left => "LEFT",
			Self::Right => "RIGHT",
		};
		f.pad(label)
	}
}

#[cfg(test)]
pub(crate) mod fixtures {
	use super::*;

	pub fn leaf(branch: Branch, background_weight: f64, signal_weight: f64, value: f64) -> Node {
		Node::Leaf(LeafNode {
			branch,
			background_weight,
			signal_weight,
			value,
		})
	}

	pub fn split(branch: Branch, feature: &str, threshold: f64, left: Node, right: Node) -> Node {
		Node::Branch(BranchNode {
			branch,
			feature: feature.to_owned(),
			threshold,
			left: Box::new(left),
			right: Box::new(right),
		})
	}

	/// A chain of `depth` branches on `x` that always continues to the left.
	pub fn chain(depth: usize) -> Node {
		let mut node = leaf(Branch::Left, 1.0, 1.0, 1.0);
		for _ in 0..depth {
			node = split(
				Branch::Left,
				"x",
				0.5,
				node,
				leaf(Branch::Right, 1.0, 0.0, -1.0),
			);
		}
		node
	}

	/// x <= 0.5 ? (y <= 0.25 ? A : B) : C
	pub fn two_feature_tree() -> Node {
		split(
			Branch::Root,
			"x",
			0.5,
			split(
				Branch::Left,
				"y",
				0.25,
				leaf(Branch::Left, 3.0, 7.0, 1.0),
				leaf(Branch::Right, 0.0, 4.0, 1.0),
			),
			leaf(Branch::Right, 8.0, 2.0, -1.0),
		)
	}
}

#[test]
fn test_predict_routes_ties_left() {
	use maplit::hashmap;
	let tree = fixtures::two_feature_tree();
	let row = hashmap! { "x".to_owned() => 0.5, "y".to_owned() => 0.25 };
	assert_eq!(tree.predict(&row), Ok(1.0));
	let row = hashmap! { "x".to_owned() => 0.5, "y".to_owned() => 0.26 };
	assert_eq!(tree.predict(&row), Ok(1.0));
	let row = hashmap! { "x".to_owned() => 0.500001, "y".to_owned() => 0.0 };
	assert_eq!(tree.predict(&row), Ok(-1.0));
	let row = hashmap! { "x".to_owned() => std::f64::NAN };
	assert_eq!(tree.predict(&row), Ok(-1.0));
}

#[test]
fn test_predict_missing_feature() {
	use maplit::hashmap;
	let tree = fixtures::two_feature_tree();
	let row = hashmap! { "x".to_owned() => 0.0 };
	assert_eq!(
		tree.predict(&row),
		Err(TraversalError::MissingFeature {
			feature: "y".to_owned()
		})
	);
}

#[test]
fn test_predict_guard() {
	use maplit::hashmap;
	let row = hashmap! { "x".to_owned() => 0.0 };
	assert_eq!(fixtures::chain(10).predict(&row), Ok(1.0));
	assert_eq!(fixtures::chain(498).predict(&row), Ok(1.0));
	assert_eq!(
		fixtures::chain(499).predict(&row),
		Err(TraversalError::NonTermination {
			limit: MAX_TRAVERSAL_STEPS
		})
	);
	assert_eq!(
		fixtures::chain(600).predict(&row),
		Err(TraversalError::NonTermination {
			limit: MAX_TRAVERSAL_STEPS
		})
	);
}

#[test]
fn test_predict_truncated() {
	use maplit::hashmap;
	let tree = fixtures::split(
		Branch::Root,
		"x",
		0.5,
		Node::Truncated(TruncatedNode {
			branch: Branch::Left,
		}),
		fixtures::leaf(Branch::Right, 1.0, 1.0, 1.0),
	);
	let row = hashmap! { "x".to_owned() => 0.0 };
	assert_eq!(tree.predict(&row), Err(TraversalError::TruncatedBranch));
	let row = hashmap! { "x".to_owned() => 1.0 };
	assert_eq!(tree.predict(&row), Ok(1.0));
}

#[test]
fn test_purity_and_class() {
	let leaf = LeafNode {
		branch: Branch::Left,
		background_weight: 0.0,
		signal_weight: 5.0,
		value: 1.0,
	};
	assert_eq!(leaf.purity(), 1.0);
	assert_eq!(leaf.class(), Class::Signal);
	let leaf = LeafNode {
		branch: Branch::Right,
		background_weight: 0.0,
		signal_weight: 0.0,
		value: 0.0,
	};
	assert_eq!(leaf.purity(), 0.0);
	assert_eq!(leaf.class(), Class::Background);
	assert_eq!(fixtures::two_feature_tree().n_leaves(), 3);
}
