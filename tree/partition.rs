use crate::{BranchNode, LeafNode, Node, TraversalError};

/// Partitioning a tree that is deeper than this is assumed to never end.
pub const MAX_PARTITION_DEPTH: usize = 1000;

/// An axis aligned rectangle in the plane of the first two features.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Rectangle {
	pub xmin: f64,
	pub xmax: f64,
	pub ymin: f64,
	pub ymax: f64,
}

/// This selects the value each region of a partition is tagged with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PartitionValue {
	#[serde(rename = "purity")]
	Purity,
	#[serde(rename = "leaf_value")]
	LeafValue,
}

impl Default for PartitionValue {
	fn default() -> Self {
		Self::Purity
	}
}

/// A `Region` is the part of the plane that is sent to one leaf.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct Region {
	pub rectangle: Rectangle,
	/// The fraction of the leaf's weight that is signal.
	pub purity: f64,
	/// Either the purity or the leaf value, as selected by `PartitionValue`.
	pub value: f64,
}

#[derive(Clone, Copy)]
enum Axis {
	X,
	Y,
}

impl Rectangle {
	pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
		Self {
			xmin,
			xmax,
			ymin,
			ymax,
		}
	}

	/// The corners in the order (xmin, ymin), (xmin, ymax), (xmax, ymax), (xmax, ymin).
	pub fn corners(&self) -> [(f64, f64); 4] {
		[
			(self.xmin, self.ymin),
			(self.xmin, self.ymax),
			(self.xmax, self.ymax),
			(self.xmax, self.ymin),
		]
	}

	pub fn area(&self) -> f64 {
		(self.xmax - self.xmin) * (self.ymax - self.ymin)
	}

	/// Split into the part with coordinates <= `threshold` along `axis` and the rest. The threshold is clamped to the rectangle so both parts stay inside it.
	fn split(&self, axis: Axis, threshold: f64) -> (Rectangle, Rectangle) {
		match axis {
			Axis::X => {
				let threshold = threshold.max(self.xmin).min(self.xmax);
				(
					Rectangle {
						xmax: threshold,
						..*self
					},
					Rectangle {
						xmin: threshold,
						..*self
					},
				)
			}
			Axis::Y => {
				let threshold = threshold.max(self.ymin).min(self.ymax);
				(
					Rectangle {
						ymax: threshold,
						..*self
					},
					Rectangle {
						ymin: threshold,
						..*self
					},
				)
			}
		}
	}
}

/// Compute the regions that `tree` divides `bounds` into, one per leaf. The first feature name is the x axis and the second is the y axis. Any other split feature is an error.
pub fn partition(
	tree: &Node,
	feature_names: &[String],
	bounds: Rectangle,
	value: PartitionValue,
) -> Result<Vec<Region>, TraversalError> {
	partition_node(tree, feature_names, bounds, value, 0)
}

fn partition_node(
	node: &Node,
	feature_names: &[String],
	bounds: Rectangle,
	value: PartitionValue,
	depth: usize,
) -> Result<Vec<Region>, TraversalError> {
	let depth = depth + 1;
	if depth > MAX_PARTITION_DEPTH {
		return Err(TraversalError::NonTermination {
			limit: MAX_PARTITION_DEPTH,
		});
	}
	match node {
		Node::Leaf(leaf) => Ok(vec![leaf_region(leaf, bounds, value)]),
		Node::Branch(BranchNode {
			feature,
			threshold,
			left,
			right,
			..
		}) => {
			let axis = if feature_names.get(0) == Some(feature) {
				Axis::X
			} else if feature_names.get(1) == Some(feature) {
				Axis::Y
			} else {
				return Err(TraversalError::UnsupportedFeatureInPartition {
					feature: feature.clone(),
				});
			};
			let (left_bounds, right_bounds) = bounds.split(axis, *threshold);
			let mut regions = partition_node(left, feature_names, left_bounds, value, depth)?;
			regions.extend(partition_node(
				right,
				feature_names,
				right_bounds,
				value,
				depth,
			)?);
			Ok(regions)
		}
		Node::Truncated(_) => Err(TraversalError::TruncatedBranch),
	}
}

fn leaf_region(leaf: &LeafNode, rectangle: Rectangle, value: PartitionValue) -> Region {
	let purity = leaf.purity();
	let value = match value {
		PartitionValue::Purity => purity,
		PartitionValue::LeafValue => leaf.value,
	};
	Region {
		rectangle,
		purity,
		value,
	}
}

#[cfg(test)]
use crate::{fixtures, Branch};

#[cfg(test)]
fn names() -> Vec<String> {
	vec!["x".to_owned(), "y".to_owned()]
}

#[cfg(test)]
fn assert_tiles(bounds: Rectangle, regions: &[Region]) {
	let area: f64 = regions.iter().map(|region| region.rectangle.area()).sum();
	assert!((area - bounds.area()).abs() < 1e-12);
	for region in regions {
		let r = region.rectangle;
		assert!(r.xmin >= bounds.xmin && r.xmax <= bounds.xmax);
		assert!(r.ymin >= bounds.ymin && r.ymax <= bounds.ymax);
		assert!(r.xmin <= r.xmax && r.ymin <= r.ymax);
	}
	for (i, a) in regions.iter().enumerate() {
		for b in &regions[i + 1..] {
			let (a, b) = (a.rectangle, b.rectangle);
			let overlap_x = a.xmax.min(b.xmax) - a.xmin.max(b.xmin);
			let overlap_y = a.ymax.min(b.ymax) - a.ymin.max(b.ymin);
			assert!(overlap_x <= 0.0 || overlap_y <= 0.0);
		}
	}
}

#[test]
fn test_partition() {
	let bounds = Rectangle::new(0.0, 1.0, 0.0, 1.0);
	let regions = partition(
		&fixtures::two_feature_tree(),
		&names(),
		bounds,
		PartitionValue::Purity,
	)
	.unwrap();
	assert_eq!(
		regions,
		vec![
			Region {
				rectangle: Rectangle::new(0.0, 0.5, 0.0, 0.25),
				purity: 0.7,
				value: 0.7,
			},
			Region {
				rectangle: Rectangle::new(0.0, 0.5, 0.25, 1.0),
				purity: 1.0,
				value: 1.0,
			},
			Region {
				rectangle: Rectangle::new(0.5, 1.0, 0.0, 1.0),
				purity: 0.2,
				value: 0.2,
			},
		]
	);
	assert_tiles(bounds, &regions);
	let values: Vec<f64> = partition(
		&fixtures::two_feature_tree(),
		&names(),
		bounds,
		PartitionValue::LeafValue,
	)
	.unwrap()
	.iter()
	.map(|region| region.value)
	.collect();
	assert_eq!(values, vec![1.0, 1.0, -1.0]);
}

#[test]
fn test_partition_siblings_get_independent_bounds() {
	use crate::fixtures::{leaf, split};
	// Both subtrees split on x again, so a bound leaking from the left call would shift the right regions.
	let tree = split(
		Branch::Root,
		"x",
		0.0,
		split(
			Branch::Left,
			"x",
			-5.0,
			leaf(Branch::Left, 1.0, 0.0, -1.0),
			leaf(Branch::Right, 1.0, 1.0, 1.0),
		),
		split(
			Branch::Right,
			"y",
			2.0,
			leaf(Branch::Left, 0.0, 0.0, -1.0),
			split(
				Branch::Right,
				"x",
				5.0,
				leaf(Branch::Left, 3.0, 1.0, -1.0),
				leaf(Branch::Right, 1.0, 3.0, 1.0),
			),
		),
	);
	let bounds = Rectangle::new(-10.0, 10.0, -4.0, 4.0);
	let regions = partition(&tree, &names(), bounds, PartitionValue::Purity).unwrap();
	let rectangles: Vec<Rectangle> = regions.iter().map(|region| region.rectangle).collect();
	assert_eq!(
		rectangles,
		vec![
			Rectangle::new(-10.0, -5.0, -4.0, 4.0),
			Rectangle::new(-5.0, 0.0, -4.0, 4.0),
			Rectangle::new(0.0, 10.0, -4.0, 2.0),
			Rectangle::new(0.0, 5.0, 2.0, 4.0),
			Rectangle::new(5.0, 10.0, 2.0, 4.0),
		]
	);
	assert_tiles(bounds, &regions);
	for region in &regions {
		assert!(region.purity >= 0.0 && region.purity <= 1.0);
	}
	assert_eq!(regions[2].purity, 0.0);
}

#[test]
fn test_partition_threshold_outside_bounds() {
	let bounds = Rectangle::new(0.0, 1.0, 0.0, 1.0);
	let tree = fixtures::split(
		Branch::Root,
		"x",
		3.0,
		fixtures::leaf(Branch::Left, 1.0, 1.0, 1.0),
		fixtures::leaf(Branch::Right, 1.0, 1.0, 1.0),
	);
	let regions = partition(&tree, &names(), bounds, PartitionValue::Purity).unwrap();
	assert_eq!(regions[0].rectangle, bounds);
	assert_eq!(regions[1].rectangle.area(), 0.0);
	assert_tiles(bounds, &regions);
}

#[test]
fn test_partition_errors() {
	let bounds = Rectangle::new(0.0, 1.0, 0.0, 1.0);
	assert_eq!(
		partition(
			&fixtures::two_feature_tree(),
			&["x".to_owned(), "z".to_owned(), "y".to_owned()],
			bounds,
			PartitionValue::Purity,
		),
		Err(TraversalError::UnsupportedFeatureInPartition {
			feature: "y".to_owned()
		})
	);
	assert_eq!(
		partition(&fixtures::chain(999), &names(), bounds, PartitionValue::Purity)
			.unwrap()
			.len(),
		1000
	);
	assert_eq!(
		partition(&fixtures::chain(1000), &names(), bounds, PartitionValue::Purity),
		Err(TraversalError::NonTermination {
			limit: MAX_PARTITION_DEPTH
		})
	);
}

#[test]
fn test_corners() {
	let rectangle = Rectangle::new(1.0, 2.0, 3.0, 4.0);
	assert_eq!(
		rectangle.corners(),
		[(1.0, 3.0), (1.0, 4.0), (2.0, 4.0), (2.0, 3.0)]
	);
	assert_eq!(rectangle.area(), 1.0);
}
