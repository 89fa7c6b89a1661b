use crate::{BranchNode, Class, LeafNode, Node, TruncatedNode};
use colored::{ColoredString, Colorize};
use std::fmt;

#[derive(Clone, Debug, Default)]
pub struct PrintOptions {
	/// If true, the class of each leaf is highlighted, signal in blue and background in red.
	pub color: bool,
}

/// A `TreeDump` displays one tree, one line per node in depth first order, left before right. Each level of depth indents a line by `--`.
pub struct TreeDump<'a> {
	pub tree_index: usize,
	pub weight: f64,
	pub tree: &'a Node,
	pub options: &'a PrintOptions,
}

impl<'a> fmt::Display for TreeDump<'a> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f)?;
		writeln!(
			f,
			"tree number {}\tweight = {:10.3e}",
			self.tree_index, self.weight
		)?;
		// Walk with an explicit stack, pushing the right child first so the left child is printed first.
		let mut stack = vec![(self.tree, 0)];
		while let Some((node, depth)) = stack.pop() {
			let indent = "--".repeat(depth);
			match node {
				Node::Branch(BranchNode {
					branch,
					feature,
					threshold,
					left,
					right,
				}) => {
					writeln!(
						f,
						"  {} {:<5} {:>10} {:>10.2}",
						indent, branch, feature, threshold
					)?;
					stack.push((right.as_ref(), depth + 1));
					stack.push((left.as_ref(), depth + 1));
				}
				Node::Leaf(leaf) => {
					let LeafNode {
						branch,
						background_weight,
						signal_weight,
						value,
					} = leaf;
					writeln!(
						f,
						"  {} {:<5} {:>10} {:>10.2e} {:>10.2e} {:>10.2}",
						indent,
						branch,
						self.class_tag(leaf.class()),
						background_weight,
						signal_weight,
						value
					)?;
				}
				Node::Truncated(TruncatedNode { branch }) => {
					writeln!(f, "  {} {:<5} {:>10}", indent, branch, "...")?;
				}
			}
		}
		Ok(())
	}
}

impl<'a> TreeDump<'a> {
	fn class_tag(&self, class: Class) -> ColoredString {
		match (class, self.options.color) {
			(Class::Signal, true) => "SIG".blue().bold(),
			(Class::Background, true) => "BKG".red().bold(),
			(Class::Signal, false) => "SIG".normal(),
			(Class::Background, false) => "BKG".normal(),
		}
	}
}

#[cfg(test)]
use crate::{fixtures, Branch};

#[test]
fn test_dump() {
	let tree = fixtures::two_feature_tree();
	let options = PrintOptions::default();
	let dump = TreeDump {
		tree_index: 3,
		weight: 0.5,
		tree: &tree,
		options: &options,
	};
	let lines: Vec<String> = dump
		.to_string()
		.lines()
		.map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
		.collect();
	assert_eq!(
		lines,
		vec![
			"",
			"tree number 3 weight = 5.000e-1",
			"ROOT x 0.50",
			"-- LEFT y 0.25",
			"---- LEFT SIG 3.00e0 7.00e0 1.00",
			"---- RIGHT SIG 0.00e0 4.00e0 1.00",
			"-- RIGHT BKG 8.00e0 2.00e0 -1.00",
		]
	);
}

#[test]
fn test_dump_columns() {
	let tree = fixtures::split(
		Branch::Root,
		"x",
		0.5,
		Node::Truncated(TruncatedNode {
			branch: Branch::Left,
		}),
		fixtures::leaf(Branch::Right, 8.0, 2.0, -1.0),
	);
	let options = PrintOptions::default();
	let dump = TreeDump {
		tree_index: 0,
		weight: 1.0,
		tree: &tree,
		options: &options,
	};
	insta::assert_snapshot!(dump.to_string().trim_start().replace('\t', "<TAB>"), @r###"
tree number 0<TAB>weight =    1.000e0
   ROOT           x       0.50
  -- LEFT         ...
  -- RIGHT        BKG     8.00e0     2.00e0      -1.00
"###);
}
