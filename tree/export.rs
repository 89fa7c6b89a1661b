/*!
This module decodes the text that tree learners print to describe a fitted decision tree. Each line is one node of a depth first walk. Nesting is shown by a `|   ` prefix per level, a branch prints one line for each of its two sides, and a leaf prints its class weights and its class:

```text
|--- x <= 0.50000
|   |--- weights: [3.00000, 7.00000] class: 1
|--- x >  0.50000
|   |--- weights: [8.00000, 2.00000] class: -1
```

There is no punctuation that encloses a subtree. Instead, the line that opens the right side of a branch repeats the branch's feature at the branch's own indentation, so the text after a branch line splits into the left subtree and the right subtree at the first later line with the same prefix.
*/

use crate::{Branch, BranchNode, LeafNode, Node, TruncatedNode};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Every line of normalized text starts with this character.
pub const LINE_START: char = '\u{2}';
/// Every line of normalized text ends with this character.
pub const LINE_END: char = '\u{3}';
const DEPTH_MARKER: char = '|';
const DEPTH_DELIMITER: &str = "/";

static LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\x02[^\x03]*\x03").unwrap());
// A leaf or truncation marker occupies exactly one line, so nothing in these patterns may cross a `LINE_END`.
static LEAF: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^\x02[/ -]+?weights:[^\x03]*?class:[^\x03]*\x03").unwrap());
static TRUNCATED: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^\x02[/ -]+?truncated branch[^\x03]*\x03").unwrap());
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?[0-9]+\.?[0-9]*").unwrap());

#[derive(Clone, Debug)]
pub struct DecodeOptions {
	/// Branches deeper than this are not decoded and are replaced with a truncated marker.
	pub max_depth: usize,
}

impl Default for DecodeOptions {
	fn default() -> Self {
		Self { max_depth: 100 }
	}
}

#[derive(Debug, Error, PartialEq)]
pub enum ExportError {
	#[error("no node line found in \"{excerpt}\"")]
	NoLine { excerpt: String },
	#[error("no line opens the right branch of \"{feature}\" in \"{excerpt}\"")]
	NoBoundary { feature: String, excerpt: String },
	#[error("cannot read a feature, \"<=\" and a threshold from \"{line}\"")]
	BadNodeLine { line: String },
	#[error("split feature \"{feature}\" is not one of the model's features")]
	UnknownFeature { feature: String },
	#[error("expected 3 numbers in a leaf but found {count} in \"{excerpt}\"")]
	LeafNumbers { count: usize, excerpt: String },
}

/// Decode the text of one exported tree into its root node.
pub fn parse_exported_tree(
	text: &str,
	feature_names: &[String],
	options: &DecodeOptions,
) -> Result<Node, ExportError> {
	let rules = normalize(skip_blank_lines(text));
	let decoder = Decoder {
		feature_names,
		max_depth: options.max_depth,
	};
	// A tree without splits prints as a single leaf line.
	if let Some(leaf) = decode_leaf(&rules, Branch::Root)? {
		return Ok(leaf);
	}
	decoder.decode(&rules, Branch::Root, 0)
}

/// Wrap every line in `LINE_START` and `LINE_END` and replace the depth marker, so lines can be found with anchored regexes.
pub fn normalize(text: &str) -> String {
	let mut rules = String::with_capacity(text.len() + 64);
	for line in text.split('\n') {
		rules.push(LINE_START);
		rules.push_str(&line.trim_end_matches('\r').replace(DEPTH_MARKER, DEPTH_DELIMITER));
		rules.push(LINE_END);
	}
	rules
}

/// Text embedded in a model description often starts with a line break.
fn skip_blank_lines(text: &str) -> &str {
	let mut text = text;
	while let Some((line, rest)) = text.split_once('\n') {
		if !line.trim().is_empty() {
			break;
		}
		text = rest;
	}
	text
}

struct Decoder<'a> {
	feature_names: &'a [String],
	max_depth: usize,
}

impl<'a> Decoder<'a> {
	fn decode(&self, rules: &str, branch: Branch, depth: usize) -> Result<Node, ExportError> {
		// The first line holds this node's feature and threshold.
		let line = LINE
			.find(rules)
			.ok_or_else(|| ExportError::NoLine {
				excerpt: excerpt(rules),
			})?
			.as_str();
		let rules = &rules[line.len()..];
		let (prefix, feature, threshold) = self.node_line(line)?;
		tracing::debug!(%branch, depth, feature = feature.as_str(), threshold, "decoded branch");
		let (left, right) =
			split_at_boundary(rules, prefix).ok_or_else(|| ExportError::NoBoundary {
				feature: feature.clone(),
				excerpt: excerpt(rules),
			})?;
		let left = self.decode_child(left, Branch::Left, depth + 1)?;
		let right = self.decode_child(right, Branch::Right, depth + 1)?;
		Ok(Node::Branch(BranchNode {
			branch,
			feature,
			threshold,
			left: Box::new(left),
			right: Box::new(right),
		}))
	}

	fn decode_child(&self, rules: &str, branch: Branch, depth: usize) -> Result<Node, ExportError> {
		if let Some(leaf) = decode_leaf(rules, branch)? {
			return Ok(leaf);
		}
		if TRUNCATED.is_match(rules) {
			tracing::debug!(%branch, depth, "exporter truncated branch");
			return Ok(Node::Truncated(TruncatedNode { branch }));
		}
		if depth > self.max_depth {
			tracing::warn!(%branch, depth, max_depth = self.max_depth, "stopped decoding at the depth limit");
			return Ok(Node::Truncated(TruncatedNode { branch }));
		}
		self.decode(rules, branch, depth)
	}

	/// Read `<feature> <= <threshold>` from a node line. The returned prefix is the line up to the operator, which the line opening the right branch shares.
	fn node_line<'l>(&self, line: &'l str) -> Result<(&'l str, String, f64), ExportError> {
		let bad_node_line = || ExportError::BadNodeLine {
			line: denormalize(line),
		};
		let content = line.trim_start_matches(LINE_START).trim_end_matches(LINE_END);
		let (_, node) = content.split_once("---").ok_or_else(bad_node_line)?;
		let tokens: Vec<&str> = node.split_whitespace().collect();
		let (feature, threshold) = match tokens.as_slice() {
			[feature, "<=", threshold] => (*feature, *threshold),
			_ => return Err(bad_node_line()),
		};
		let threshold: f64 = threshold.parse().map_err(|_| bad_node_line())?;
		// Names are compared after the same substitution the normalizer applied to the text.
		let feature = self
			.feature_names
			.iter()
			.find(|name| name.replace(DEPTH_MARKER, DEPTH_DELIMITER) == feature)
			.ok_or_else(|| ExportError::UnknownFeature {
				feature: feature.to_owned(),
			})?;
		let prefix_len = line.find("<=").ok_or_else(bad_node_line)?;
		Ok((&line[..prefix_len], feature.clone(), threshold))
	}
}

/// Decode `rules` as a leaf if its first line is a leaf line.
fn decode_leaf(rules: &str, branch: Branch) -> Result<Option<Node>, ExportError> {
	let line = match LEAF.find(rules) {
		Some(line) => line.as_str(),
		None => return Ok(None),
	};
	let numbers: Vec<&str> = NUMBER.find_iter(line).map(|m| m.as_str()).collect();
	let leaf_numbers = || ExportError::LeafNumbers {
		count: numbers.len(),
		excerpt: excerpt(line),
	};
	let (background_weight, signal_weight, value) = match numbers.as_slice() {
		[background_weight, signal_weight, value] => (
			background_weight.parse::<f64>().map_err(|_| leaf_numbers())?,
			signal_weight.parse::<f64>().map_err(|_| leaf_numbers())?,
			value.parse::<f64>().map_err(|_| leaf_numbers())?,
		),
		_ => return Err(leaf_numbers()),
	};
	tracing::debug!(%branch, background_weight, signal_weight, value, "decoded leaf");
	Ok(Some(Node::Leaf(LeafNode {
		branch,
		background_weight,
		signal_weight,
		value,
	})))
}

/// Split `rules` around the first whole line starting with `prefix`, dropping that line.
fn split_at_boundary<'r>(rules: &'r str, prefix: &str) -> Option<(&'r str, &'r str)> {
	let start = rules.find(prefix)?;
	let end = start + rules[start..].find(LINE_END)? + LINE_END.len_utf8();
	Some((&rules[..start], &rules[end..]))
}

fn denormalize(rules: &str) -> String {
	let text: String = rules
		.chars()
		.filter(|c| *c != LINE_START)
		.map(|c| if c == LINE_END { '\n' } else { c })
		.collect();
	text.trim_end().to_owned()
}

fn excerpt(rules: &str) -> String {
	const MAX_CHARS: usize = 120;
	let text = denormalize(rules);
	if text.chars().count() > MAX_CHARS {
		let mut text: String = text.chars().take(MAX_CHARS).collect();
		text.push_str("...");
		text
	} else {
		text
	}
}

#[cfg(test)]
fn names(names: &[&str]) -> Vec<String> {
	names.iter().map(|name| (*name).to_owned()).collect()
}

#[cfg(test)]
const STUMP: &str = "\
|--- x <= 0.50000
|   |--- weights: [3.00000, 7.00000] class: 1
|--- x >  0.50000
|   |--- weights: [8.00000, 2.00000] class: -1
";

#[cfg(test)]
const TWO_LEVELS: &str = "\
|--- x <= 0.50000
|   |--- y <= 0.25000
|   |   |--- weights: [3.00000, 7.00000] class: 1
|   |--- y >  0.25000
|   |   |--- weights: [0.00000, 4.00000] class: 1
|--- x >  0.50000
|   |--- x <= 0.75000
|   |   |--- weights: [5.00000, 1.00000] class: -1
|   |--- x >  0.75000
|   |   |--- weights: [8.00000, 2.00000] class: -1
";

#[test]
fn test_normalize() {
	let rules = normalize("|--- x <= 1\n|   |--- y\r\n");
	assert_eq!(
		rules,
		"\u{2}/--- x <= 1\u{3}\u{2}/   /--- y\u{3}\u{2}\u{3}".to_owned()
	);
	assert_eq!(denormalize(&rules), "/--- x <= 1\n/   /--- y");
}

#[test]
fn test_decode_stump() {
	let tree = parse_exported_tree(STUMP, &names(&["x", "y"]), &DecodeOptions::default()).unwrap();
	insta::assert_debug_snapshot!(tree, @r###"
Branch(
    BranchNode {
        branch: Root,
        feature: "x",
        threshold: 0.5,
        left: Leaf(
            LeafNode {
                branch: Left,
                background_weight: 3.0,
                signal_weight: 7.0,
                value: 1.0,
            },
        ),
        right: Leaf(
            LeafNode {
                branch: Right,
                background_weight: 8.0,
                signal_weight: 2.0,
                value: -1.0,
            },
        ),
    },
)
"###);
}

#[test]
fn test_decode_repeated_feature() {
	use crate::fixtures::{leaf, split};
	let tree =
		parse_exported_tree(TWO_LEVELS, &names(&["x", "y"]), &DecodeOptions::default()).unwrap();
	let expected = split(
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
		split(
			Branch::Right,
			"x",
			0.75,
			leaf(Branch::Left, 5.0, 1.0, -1.0),
			leaf(Branch::Right, 8.0, 2.0, -1.0),
		),
	);
	assert_eq!(tree, expected);
	// Decoding is deterministic.
	let again =
		parse_exported_tree(TWO_LEVELS, &names(&["x", "y"]), &DecodeOptions::default()).unwrap();
	assert_eq!(tree, again);
}

#[test]
fn test_decode_full_precision() {
	let text = "\
|--- feature_a <= -1.23457
|   |--- weights: [0.01234, 0.98766] class: 1
|--- feature_a >  -1.23457
|   |--- weights: [12.50000, 0.00000] class: -1
";
	let tree =
		parse_exported_tree(text, &names(&["feature_a"]), &DecodeOptions::default()).unwrap();
	let branch = match tree {
		Node::Branch(branch) => branch,
		_ => panic!("expected a branch"),
	};
	assert_eq!(branch.threshold, -1.23457);
	assert_eq!(
		*branch.left,
		Node::Leaf(LeafNode {
			branch: Branch::Left,
			background_weight: 0.01234,
			signal_weight: 0.98766,
			value: 1.0,
		})
	);
}

#[test]
fn test_decode_without_splits() {
	let text = "|--- weights: [3.00000, 7.00000] class: 1\n";
	let tree = parse_exported_tree(text, &names(&["x"]), &DecodeOptions::default()).unwrap();
	assert_eq!(tree, crate::fixtures::leaf(Branch::Root, 3.0, 7.0, 1.0));
}

#[test]
fn test_decode_keyword_feature_names() {
	use crate::fixtures::{leaf, split};
	let text = "\
|--- weights_total <= 0.50000
|   |--- weights: [3.00000, 7.00000] class: 1
|--- weights_total >  0.50000
|   |--- class_ratio <= 2.00000
|   |   |--- weights: [0.00000, 4.00000] class: 1
|   |--- class_ratio >  2.00000
|   |   |--- weights: [8.00000, 2.00000] class: -1
";
	let tree = parse_exported_tree(
		text,
		&names(&["weights_total", "class_ratio"]),
		&DecodeOptions::default(),
	)
	.unwrap();
	let expected = split(
		Branch::Root,
		"weights_total",
		0.5,
		leaf(Branch::Left, 3.0, 7.0, 1.0),
		split(
			Branch::Right,
			"class_ratio",
			2.0,
			leaf(Branch::Left, 0.0, 4.0, 1.0),
			leaf(Branch::Right, 8.0, 2.0, -1.0),
		),
	);
	assert_eq!(tree, expected);
}

#[test]
fn test_decode_leading_blank_lines() {
	let feature_names = names(&["x", "y"]);
	let options = DecodeOptions::default();
	let expected = parse_exported_tree(STUMP, &feature_names, &options).unwrap();
	let text = format!("\n  \r\n{}", STUMP);
	assert_eq!(
		parse_exported_tree(&text, &feature_names, &options),
		Ok(expected)
	);
	assert_eq!(skip_blank_lines("\n\n|--- x"), "|--- x");
	assert_eq!(skip_blank_lines(""), "");
}

#[test]
fn test_decode_truncated() {
	let text = "\
|--- x <= 0.50000
|   |--- truncated branch of depth 3
|--- x >  0.50000
|   |--- weights: [8.00000, 2.00000] class: -1
";
	let tree = parse_exported_tree(text, &names(&["x"]), &DecodeOptions::default()).unwrap();
	match tree {
		Node::Branch(branch) => {
			assert_eq!(
				*branch.left,
				Node::Truncated(TruncatedNode {
					branch: Branch::Left
				})
			);
			assert_eq!(branch.right.branch(), Branch::Right);
		}
		_ => panic!("expected a branch"),
	}
	// Branches below the depth limit are replaced, leaves are still read.
	let tree =
		parse_exported_tree(TWO_LEVELS, &names(&["x", "y"]), &DecodeOptions { max_depth: 0 })
			.unwrap();
	match tree {
		Node::Branch(branch) => {
			assert_eq!(
				*branch.left,
				Node::Truncated(TruncatedNode {
					branch: Branch::Left
				})
			);
			assert_eq!(
				*branch.right,
				Node::Truncated(TruncatedNode {
					branch: Branch::Right
				})
			);
		}
		_ => panic!("expected a branch"),
	}
	let tree =
		parse_exported_tree(STUMP, &names(&["x"]), &DecodeOptions { max_depth: 0 }).unwrap();
	assert_eq!(tree.n_leaves(), 2);
}

#[test]
fn test_decode_errors() {
	let feature_names = names(&["x", "y"]);
	let options = DecodeOptions::default();
	let text = "\
|--- x <= 0.50000
|   |--- weights: [3.00000, 7.00000, 1.00000] class: 1
|--- x >  0.50000
|   |--- weights: [8.00000, 2.00000] class: -1
";
	assert!(matches!(
		parse_exported_tree(text, &feature_names, &options),
		Err(ExportError::LeafNumbers { count: 4, .. })
	));
	let text = "\
|--- x <= 0.50000
|   |--- weights: [3.00000, 7.00000] class: 1
";
	assert!(matches!(
		parse_exported_tree(text, &feature_names, &options),
		Err(ExportError::NoBoundary { .. })
	));
	let text = "\
|--- x <= 0.50000
|--- x >  0.50000
|   |--- weights: [8.00000, 2.00000] class: -1
";
	assert!(matches!(
		parse_exported_tree(text, &feature_names, &options),
		Err(ExportError::NoLine { .. })
	));
	let text = STUMP.replace('x', "z");
	assert_eq!(
		parse_exported_tree(&text, &feature_names, &options),
		Err(ExportError::UnknownFeature {
			feature: "z".to_owned()
		})
	);
	let text = STUMP.replace("<=", ">=");
	assert_eq!(
		parse_exported_tree(&text, &feature_names, &options),
		Err(ExportError::BadNodeLine {
			line: "/--- x >= 0.50000".to_owned()
		})
	);
}

#[test]
fn test_error_message() {
	let text = "|--- x <= 0.50000\n|   |--- weights: [3.00000, 7.00000] class: 1\n";
	let error = parse_exported_tree(text, &names(&["x"]), &DecodeOptions::default()).unwrap_err();
	insta::assert_snapshot!(error.to_string(), @r###"
no line opens the right branch of "x" in "/   /--- weights: [3.00000, 7.00000] class: 1"
"###);
}
