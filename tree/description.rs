use crate::Error;
use std::path::Path;

/// A `ModelDescription` is what a training library hands over for a fitted ensemble: the names of the features, the weight of each tree, and the exported text of each tree.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelDescription {
	pub feature_names: Vec<String>,
	pub weights: Vec<f64>,
	pub trees: Vec<String>,
}

impl ModelDescription {
	/// Read a description from a yaml file if the extension is `yaml` or `yml`, and from a json file otherwise.
	pub fn from_path(path: &Path) -> Result<Self, Error> {
		let contents = std::fs::read_to_string(path)?;
		match path.extension().and_then(|extension| extension.to_str()) {
			Some("yaml") | Some("yml") => Self::from_yaml(&contents),
			_ => Self::from_json(&contents),
		}
	}

	pub fn from_json(json: &str) -> Result<Self, Error> {
		Ok(serde_json::from_str(json)?)
	}

	pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
		Ok(serde_yaml::from_str(yaml)?)
	}
}

#[test]
fn test_from_json() {
	let json = r#"{
		"feature_names": ["x", "y"],
		"weights": [0.5],
		"trees": ["|--- x <= 0.50000\n|   |--- weights: [3.00000, 7.00000] class: 1\n"]
	}"#;
	let description = ModelDescription::from_json(json).unwrap();
	assert_eq!(description.feature_names, vec!["x", "y"]);
	assert_eq!(description.weights, vec![0.5]);
	assert!(description.trees[0].starts_with("|--- x <= 0.50000\n"));
	assert!(matches!(
		ModelDescription::from_json("{\"weights\": []}"),
		Err(Error::Json(_))
	));
}

#[test]
fn test_from_yaml() {
	let yaml = "\
feature_names: [x, y]
weights: [0.25, 0.75]
trees:
  - |
    |--- x <= 0.50000
    |   |--- weights: [3.00000, 7.00000] class: 1
    |--- x >  0.50000
    |   |--- weights: [8.00000, 2.00000] class: -1
  - |
    |--- y <= 1.00000
    |   |--- weights: [1.00000, 0.00000] class: -1
    |--- y >  1.00000
    |   |--- weights: [0.00000, 1.00000] class: 1
";
	let description = ModelDescription::from_yaml(yaml).unwrap();
	assert_eq!(description.trees.len(), 2);
	assert_eq!(
		description.trees[1].lines().next(),
		Some("|--- y <= 1.00000")
	);
	let ensemble =
		crate::Ensemble::from_description(&description, &crate::DecodeOptions::default()).unwrap();
	assert_eq!(ensemble.weight(1), Some(0.75));
}
