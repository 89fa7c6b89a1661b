/*!
This crate provides the inputs that a tree ensemble is scored against. A single example is anything that implements [`Row`], which looks up a feature value by name. A batch of examples is usually a [`DataFrame`], a set of named number columns of equal length, which can be loaded from a csv file.
*/

use std::collections::{BTreeMap, HashMap};

pub mod load;

pub use self::load::*;

/// A `Row` is a single example. Trees look up the value of the feature they split on by name.
pub trait Row {
	fn get(&self, feature_name: &str) -> Option<f64>;
}

impl Row for HashMap<String, f64> {
	fn get(&self, feature_name: &str) -> Option<f64> {
		HashMap::get(self, feature_name).copied()
	}
}

impl Row for BTreeMap<String, f64> {
	fn get(&self, feature_name: &str) -> Option<f64> {
		BTreeMap::get(self, feature_name).copied()
	}
}

impl<'a, R> Row for &'a R
where
	R: Row + ?Sized,
{
	fn get(&self, feature_name: &str) -> Option<f64> {
		(**self).get(feature_name)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
	pub columns: Vec<NumberColumn>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberColumn {
	pub name: String,
	pub data: Vec<f64>,
}

/// A `DataFrameRow` borrows the values at one row index of a [`DataFrame`].
#[derive(Debug, Clone, Copy)]
pub struct DataFrameRow<'a> {
	dataframe: &'a DataFrame,
	index: usize,
}

impl DataFrame {
	pub fn new(column_names: Vec<String>) -> Self {
		let columns = column_names.into_iter().map(NumberColumn::new).collect();
		Self { columns }
	}

	pub fn ncols(&self) -> usize {
		self.columns.len()
	}

	pub fn nrows(&self) -> usize {
		self.columns.first().map(|column| column.data.len()).unwrap_or(0)
	}

	pub fn column(&self, name: &str) -> Option<&NumberColumn> {
		self.columns.iter().find(|column| column.name == name)
	}

	/// Retrieve the row at `index`, or `None` if the dataframe has fewer rows.
	pub fn row(&self, index: usize) -> Option<DataFrameRow<'_>> {
		if index < self.nrows() {
			Some(DataFrameRow {
				dataframe: self,
				index,
			})
		} else {
			None
		}
	}

	pub fn rows(&self) -> impl Iterator<Item = DataFrameRow<'_>> + '_ {
		(0..self.nrows()).map(move |index| DataFrameRow {
			dataframe: self,
			index,
		})
	}
}

impl NumberColumn {
	pub fn new(name: String) -> Self {
		Self {
			name,
			data: Vec::new(),
		}
	}
}

impl<'a> Row for DataFrameRow<'a> {
	fn get(&self, feature_name: &str) -> Option<f64> {
		self.dataframe
			.column(feature_name)
			.and_then(|column| column.data.get(self.index))
			.copied()
	}
}

#[cfg(test)]
fn dataframe() -> DataFrame {
	let mut dataframe = DataFrame::new(vec!["x".to_owned(), "y".to_owned()]);
	dataframe.columns[0].data = vec![0.1, 0.2, 0.3];
	dataframe.columns[1].data = vec![1.0, 2.0, 3.0];
	dataframe
}

#[test]
fn test_row_lookup() {
	let dataframe = dataframe();
	assert_eq!(dataframe.nrows(), 3);
	assert_eq!(dataframe.ncols(), 2);
	let row = dataframe.row(1).unwrap();
	assert_eq!(row.get("x"), Some(0.2));
	assert_eq!(row.get("y"), Some(2.0));
	assert_eq!(row.get("z"), None);
	assert!(dataframe.row(3).is_none());
	let xs: Vec<f64> = dataframe.rows().map(|row| row.get("x").unwrap()).collect();
	assert_eq!(xs, vec![0.1, 0.2, 0.3]);
}

#[test]
fn test_map_rows() {
	let mut row = HashMap::new();
	row.insert("x".to_owned(), 0.5);
	assert_eq!(Row::get(&row, "x"), Some(0.5));
	assert_eq!(Row::get(&row, "y"), None);
	let row: BTreeMap<String, f64> = vec![("y".to_owned(), -1.0)].into_iter().collect();
	assert_eq!(Row::get(&&row, "y"), Some(-1.0));
}
