use super::*;
use std::path::Path;
use thiserror::Error;

/// These values are read as NaN rather than rejected.
const DEFAULT_INVALID_VALUES: &[&str] = &[
	"", "null", "NULL", "n/a", "N/A", "nan", "-nan", "NaN", "-NaN", "?",
];

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Csv(#[from] csv::Error),
	#[error("record {record}: column \"{column}\" has a value that is not a number: \"{value}\"")]
	ParseNumber {
		record: u64,
		column: String,
		value: String,
	},
	#[error("record {record} has {found} values but the header has {expected} columns")]
	RaggedRecord {
		record: u64,
		expected: usize,
		found: usize,
	},
}

impl DataFrame {
	pub fn from_path(path: &Path) -> Result<Self, Error> {
		Self::from_csv(&mut csv::Reader::from_path(path)?)
	}

	/// Read a dataframe from a csv with a header row. Every column is read as a number column.
	pub fn from_csv<R>(reader: &mut csv::Reader<R>) -> Result<Self, Error>
	where
		R: std::io::Read,
	{
		let column_names: Vec<String> = reader
			.headers()?
			.into_iter()
			.map(|column_name| column_name.trim().to_owned())
			.collect();
		let mut dataframe = DataFrame::new(column_names);
		let mut record = csv::StringRecord::new();
		let mut record_index = 0;
		let expected = dataframe.ncols();
		let ragged_record = |record: u64, found: usize| Error::RaggedRecord {
			record,
			expected,
			found,
		};
		loop {
			match reader.read_record(&mut record) {
				Ok(true) => {}
				Ok(false) => break,
				Err(error) => {
					if let csv::ErrorKind::UnequalLengths { len, .. } = error.kind() {
						return Err(ragged_record(record_index + 1, *len as usize));
					}
					return Err(error.into());
				}
			}
			record_index += 1;
			// Flexible readers hand back short and long records instead of failing.
			if record.len() != expected {
				return Err(ragged_record(record_index, record.len()));
			}
			for (column, value) in dataframe.columns.iter_mut().zip(record.iter()) {
				let value = value.trim();
				let value = if DEFAULT_INVALID_VALUES.contains(&value) {
					std::f64::NAN
				} else {
					lexical::parse::<f64, _>(value).map_err(|_| Error::ParseNumber {
						record: record_index,
						column: column.name.clone(),
						value: value.to_owned(),
					})?
				};
				column.data.push(value);
			}
		}
		Ok(dataframe)
	}
}

#[test]
fn test_from_csv() {
	let csv = "x,y\n0.5,1\n-2.25, 3e2\n,nan\n";
	let dataframe = DataFrame::from_csv(&mut csv::Reader::from_reader(csv.as_bytes())).unwrap();
	assert_eq!(dataframe.nrows(), 3);
	assert_eq!(dataframe.column("x").unwrap().data[..2], [0.5, -2.25]);
	assert_eq!(dataframe.column("y").unwrap().data[..2], [1.0, 300.0]);
	assert!(dataframe.column("x").unwrap().data[2].is_nan());
	assert!(dataframe.column("y").unwrap().data[2].is_nan());
}

#[test]
fn test_from_csv_errors() {
	let csv = "x,y\n0.5,1\n0.7,signal\n";
	let error = DataFrame::from_csv(&mut csv::Reader::from_reader(csv.as_bytes())).unwrap_err();
	insta::assert_snapshot!(error.to_string(), @r###"record 2: column "y" has a value that is not a number: "signal""###);
	let csv = "x,y\n0.5,1\n0.7\n";
	let error = DataFrame::from_csv(&mut csv::Reader::from_reader(csv.as_bytes())).unwrap_err();
	insta::assert_snapshot!(error.to_string(), @r###"record 2 has 1 values but the header has 2 columns"###);
	let csv = "x,y\n0.5,1,2\n";
	let mut reader = csv::ReaderBuilder::new()
		.flexible(true)
		.from_reader(csv.as_bytes());
	let error = DataFrame::from_csv(&mut reader).unwrap_err();
	assert!(matches!(
		error,
		Error::RaggedRecord {
			record: 1,
			expected: 2,
			found: 3
		}
	));
}
