use crate::error::FitError;
use ndarray::prelude::*;
use std::path::Path;

/**
An observation table: one row per independent dataset, one column per answer category, in the canonical category order of the model's formula list.

A file may start with header rows; these are marked by the sentinel value `-1` and are stripped on load.
*/
#[derive(Clone, Debug)]
pub struct Observations {
	rows: Array2<f64>,
}

impl Observations {
	pub fn new(rows: Array2<f64>) -> Self {
		Self { rows }
	}

	/// A single aggregated dataset.
	pub fn from_counts(counts: &[f64]) -> Self {
		let rows = Array2::from_shape_vec((1, counts.len()), counts.to_vec())
			.expect("a single row always has a consistent shape");
		Self { rows }
	}

	/// Reads a headerless csv file, stripping leading sentinel rows.
	pub fn from_path(path: &Path) -> Result<Self, FitError> {
		let mut reader = csv::ReaderBuilder::new()
			.has_headers(false)
			.trim(csv::Trim::All)
			.from_path(path)?;
		Self::from_csv(&mut reader)
	}

	pub fn from_csv<R>(reader: &mut csv::Reader<R>) -> Result<Self, FitError>
	where
		R: std::io::Read,
	{
		let mut records: Vec<Vec<f64>> = Vec::new();
		for record in reader.records() {
			let record = record?;
			let row = record
				.iter()
				.map(|field| {
					field.parse::<f64>().map_err(|_| FitError::InvalidNumber {
						value: field.to_owned(),
					})
				})
				.collect::<Result<Vec<f64>, FitError>>()?;
			records.push(row);
		}
		Self::from_records(records)
	}

	fn from_records(records: Vec<Vec<f64>>) -> Result<Self, FitError> {
		// leading rows containing the -1 sentinel are a header
		let skip = records
			.iter()
			.take_while(|row| row.iter().any(|value| *value == -1.0))
			.count();
		let records = &records[skip..];
		let n_rows = records.len();
		let n_columns = records.first().map(|row| row.len()).unwrap_or(0);
		if records.iter().any(|row| row.len() != n_columns) {
			return Err(FitError::RaggedData);
		}
		let flat: Vec<f64> = records.iter().flatten().copied().collect();
		let rows = Array2::from_shape_vec((n_rows, n_columns), flat)
			.map_err(|_| FitError::RaggedData)?;
		Ok(Self { rows })
	}

	pub fn rows(&self) -> ArrayView2<f64> {
		self.rows.view()
	}

	pub fn n_datasets(&self) -> usize {
		self.rows.nrows()
	}

	pub fn n_categories(&self) -> usize {
		self.rows.ncols()
	}

	/// The per-category totals across all datasets.
	pub fn column_sums(&self) -> Array1<f64> {
		self.rows.sum_axis(Axis(0))
	}

	/// The grand total of observations.
	pub fn total(&self) -> f64 {
		self.rows.sum()
	}
}

#[test]
fn test_from_counts() {
	let observations = Observations::from_counts(&[20.0, 10.0]);
	assert_eq!(observations.n_datasets(), 1);
	assert_eq!(observations.n_categories(), 2);
	assert_eq!(observations.total(), 30.0);
}

#[test]
fn test_header_rows_are_stripped() {
	let csv_text = "-1,-1,-1\n10,5,3\n12,4,2\n";
	let mut reader = csv::ReaderBuilder::new()
		.has_headers(false)
		.trim(csv::Trim::All)
		.from_reader(csv_text.as_bytes());
	let observations = Observations::from_csv(&mut reader).unwrap();
	assert_eq!(observations.n_datasets(), 2);
	assert_eq!(observations.column_sums().to_vec(), vec![22.0, 9.0, 5.0]);
	assert_eq!(observations.total(), 36.0);
}

#[test]
fn test_ragged_rows_are_rejected() {
	let csv_text = "1,2,3\n4,5\n";
	let mut reader = csv::ReaderBuilder::new()
		.has_headers(false)
		.flexible(true)
		.from_reader(csv_text.as_bytes());
	assert!(Observations::from_csv(&mut reader).is_err());
}
