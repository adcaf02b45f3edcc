use crate::error::FitError;
use ndarray::prelude::*;
use proctree_core::{Assignment, CategoryFormula};

/**
Pins every static mixture parameter to the empirical ratio of the observations it routes: the totals of the categories containing the bare parameter divided by the totals of all categories containing it in either sign.
*/
pub fn static_values(
	formulae: &[CategoryFormula],
	static_names: &[String],
	column_sums: &Array1<f64>,
) -> Result<Assignment, FitError> {
	let mut assignment = Assignment::new();
	for name in static_names {
		let mut pos_sum = 0.0;
		let mut neg_sum = 0.0;
		for (formula, &observed) in formulae.iter().zip(column_sums.iter()) {
			let occurrences = formula
				.branches
				.iter()
				.map(|branch| branch.count_occurrences(name));
			let (pos, neg) = occurrences.fold((0, 0), |(p, n), (bp, bn)| (p + bp, n + bn));
			if pos > 0 {
				pos_sum += observed;
			}
			if neg > 0 {
				neg_sum += observed;
			}
		}
		let total = pos_sum + neg_sum;
		if total == 0.0 {
			return Err(FitError::StaticParameter {
				parameter: name.clone(),
			});
		}
		assignment.insert(name.clone(), pos_sum / total);
	}
	Ok(assignment)
}

/// The observation totals of each subtree: consecutive column groups, one per subtree, sized by its category count.
pub fn subtree_totals(
	column_sums: &Array1<f64>,
	subtrees: &[Vec<String>],
) -> Result<Vec<f64>, FitError> {
	let n_columns: usize = subtrees.iter().map(Vec::len).sum();
	if n_columns != column_sums.len() {
		return Err(FitError::ShapeMismatch {
			formulae: n_columns,
			columns: column_sums.len(),
		});
	}
	let mut totals = Vec::with_capacity(subtrees.len());
	let mut index = 0;
	for subtree in subtrees {
		let total: f64 = column_sums.iter().skip(index).take(subtree.len()).sum();
		totals.push(total);
		index += subtree.len();
	}
	Ok(totals)
}

/**
The empirical mixture ratios of a joined tree, computed bottom-up over the subtree totals: at each split, the left half's share of the observations becomes the value of that split's `y` parameter.

The prefix numbering mirrors the joining recursion, so the returned names line up with the mixture parameters the join introduced.
*/
pub fn mixture_ratios(totals: &[f64]) -> Assignment {
	let mut ratios = Assignment::new();
	fill_ratios(totals, 0, &mut ratios);
	ratios
}

fn fill_ratios(totals: &[f64], prefix: usize, out: &mut Assignment) {
	if totals.len() <= 1 {
		return;
	}
	let (left, right) = totals.split_at(totals.len() / 2);
	let total: f64 = totals.iter().sum();
	let ratio = if total > 0.0 {
		left.iter().sum::<f64>() / total
	} else {
		0.0
	};
	out.insert(format!("y{}", prefix), ratio);
	fill_ratios(left, prefix + (totals.len() + 1) / 2, out);
	fill_ratios(right, prefix + 1, out);
}

#[cfg(test)]
use proctree_core::parse_easy;

#[test]
fn test_static_values_from_formulae() {
	let content = "\
Do + (1-Do) * G1
(1-Do) * (1-G1)

(1-Dn) * G1
Dn + (1-Dn) * (1-G1)

Do + (1-Do) * G2
(1-Do) * (1-G2)
";
	let mpt = parse_easy(content).unwrap();
	let formulae = mpt.formulae();
	let column_sums = Array1::from(vec![10.0, 10.0, 5.0, 5.0, 5.0, 5.0]);
	let values = static_values(&formulae, &mpt.static_parameters(), &column_sums).unwrap();
	assert!((values["y0"] - 0.5).abs() < 1e-12);
	assert!((values["y1"] - 0.5).abs() < 1e-12);
}

#[test]
fn test_subtree_totals_and_mixture_ratios() {
	let subtrees = vec![
		vec!["a".to_owned(), "b".to_owned()],
		vec!["c".to_owned(), "d".to_owned()],
		vec!["e".to_owned(), "f".to_owned()],
	];
	let column_sums = Array1::from(vec![12.0, 8.0, 6.0, 4.0, 7.0, 3.0]);
	let totals = subtree_totals(&column_sums, &subtrees).unwrap();
	assert_eq!(totals, vec![20.0, 10.0, 10.0]);
	let ratios = mixture_ratios(&totals);
	assert!((ratios["y0"] - 0.5).abs() < 1e-12);
	assert!((ratios["y1"] - 0.5).abs() < 1e-12);
	assert_eq!(ratios.len(), 2);
}

#[test]
fn test_mixture_ratio_numbering_matches_join() {
	// ten subtrees produce mixture parameters y0..y8 with y5 leading the left half
	let totals: Vec<f64> = (1..=10).map(|value| value as f64).collect();
	let ratios = mixture_ratios(&totals);
	let names: Vec<&str> = ratios.keys().map(String::as_str).collect();
	assert_eq!(
		names,
		vec!["y0", "y1", "y2", "y3", "y4", "y5", "y6", "y7", "y8"]
	);
	let grand_total: f64 = totals.iter().sum();
	assert!((ratios["y0"] - 15.0 / grand_total).abs() < 1e-12);
}
