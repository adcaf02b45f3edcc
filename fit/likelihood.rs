use crate::data::Observations;
use crate::error::FitError;
use ndarray::prelude::*;
use proctree_core::{Assignment, CategoryFormula};

/// log(n!) computed as a sum of logarithms.
pub fn log_factorial(n: u64) -> f64 {
	(1..=n).map(|k| (k as f64).ln()).sum()
}

/// Evaluates every category formula under the assignment.
pub fn category_probabilities(
	formulae: &[CategoryFormula],
	assignment: &Assignment,
) -> Result<Array1<f64>, FitError> {
	let probabilities = formulae
		.iter()
		.map(|formula| formula.evaluate(assignment).map_err(FitError::from))
		.collect::<Result<Vec<f64>, FitError>>()?;
	Ok(Array1::from(probabilities))
}

/// The expected category counts, the probabilities scaled by the grand total.
pub fn predicted_counts(probabilities: &Array1<f64>, total: f64) -> Array1<f64> {
	probabilities * total
}

/**
The log-likelihood of the model given the observations, `Σ obs·log(p)` plus the multinomial normalizing term `log(N!) - Σ log(obs!)` unless factorials are ignored.

The factorial term is constant in the parameters, so ignoring it does not move the optimum; the optimizer does, the reported `LogLik` does not.
*/
pub fn log_likelihood(
	formulae: &[CategoryFormula],
	assignment: &Assignment,
	observations: &Observations,
	ignore_factorials: bool,
) -> Result<f64, FitError> {
	let probabilities = category_probabilities(formulae, assignment)?;
	check_shape(formulae.len(), observations)?;
	let mut llik = 0.0;
	for row in observations.rows().genrows() {
		for (formula, (&probability, &observed)) in formulae
			.iter()
			.zip(probabilities.iter().zip(row.iter()))
		{
			if observed == 0.0 {
				continue;
			}
			if probability <= 0.0 {
				return Err(FitError::Domain {
					category: formula.category.clone(),
					probability,
					observed,
				});
			}
			llik += observed * probability.ln();
		}
	}
	if !ignore_factorials {
		let observed_factorials: f64 = observations
			.rows()
			.iter()
			.map(|&observed| log_factorial(observed.round() as u64))
			.sum();
		llik += log_factorial(observations.total().round() as u64) - observed_factorials;
	}
	Ok(llik)
}

/// The root-mean-squared error between the predicted counts and the observed cells.
pub fn rmse(probabilities: &Array1<f64>, observations: &Observations) -> f64 {
	let predicted = predicted_counts(probabilities, observations.total());
	let mut sum_squared_error = 0.0;
	let mut n_cells = 0;
	for row in observations.rows().genrows() {
		for (&prediction, &observed) in predicted.iter().zip(row.iter()) {
			sum_squared_error += (prediction - observed) * (prediction - observed);
			n_cells += 1;
		}
	}
	(sum_squared_error / n_cells as f64).sqrt()
}

/// The RMSE adjusted for the degrees of freedom consumed by the free parameters, falling back to the plain denominator when none remain.
pub fn adjusted_rmse(
	probabilities: &Array1<f64>,
	observations: &Observations,
	n_free_parameters: usize,
) -> f64 {
	let predicted = predicted_counts(probabilities, observations.total());
	let mut sum_squared_error = 0.0;
	let mut n_cells = 0;
	for row in observations.rows().genrows() {
		for (&prediction, &observed) in predicted.iter().zip(row.iter()) {
			sum_squared_error += (prediction - observed) * (prediction - observed);
			n_cells += 1;
		}
	}
	let denominator = if n_cells > n_free_parameters + 1 {
		n_cells - n_free_parameters
	} else {
		n_cells
	};
	(sum_squared_error / denominator as f64).sqrt()
}

/// The likelihood-ratio goodness of fit, `2·Σ obs·log(obs/predicted)` over the per-category totals. Categories without observations contribute zero.
pub fn g_squared(
	probabilities: &Array1<f64>,
	observations: &Observations,
) -> Result<f64, FitError> {
	let column_sums = observations.column_sums();
	let predicted = predicted_counts(probabilities, observations.total());
	let mut g2 = 0.0;
	for (index, (&observed, &prediction)) in column_sums.iter().zip(predicted.iter()).enumerate() {
		if observed == 0.0 {
			continue;
		}
		if prediction <= 0.0 {
			return Err(FitError::Domain {
				category: index.to_string(),
				probability: prediction,
				observed,
			});
		}
		g2 += observed * (observed / prediction).ln();
	}
	Ok(2.0 * g2)
}

fn check_shape(n_formulae: usize, observations: &Observations) -> Result<(), FitError> {
	if n_formulae != observations.n_categories() {
		return Err(FitError::ShapeMismatch {
			formulae: n_formulae,
			columns: observations.n_categories(),
		});
	}
	Ok(())
}

#[cfg(test)]
fn retrieval_formulae() -> Vec<CategoryFormula> {
	let lines = [
		"do + (1 - do) * g",
		"(1 - do) * (1 - g)",
		"(1 - dn) * g",
		"dn + (1 - dn) * (1 - g)",
	];
	lines
		.iter()
		.enumerate()
		.map(|(index, line)| CategoryFormula {
			category: index.to_string(),
			branches: proctree_core::parse_branches(line).unwrap(),
		})
		.collect()
}

#[test]
fn test_log_factorial() {
	assert!(log_factorial(0).abs() < 1e-12);
	assert!(log_factorial(1).abs() < 1e-12);
	assert!((log_factorial(10) - 15.1044).abs() < 1e-4);
}

#[test]
fn test_log_likelihood() {
	use maplit::btreemap;
	let formulae = retrieval_formulae();
	let assignment = btreemap! {
		"do".to_owned() => 0.2,
		"dn".to_owned() => 0.4,
		"g".to_owned() => 0.5,
	};
	let observations = Observations::from_counts(&[15.0, 5.0, 3.0, 10.0]);
	let llik = log_likelihood(&formulae, &assignment, &observations, false).unwrap();
	assert!((llik - 16.0490).abs() < 1e-3);
	let llik_r = log_likelihood(&formulae, &assignment, &observations, true).unwrap();
	assert!((llik_r + 19.4225).abs() < 1e-3);
}

#[test]
fn test_log_likelihood_domain_error() {
	use maplit::btreemap;
	let formulae = vec![CategoryFormula {
		category: "0".to_owned(),
		branches: proctree_core::parse_branches("a").unwrap(),
	}];
	let assignment = btreemap! { "a".to_owned() => 0.0 };
	let observations = Observations::from_counts(&[3.0]);
	assert!(matches!(
		log_likelihood(&formulae, &assignment, &observations, true),
		Err(FitError::Domain { .. })
	));
}

#[test]
fn test_rmse_and_g_squared() {
	use maplit::btreemap;
	let formulae = vec![
		CategoryFormula {
			category: "0".to_owned(),
			branches: proctree_core::parse_branches("a").unwrap(),
		},
		CategoryFormula {
			category: "1".to_owned(),
			branches: proctree_core::parse_branches("(1-a)").unwrap(),
		},
	];
	let observations = Observations::from_counts(&[20.0, 10.0]);
	let assignment = btreemap! { "a".to_owned() => 0.5 };
	let probabilities = category_probabilities(&formulae, &assignment).unwrap();
	assert!((rmse(&probabilities, &observations) - 5.0).abs() < 1e-12);
	let exact = btreemap! { "a".to_owned() => 20.0 / 30.0 };
	let probabilities = category_probabilities(&formulae, &exact).unwrap();
	assert!(rmse(&probabilities, &observations).abs() < 1e-9);
	assert!(g_squared(&probabilities, &observations).unwrap().abs() < 1e-9);
}
