use crate::data::Observations;
use crate::error::FitError;
use crate::likelihood::log_likelihood;
use fnv::FnvHashSet;
use proctree_core::{Assignment, BranchFormula, CategoryFormula};

/// The options controlling an EM run.
#[derive(Clone, Debug)]
pub struct EmOptions {
	/// The run converges when the log-likelihood changes by less than this between iterations.
	pub tolerance: f64,
	/// The iteration budget; the run stops unconverged when it is exhausted.
	pub max_iterations: usize,
	/// Parameters that keep their value through every maximization step, e.g. pinned mixture ratios.
	pub fixed_parameters: FnvHashSet<String>,
}

impl Default for EmOptions {
	fn default() -> Self {
		Self {
			tolerance: 1e-9,
			max_iterations: 10_000,
			fixed_parameters: FnvHashSet::default(),
		}
	}
}

/// The result of an EM run.
#[derive(Clone, Debug)]
pub struct EmOutcome {
	pub assignment: Assignment,
	/// The final log-likelihood, factorial terms ignored.
	pub log_likelihood: f64,
	pub iterations: usize,
	pub converged: bool,
}

/**
The expectation step: distributes every category's observed count over that category's branches in proportion to the branch probabilities under the current assignment. A branch with probability zero receives frequency zero.

The branch frequencies must sum to the observation total; a mismatch signals a derivation or numerical bug and aborts the run.
*/
pub fn estep(
	formulae: &[CategoryFormula],
	assignment: &Assignment,
	category_frequencies: &[f64],
) -> Result<Vec<f64>, FitError> {
	if formulae.len() != category_frequencies.len() {
		return Err(FitError::ShapeMismatch {
			formulae: formulae.len(),
			columns: category_frequencies.len(),
		});
	}
	let mut branch_frequencies = Vec::new();
	for (formula, &category_frequency) in formulae.iter().zip(category_frequencies.iter()) {
		let category_probability = formula.evaluate(assignment)?;
		for branch in formula.branches.iter() {
			let branch_probability = branch.evaluate(assignment)?;
			if branch_probability == 0.0 {
				branch_frequencies.push(0.0);
				continue;
			}
			if category_probability <= 0.0 {
				return Err(FitError::Domain {
					category: formula.category.clone(),
					probability: category_probability,
					observed: category_frequency,
				});
			}
			branch_frequencies.push(category_frequency * branch_probability / category_probability);
		}
	}
	let branch_sum: f64 = branch_frequencies.iter().sum();
	let observed_sum: f64 = category_frequencies.iter().sum();
	if (branch_sum - observed_sum).abs() > 1e-8 + 1e-5 * observed_sum.abs() {
		return Err(FitError::EmInconsistent {
			branch_sum,
			observed_sum,
		});
	}
	Ok(branch_frequencies)
}

/**
The maximization step: re-estimates every parameter as its positive occurrence mass over its total occurrence mass, both weighted by the branch frequencies of the expectation step.

A parameter without positive mass is estimated as exactly zero. Fixed parameters keep their previous value.
*/
pub fn mstep(
	formulae: &[CategoryFormula],
	assignment: &Assignment,
	branch_frequencies: &[f64],
	fixed_parameters: &FnvHashSet<String>,
) -> Assignment {
	let branches: Vec<&BranchFormula> = formulae
		.iter()
		.flat_map(|formula| formula.branches.iter())
		.collect();
	let mut new_assignment = Assignment::new();
	for (parameter, &previous) in assignment.iter() {
		if fixed_parameters.contains(parameter) {
			new_assignment.insert(parameter.clone(), previous);
			continue;
		}
		let mut positive_mass = 0.0;
		let mut total_mass = 0.0;
		for (branch, &frequency) in branches.iter().zip(branch_frequencies.iter()) {
			let (pos, neg) = branch.count_occurrences(parameter);
			positive_mass += pos as f64 * frequency;
			total_mass += (pos + neg) as f64 * frequency;
		}
		let estimate = if positive_mass == 0.0 {
			0.0
		} else {
			positive_mass / total_mass
		};
		new_assignment.insert(parameter.clone(), estimate);
	}
	new_assignment
}

/**
Runs the EM fixed point: alternating expectation and maximization steps until the log-likelihood change drops below the tolerance or the iteration budget is exhausted.
*/
pub fn run_em(
	formulae: &[CategoryFormula],
	initial: Assignment,
	observations: &Observations,
	options: &EmOptions,
) -> Result<EmOutcome, FitError> {
	let category_frequencies = observations.column_sums().to_vec();
	let mut assignment = initial;
	let mut last = log_likelihood(formulae, &assignment, observations, true)?;
	let mut iterations = 0;
	let mut converged = false;
	while iterations < options.max_iterations {
		let branch_frequencies = estep(formulae, &assignment, &category_frequencies)?;
		assignment = mstep(
			formulae,
			&assignment,
			&branch_frequencies,
			&options.fixed_parameters,
		);
		let llik = log_likelihood(formulae, &assignment, observations, true)?;
		iterations += 1;
		let done = (llik - last).abs() < options.tolerance;
		last = llik;
		if done {
			converged = true;
			break;
		}
	}
	Ok(EmOutcome {
		assignment,
		log_likelihood: last,
		iterations,
		converged,
	})
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

#[cfg(test)]
fn retrieval_assignment() -> Assignment {
	use maplit::btreemap;
	btreemap! {
		"g".to_owned() => 0.5,
		"do".to_owned() => 0.8,
		"dn".to_owned() => 0.7,
	}
}

#[test]
fn test_estep() {
	let formulae = retrieval_formulae();
	let frequencies = [10.0, 2.0, 3.0, 12.0];
	let branch_frequencies = estep(&formulae, &retrieval_assignment(), &frequencies).unwrap();
	let expected = [8.8889, 1.1111, 2.0, 3.0, 9.8824, 2.1176];
	assert_eq!(branch_frequencies.len(), expected.len());
	for (computed, expected) in branch_frequencies.iter().zip(expected.iter()) {
		assert!((computed - expected).abs() < 1e-4);
	}
	let total: f64 = branch_frequencies.iter().sum();
	assert!((total - 27.0).abs() < 1e-9);
}

#[test]
fn test_estep_frequencies_sum_to_the_observation_total() {
	let formulae = retrieval_formulae();
	let frequencies = [15.0, 5.0, 3.0, 10.0];
	let branch_frequencies = estep(&formulae, &retrieval_assignment(), &frequencies).unwrap();
	let total: f64 = branch_frequencies.iter().sum();
	assert!((total - 33.0).abs() < 1e-9);
}

#[test]
fn test_mstep() {
	let formulae = retrieval_formulae();
	let branch_frequencies = [8.88888889, 1.11111111, 2.0, 3.0, 9.88235294, 2.11764706];
	let updated = mstep(
		&formulae,
		&retrieval_assignment(),
		&branch_frequencies,
		&FnvHashSet::default(),
	);
	assert!((updated["dn"] - 0.6588).abs() < 1e-4);
	assert!((updated["do"] - 0.7407).abs() < 1e-4);
	assert!((updated["g"] - 0.4996).abs() < 1e-4);
}

#[test]
fn test_mstep_zero_positive_mass_estimates_zero() {
	let formulae = vec![
		CategoryFormula {
			category: "0".to_owned(),
			branches: proctree_core::parse_branches("(1 - a) * b").unwrap(),
		},
		CategoryFormula {
			category: "1".to_owned(),
			branches: proctree_core::parse_branches("(1 - a) * (1 - b)").unwrap(),
		},
	];
	use maplit::btreemap;
	let assignment = btreemap! { "a".to_owned() => 0.0, "b".to_owned() => 0.5 };
	let updated = mstep(&formulae, &assignment, &[6.0, 6.0], &FnvHashSet::default());
	assert_eq!(updated["a"], 0.0);
}

#[test]
fn test_run_em_increases_the_log_likelihood_until_convergence() {
	let formulae = retrieval_formulae();
	let observations = Observations::from_counts(&[15.0, 5.0, 3.0, 10.0]);
	let initial = retrieval_assignment();
	let before = log_likelihood(&formulae, &initial, &observations, true).unwrap();
	// single steps never decrease the log-likelihood
	let one = run_em(
		&formulae,
		initial.clone(),
		&observations,
		&EmOptions {
			max_iterations: 1,
			..EmOptions::default()
		},
	)
	.unwrap();
	assert!(one.log_likelihood >= before - 1e-12);
	let outcome = run_em(&formulae, initial, &observations, &EmOptions::default()).unwrap();
	assert!(outcome.converged);
	assert!(outcome.log_likelihood >= one.log_likelihood - 1e-12);
	// the fixed point matches the analytic estimate for the one parameter model
	let simple = vec![
		CategoryFormula {
			category: "0".to_owned(),
			branches: proctree_core::parse_branches("a").unwrap(),
		},
		CategoryFormula {
			category: "1".to_owned(),
			branches: proctree_core::parse_branches("(1-a)").unwrap(),
		},
	];
	use maplit::btreemap;
	let outcome = run_em(
		&simple,
		btreemap! { "a".to_owned() => 0.5 },
		&Observations::from_counts(&[20.0, 10.0]),
		&EmOptions::default(),
	)
	.unwrap();
	assert!(outcome.converged);
	assert!((outcome.assignment["a"] - 2.0 / 3.0).abs() < 1e-6);
}

#[test]
fn test_fixed_parameters_keep_their_value() {
	let formulae = retrieval_formulae();
	let observations = Observations::from_counts(&[15.0, 5.0, 3.0, 10.0]);
	let mut fixed = FnvHashSet::default();
	fixed.insert("g".to_owned());
	let options = EmOptions {
		fixed_parameters: fixed,
		..EmOptions::default()
	};
	let outcome = run_em(&formulae, retrieval_assignment(), &observations, &options).unwrap();
	assert_eq!(outcome.assignment["g"], 0.5);
}
