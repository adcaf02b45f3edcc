use crate::deletion::{load_candidates, save_candidates, Deletion};
use crate::error::SearchError;
use crate::rgs::{rgs_count, rgs_unrank};
use crate::substitution::Substitution;
use fnv::FnvHashSet;
use proctree_core::{is_static_parameter, Mpt, Word};
use proctree_fit::{fit_model, FitError, FitOptions, FitReport, Objective, Observations};
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use std::collections::BTreeMap;
use std::path::Path;

/// One evaluated candidate of the random search.
#[derive(Clone, Debug)]
pub struct SearchRecord {
	pub word: String,
	pub report: FitReport,
}

/**
The random model-space search: samples a uniform deletion candidate and a uniform substitution configuration per parameter, builds the candidate model, skips it when it is not identifiable, and fits the rest.

The original's loop runs until the caller kills it; here `run` takes an explicit iteration bound and `step` exposes single iterations, so callers own termination.
*/
pub struct RandomSearch {
	mpt: Mpt,
	candidates: Vec<Word>,
	objective: Objective,
	fit_options: FitOptions,
	ignore: FnvHashSet<String>,
	rng: Xoshiro256Plus,
}

impl RandomSearch {
	pub fn new(
		mpt: Mpt,
		candidates: Vec<Word>,
		objective: Objective,
		fit_options: FitOptions,
		ignore: FnvHashSet<String>,
		seed: u64,
	) -> Result<Self, SearchError> {
		if candidates.is_empty() {
			return Err(SearchError::NoCandidates);
		}
		Ok(Self {
			mpt,
			candidates,
			objective,
			fit_options,
			ignore,
			rng: Xoshiro256Plus::seed_from_u64(seed),
		})
	}

	/// Loads the deletion candidate cache, or enumerates the candidates and writes it when missing.
	pub fn load_or_generate(
		mpt: &Mpt,
		path: &Path,
		ignore: &FnvHashSet<String>,
	) -> Result<Vec<Word>, SearchError> {
		if path.exists() {
			log::info!("loading deletion candidates from {}", path.display());
			load_candidates(path, mpt.word().leaf_rule())
		} else {
			let deletion = Deletion::with_ignored(mpt, ignore.clone());
			let candidates = deletion.generate_candidates()?;
			save_candidates(path, &candidates)?;
			Ok(candidates)
		}
	}

	/// Samples and evaluates one candidate model. Unidentifiable candidates and candidates whose fit fails numerically yield `None`.
	pub fn step(&mut self, observations: &Observations) -> Result<Option<SearchRecord>, SearchError> {
		let index = self.rng.gen_range(0, self.candidates.len());
		let candidate = self.candidates[index].clone();
		let config = self.sample_substitution(&candidate)?;
		let word = Substitution::new(config).apply(&candidate)?;
		let mut model = Mpt::from_word(word);
		if let Some(subtrees) = self.mpt.subtrees() {
			model.set_subtrees(subtrees.to_vec());
		}
		if model.free_parameters().len() > model.max_free_parameters() {
			log::debug!("skipping unidentifiable candidate {}", model);
			return Ok(None);
		}
		match fit_model(&model, observations, self.objective, &self.fit_options) {
			Ok(report) => Ok(Some(SearchRecord {
				word: model.to_string(),
				report,
			})),
			Err(FitError::AllRestartsFailed { .. }) | Err(FitError::Domain { .. }) => {
				log::warn!("skipping candidate {} whose fit failed", model);
				Ok(None)
			}
			Err(error) => Err(error.into()),
		}
	}

	/// Runs a bounded number of iterations, streaming every evaluation to the sink. Returns the number of evaluated candidates.
	pub fn run(
		&mut self,
		observations: &Observations,
		iterations: usize,
		mut sink: impl FnMut(&SearchRecord),
	) -> Result<usize, SearchError> {
		let mut evaluated = 0;
		for iteration in 0..iterations {
			log::debug!("search iteration {}", iteration + 1);
			if let Some(record) = self.step(observations)? {
				sink(&record);
				evaluated += 1;
			}
		}
		Ok(evaluated)
	}

	/// A uniform restricted growth string per parameter; static mixture ratios and ignored parameters always keep their names.
	fn sample_substitution(
		&mut self,
		candidate: &Word,
	) -> Result<BTreeMap<String, Vec<u32>>, SearchError> {
		let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
		for parameter in candidate.parameters() {
			*counts.entry(parameter).or_insert(0) += 1;
		}
		let mut config = BTreeMap::new();
		for (parameter, count) in counts {
			let rgs = if is_static_parameter(parameter) || self.ignore.contains(parameter) {
				vec![0; count]
			} else {
				let rank = self.rng.gen_range(0, rgs_count(count));
				rgs_unrank(rank, count)?
			};
			config.insert(parameter.to_owned(), rgs);
		}
		Ok(config)
	}
}

#[cfg(test)]
use proctree_core::LeafRule;

#[test]
fn test_random_search_records_identifiable_models() {
	let mpt = Mpt::parse("b c 2 1 a 2 d 1 0", LeafRule::Digits).unwrap();
	let deletion = Deletion::new(&mpt);
	let candidates = deletion.generate_candidates().unwrap();
	let observations = Observations::from_counts(&[12.0, 10.0, 8.0]);
	let fit_options = FitOptions {
		n_restarts: 2,
		..FitOptions::default()
	};
	let mut search = RandomSearch::new(
		mpt,
		candidates,
		Objective::Rmse,
		fit_options,
		FnvHashSet::default(),
		7,
	)
	.unwrap();
	let mut records = Vec::new();
	search
		.run(&observations, 20, |record| records.push(record.clone()))
		.unwrap();
	for record in records.iter() {
		let model = Mpt::parse(&record.word, LeafRule::Digits).unwrap();
		// every recorded model is identifiable: at most two free parameters for three categories
		assert!(model.free_parameters().len() <= 2);
		assert!(record.report.rmse.is_finite());
	}
}

#[test]
fn test_random_search_requires_candidates() {
	let mpt = Mpt::parse("b c 2 1 a 2 d 1 0", LeafRule::Digits).unwrap();
	assert!(matches!(
		RandomSearch::new(
			mpt,
			Vec::new(),
			Objective::Rmse,
			FitOptions::default(),
			FnvHashSet::default(),
			0,
		),
		Err(SearchError::NoCandidates)
	));
}
