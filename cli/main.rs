//! This module contains the main entrypoint to the proctree cli.

use anyhow::{bail, Context, Result};
use clap::Clap;
use fnv::FnvHashSet;
use proctree_core::{parse_bmpt, parse_easy, to_easy, Mpt};
use proctree_fit::{
	fit_model, run_em, static_values, EmOptions, FitOptions, Objective, Observations,
};
use proctree_search::{Deletion, RandomSearch};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Clap)]
#[clap(
	about = "Model, fit, and search multinomial processing trees.",
	setting = clap::AppSettings::DisableHelpSubcommand,
)]
enum Options {
	#[clap(name = "fit", about = "fit a model to observation data")]
	Fit(FitArgs),
	#[clap(name = "em", about = "fit a model with the expectation maximization algorithm")]
	Em(EmArgs),
	#[clap(name = "to-easy", about = "print a model in the easy format")]
	ToEasy(ToEasyArgs),
	#[clap(name = "candidates", about = "write the deletion candidate list of a model")]
	Candidates(CandidatesArgs),
	#[clap(name = "search", about = "run a random search over the model space")]
	Search(SearchArgs),
}

#[derive(Clap)]
struct FitArgs {
	#[clap(short, long, about = "the path to the model file")]
	model: PathBuf,
	#[clap(long, about = "parse the model file as bmpt words instead of easy lines")]
	bmpt: bool,
	#[clap(short, long, about = "the path to the observation csv")]
	data: PathBuf,
	#[clap(long, default_value = "llik", about = "the objective to minimize, llik or rmse")]
	objective: String,
	#[clap(long, default_value = "10", about = "the number of optimization restarts")]
	restarts: usize,
	#[clap(long, default_value = "0", about = "the seed of the restart rng")]
	seed: u64,
}

#[derive(Clap)]
struct EmArgs {
	#[clap(short, long, about = "the path to the model file")]
	model: PathBuf,
	#[clap(long, about = "parse the model file as bmpt words instead of easy lines")]
	bmpt: bool,
	#[clap(short, long, about = "the path to the observation csv")]
	data: PathBuf,
	#[clap(long, default_value = "10000", about = "the iteration budget")]
	max_iterations: usize,
}

#[derive(Clap)]
struct ToEasyArgs {
	#[clap(short, long, about = "the path to the bmpt model file")]
	model: PathBuf,
}

#[derive(Clap)]
struct CandidatesArgs {
	#[clap(short, long, about = "the path to the model file")]
	model: PathBuf,
	#[clap(long, about = "parse the model file as bmpt words instead of easy lines")]
	bmpt: bool,
	#[clap(short, long, about = "the path to write the candidate list to")]
	output: PathBuf,
	#[clap(long, about = "parameters whose subtrees are never deleted")]
	ignore: Vec<String>,
}

#[derive(Clap)]
struct SearchArgs {
	#[clap(short, long, about = "the path to the model file")]
	model: PathBuf,
	#[clap(long, about = "parse the model file as bmpt words instead of easy lines")]
	bmpt: bool,
	#[clap(short, long, about = "the path to the observation csv")]
	data: PathBuf,
	#[clap(long, about = "the path of the deletion candidate cache")]
	candidates: PathBuf,
	#[clap(long, about = "the path of the append-only evaluations file")]
	evals: PathBuf,
	#[clap(short, long, default_value = "100", about = "the number of search iterations")]
	iterations: usize,
	#[clap(long, default_value = "rmse", about = "the objective to minimize, llik or rmse")]
	objective: String,
	#[clap(long, default_value = "10", about = "the number of optimization restarts per fit")]
	restarts: usize,
	#[clap(long, default_value = "0", about = "the seed of the search rng")]
	seed: u64,
	#[clap(long, about = "parameters excluded from deletion and substitution")]
	ignore: Vec<String>,
}

fn main() -> Result<()> {
	env_logger::init();
	match Options::parse() {
		Options::Fit(args) => fit(args),
		Options::Em(args) => em(args),
		Options::ToEasy(args) => print_easy(args),
		Options::Candidates(args) => candidates(args),
		Options::Search(args) => search(args),
	}
}

fn fit(args: FitArgs) -> Result<()> {
	let mpt = load_model(&args.model, args.bmpt)?;
	let observations = load_observations(&args.data)?;
	let objective = parse_objective(&args.objective)?;
	let options = FitOptions {
		n_restarts: args.restarts,
		seed: args.seed,
		..FitOptions::default()
	};
	let report = fit_model(&mpt, &observations, objective, &options)
		.with_context(|| format!("failed to fit \"{}\"", args.model.display()))?;
	println!("{}", serde_json::to_string_pretty(&report)?);
	Ok(())
}

fn em(args: EmArgs) -> Result<()> {
	let mpt = load_model(&args.model, args.bmpt)?;
	let observations = load_observations(&args.data)?;
	let formulae = mpt.formulae();
	let statics = static_values(
		&formulae,
		&mpt.static_parameters(),
		&observations.column_sums(),
	)
	.with_context(|| format!("failed to fit \"{}\"", args.model.display()))?;
	let mut assignment = statics.clone();
	for parameter in mpt.free_parameters() {
		assignment.insert(parameter, 0.5);
	}
	let options = EmOptions {
		max_iterations: args.max_iterations,
		fixed_parameters: statics.keys().cloned().collect(),
		..EmOptions::default()
	};
	let outcome = run_em(&formulae, assignment, &observations, &options)
		.with_context(|| format!("failed to fit \"{}\"", args.model.display()))?;
	if !outcome.converged {
		log::warn!("em stopped after {} iterations without converging", outcome.iterations);
	}
	println!("{}", serde_json::to_string_pretty(&outcome.assignment)?);
	println!("LogLik-R: {}", outcome.log_likelihood);
	Ok(())
}

fn print_easy(args: ToEasyArgs) -> Result<()> {
	let mpt = load_model(&args.model, true)?;
	print!("{}", to_easy(&mpt));
	Ok(())
}

fn candidates(args: CandidatesArgs) -> Result<()> {
	let mpt = load_model(&args.model, args.bmpt)?;
	let ignore: FnvHashSet<String> = args.ignore.iter().cloned().collect();
	let deletion = Deletion::with_ignored(&mpt, ignore);
	let candidates = deletion
		.generate_candidates()
		.with_context(|| format!("failed to enumerate candidates of \"{}\"", args.model.display()))?;
	proctree_search::save_candidates(&args.output, &candidates)
		.with_context(|| format!("failed to write \"{}\"", args.output.display()))?;
	println!("{}", candidates.len());
	Ok(())
}

fn search(args: SearchArgs) -> Result<()> {
	let mpt = load_model(&args.model, args.bmpt)?;
	let observations = load_observations(&args.data)?;
	let objective = parse_objective(&args.objective)?;
	let ignore: FnvHashSet<String> = args.ignore.iter().cloned().collect();
	let candidates = RandomSearch::load_or_generate(&mpt, &args.candidates, &ignore)
		.with_context(|| format!("failed to load candidates from \"{}\"", args.candidates.display()))?;
	let fit_options = FitOptions {
		n_restarts: args.restarts,
		seed: args.seed,
		..FitOptions::default()
	};
	let mut search = RandomSearch::new(mpt, candidates, objective, fit_options, ignore, args.seed)?;
	let mut evals = fs::OpenOptions::new()
		.create(true)
		.append(true)
		.open(&args.evals)
		.with_context(|| format!("failed to open \"{}\"", args.evals.display()))?;
	let evaluated = search.run(&observations, args.iterations, |record| {
		let line = serde_json::to_string(&record.report).unwrap_or_default();
		if let Err(error) = writeln!(evals, "{} {}", record.word, line) {
			log::error!("failed to append an evaluation: {}", error);
		}
	})?;
	println!("evaluated {} of {} sampled candidates", evaluated, args.iterations);
	Ok(())
}

fn load_model(path: &Path, bmpt: bool) -> Result<Mpt> {
	let content = fs::read_to_string(path)
		.with_context(|| format!("failed to read model file \"{}\"", path.display()))?;
	let mpt = if bmpt {
		parse_bmpt(&content)
	} else {
		parse_easy(&content)
	};
	mpt.with_context(|| format!("failed to parse model file \"{}\"", path.display()))
}

fn load_observations(path: &Path) -> Result<Observations> {
	Observations::from_path(path)
		.with_context(|| format!("failed to read data file \"{}\"", path.display()))
}

fn parse_objective(name: &str) -> Result<Objective> {
	match name {
		"llik" => Ok(Objective::LogLikelihood),
		"rmse" => Ok(Objective::Rmse),
		_ => bail!("unknown objective \"{}\", expected llik or rmse", name),
	}
}
