use proctree_core::ModelError;
use thiserror::Error;

/**
The failures a fit can produce.

Domain errors abort only the optimization restart that hit them; non-convergence is aggregated into the error ratio of the overall fit. An EM consistency violation signals a derivation or numerical bug and aborts the run.
*/
#[derive(Debug, Error)]
pub enum FitError {
	#[error(transparent)]
	Model(#[from] ModelError),
	#[error("category \"{category}\" has probability {probability} with {observed} observations")]
	Domain {
		category: String,
		probability: f64,
		observed: f64,
	},
	#[error("the number of restarts must be positive")]
	NoRestarts,
	#[error("all {attempted} optimization restarts failed")]
	AllRestartsFailed { attempted: usize },
	#[error("{formulae} category formulae but {columns} data columns")]
	ShapeMismatch { formulae: usize, columns: usize },
	#[error("branch frequencies sum to {branch_sum} but observations sum to {observed_sum}")]
	EmInconsistent { branch_sum: f64, observed_sum: f64 },
	#[error("no observations to pin static parameter \"{parameter}\"")]
	StaticParameter { parameter: String },
	#[error("invalid number \"{value}\" in observation data")]
	InvalidNumber { value: String },
	#[error("observation rows have differing lengths")]
	RaggedData,
	#[error("failed to read observation data: {0}")]
	Data(#[from] csv::Error),
}
