use proctree_core::ModelError;
use proctree_fit::FitError;
use thiserror::Error;

/// The failures of the model-space search. An unidentifiable candidate is not an error; it is skipped and the search continues.
#[derive(Debug, Error)]
pub enum SearchError {
	#[error(transparent)]
	Model(#[from] ModelError),
	#[error(transparent)]
	Fit(#[from] FitError),
	#[error("rgs rank {rank} out of range for {occurrences} occurrences")]
	RgsRank { rank: u64, occurrences: usize },
	#[error("the model has no deletion candidates")]
	NoCandidates,
	#[error("failed to access the candidate file: {0}")]
	Io(#[from] std::io::Error),
}
