use thiserror::Error;

/// The errors produced while building or transforming processing tree models. Parse failures are fatal for the operation that encountered them and are never retried.
#[derive(Debug, Error)]
pub enum ModelError {
	#[error("malformed bmpt word \"{word}\"")]
	MalformedWord { word: String },
	#[error("word \"{word}\" has no balanced positive/negative split")]
	UnbalancedSplit { word: String },
	#[error("unrecognized token \"{token}\"")]
	UnrecognizedToken { token: String },
	#[error("malformed formula term \"{term}\"")]
	MalformedFormula { term: String },
	#[error("no parameter \"{parameter}\" in the assignment")]
	UnknownParameter { parameter: String },
	#[error("the model is empty")]
	EmptyModel,
}
