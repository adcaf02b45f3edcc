use crate::error::ModelError;
use crate::formula::{parse_branches, BranchFormula};
use crate::mpt::Mpt;
use crate::word::{LeafRule, Word};

/// Renders the model in the easy format: one line per answer category, each a `+`-joined list of branch products, in canonical category order.
pub fn to_easy(mpt: &Mpt) -> String {
	let mut easy = String::new();
	for formula in mpt.formulae() {
		easy.push_str(&formula.to_string());
		easy.push('\n');
	}
	easy
}

/**
Converts easy-format lines into the BMPT word of the tree they describe. Line `i` defines the category `leaf_step + i`, so subtrees parsed in sequence receive disjoint category numbers.

The root of each subtree is the first parameter of the first branch of the first remaining category; branches led by the bare parameter form the positive subtree, branches led by the complement form the negative subtree. The recursion terminates when a single category with an exhausted branch remains.
*/
pub fn easy_to_bmpt(lines: &[&str], leaf_step: usize) -> Result<Word, ModelError> {
	let mut categories = Vec::with_capacity(lines.len());
	for (index, line) in lines.iter().enumerate() {
		let branches = parse_branches(line)?;
		categories.push(((leaf_step + index).to_string(), branches));
	}
	let tokens = bmpt_tokens(categories)?;
	Word::new(tokens, LeafRule::Digits)
}

fn bmpt_tokens(categories: Vec<(String, Vec<BranchFormula>)>) -> Result<Vec<String>, ModelError> {
	match categories.first() {
		None => return Err(ModelError::EmptyModel),
		Some((category, branches)) => {
			if categories.len() == 1 && branches.iter().any(|branch| branch.factors.is_empty()) {
				return Ok(vec![category.clone()]);
			}
		}
	}
	let root = categories
		.first()
		.and_then(|(_, branches)| branches.first())
		.and_then(|branch| branch.factors.first())
		.map(|factor| factor.parameter.clone())
		.ok_or(ModelError::EmptyModel)?;
	let mut pos = Vec::new();
	let mut neg = Vec::new();
	for (category, branches) in categories {
		let mut pos_branches = Vec::new();
		let mut neg_branches = Vec::new();
		for branch in branches {
			let mut factors = branch.factors.into_iter();
			match factors.next() {
				Some(first) if first.parameter == root => {
					let rest = BranchFormula {
						factors: factors.collect(),
					};
					if first.negated {
						neg_branches.push(rest);
					} else {
						pos_branches.push(rest);
					}
				}
				first => {
					let term = first
						.map(|factor| factor.to_string())
						.unwrap_or_else(|| category.clone());
					return Err(ModelError::MalformedFormula { term });
				}
			}
		}
		if !pos_branches.is_empty() {
			pos.push((category.clone(), pos_branches));
		}
		if !neg_branches.is_empty() {
			neg.push((category, neg_branches));
		}
	}
	let mut tokens = vec![root];
	tokens.extend(bmpt_tokens(pos)?);
	tokens.extend(bmpt_tokens(neg)?);
	Ok(tokens)
}

#[cfg(test)]
use crate::tree::word_to_tree;

#[test]
fn test_easy_to_bmpt_two_high_threshold() {
	let lines = vec!["Do + (1-Do) * G1", "(1-Do) * (1-G1)"];
	let word = easy_to_bmpt(&lines, 0).unwrap();
	assert_eq!(word.to_string(), "Do 0 G1 0 1");
	let lines = vec!["(1-Dn) * G1", "Dn + (1-Dn) * (1-G1)"];
	let word = easy_to_bmpt(&lines, 2).unwrap();
	assert_eq!(word.to_string(), "Dn 3 G1 2 3");
}

#[test]
fn test_easy_round_trip() {
	let mpt = Mpt::parse("b c 2 1 a 2 d 1 0", LeafRule::Digits).unwrap();
	let easy = to_easy(&mpt);
	let lines: Vec<&str> = easy.lines().collect();
	let word = easy_to_bmpt(&lines, 0).unwrap();
	let round_tripped = Mpt::from_word(word);
	assert_eq!(round_tripped, mpt);
}

#[test]
fn test_to_easy_renders_canonical_order() {
	let mpt = Mpt::parse("Do 0 G1 0 1", LeafRule::Digits).unwrap();
	assert_eq!(to_easy(&mpt), "Do + (1-Do) * G1\n(1-Do) * (1-G1)\n");
}

#[test]
fn test_easy_to_bmpt_rejects_inconsistent_lines() {
	let lines = vec!["a + (1-a)", "b"];
	assert!(easy_to_bmpt(&lines, 0).is_err());
}

#[test]
fn test_word_to_tree_of_easy_output_matches() {
	let lines = vec!["Do + (1-Do) * G1", "(1-Do) * (1-G1)"];
	let word = easy_to_bmpt(&lines, 0).unwrap();
	let tree = word_to_tree(&word);
	assert_eq!(tree.answers(), vec!["0", "0", "1"]);
}
