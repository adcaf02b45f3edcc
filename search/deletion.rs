use crate::error::SearchError;
use fnv::{FnvHashMap, FnvHashSet};
use proctree_core::{LeafRule, Mpt, Node, Word};
use std::fs;
use std::path::Path;

/**
The deletion operation: enumerates every 0/1 keep mask over the tree's tokens whose kept tokens still form a valid word reaching every original answer category at least once.

Candidate masks are built bottom-up, each node exactly once: a leaf or an ignored parameter has the single keep-all mask; an internal node crosses its children's mask sets and adds the two degenerate options of dropping one entire child, which collapses the node onto the other child. The root always keeps its split. The candidates are ordered by abstract form and duplicate words are collapsed.
*/
pub struct Deletion<'a> {
	mpt: &'a Mpt,
	ignore: FnvHashSet<String>,
	all_categories: FnvHashMap<String, usize>,
}

impl<'a> Deletion<'a> {
	pub fn new(mpt: &'a Mpt) -> Self {
		Self::with_ignored(mpt, FnvHashSet::default())
	}

	/// Ignored parameters are never deleted; their subtrees are kept whole.
	pub fn with_ignored(mpt: &'a Mpt, ignore: FnvHashSet<String>) -> Self {
		let mut all_categories = FnvHashMap::default();
		for answer in mpt.word().answers() {
			*all_categories.entry(answer.to_owned()).or_insert(0) += 1;
		}
		Self {
			mpt,
			ignore,
			all_categories,
		}
	}

	/// Enumerates all reduced trees, the original included.
	pub fn generate_candidates(&self) -> Result<Vec<Word>, SearchError> {
		log::info!("generating deletion candidates for {}", self.mpt);
		let root = self.mpt.root();
		let masks = match root {
			Node::Branch(branch) if !self.ignore.contains(&branch.parameter) => {
				let left = self.node_candidates(&branch.pos);
				let right = self.node_candidates(&branch.neg);
				let mut combinations = Vec::new();
				for left_mask in left.iter() {
					for right_mask in right.iter() {
						let mut mask = Vec::with_capacity(root.token_len());
						mask.push(1u8);
						mask.extend_from_slice(left_mask);
						mask.extend_from_slice(right_mask);
						if self.check_coverage(root, &mask) {
							combinations.push(mask);
						}
					}
				}
				combinations
			}
			_ => vec![vec![1u8; root.token_len()]],
		};
		let tokens = self.mpt.word().tokens();
		let leaf_rule = self.mpt.word().leaf_rule();
		let mut candidates = Vec::with_capacity(masks.len());
		for mask in masks {
			let kept: Vec<String> = tokens
				.iter()
				.zip(mask.iter())
				.filter(|(_, &keep)| keep == 1)
				.map(|(token, _)| token.clone())
				.collect();
			let word = Word::new(kept, leaf_rule.clone())?;
			let abstract_form = word.abstract_form()?;
			candidates.push((abstract_form, word.to_string(), word));
		}
		// sort by canonical form, then collapse the duplicate words distinct masks produce
		candidates.sort_by(|left, right| (&left.0, &left.1).cmp(&(&right.0, &right.1)));
		candidates.dedup_by(|left, right| left.1 == right.1);
		log::info!("{} distinct deletion candidates", candidates.len());
		Ok(candidates.into_iter().map(|(_, _, word)| word).collect())
	}

	/// The candidate masks of one subtree, in token order of the subtree.
	fn node_candidates(&self, node: &Node) -> Vec<Vec<u8>> {
		let branch = match node {
			Node::Leaf(_) => return vec![vec![1]],
			Node::Branch(branch) if self.ignore.contains(&branch.parameter) => {
				return vec![vec![1; node.token_len()]];
			}
			Node::Branch(branch) => branch,
		};
		let left = self.node_candidates(&branch.pos);
		let right = self.node_candidates(&branch.neg);
		let left_len = branch.pos.token_len();
		let right_len = branch.neg.token_len();
		let mut combinations = Vec::new();
		// keep this node and combine the children's candidates
		for left_mask in left.iter() {
			for right_mask in right.iter() {
				let mut mask = Vec::with_capacity(node.token_len());
				mask.push(1u8);
				mask.extend_from_slice(left_mask);
				mask.extend_from_slice(right_mask);
				if self.check_coverage(node, &mask) {
					combinations.push(mask);
				}
			}
		}
		// drop the negative child: the node collapses onto a kept positive candidate
		for left_mask in left.iter() {
			let mut mask = Vec::with_capacity(node.token_len());
			mask.push(0u8);
			mask.extend_from_slice(left_mask);
			mask.extend(std::iter::repeat(0u8).take(right_len));
			if self.check_coverage(node, &mask) {
				combinations.push(mask);
			}
		}
		// drop the positive child
		for right_mask in right.iter() {
			let mut mask = Vec::with_capacity(node.token_len());
			mask.push(0u8);
			mask.extend(std::iter::repeat(0u8).take(left_len));
			mask.extend_from_slice(right_mask);
			if self.check_coverage(node, &mask) {
				combinations.push(mask);
			}
		}
		combinations
	}

	/// A mask is admissible iff every category of the full tree survives, either outside this subtree or among the kept tokens.
	fn check_coverage(&self, node: &Node, mask: &[u8]) -> bool {
		let mut subtree_counts = FnvHashMap::default();
		for answer in node.answers() {
			*subtree_counts.entry(answer).or_insert(0usize) += 1;
		}
		let mut kept = FnvHashSet::default();
		let mut index = 0;
		collect_kept(node, mask, &mut index, &mut kept);
		self.all_categories.iter().all(|(category, &count)| {
			let inside = subtree_counts.get(category.as_str()).copied().unwrap_or(0);
			count > inside || kept.contains(category.as_str())
		})
	}
}

fn collect_kept<'t>(
	node: &'t Node,
	mask: &[u8],
	index: &mut usize,
	kept: &mut FnvHashSet<&'t str>,
) {
	match node {
		Node::Leaf(leaf) => {
			if mask[*index] == 1 {
				kept.insert(leaf.category.as_str());
			}
			*index += 1;
		}
		Node::Branch(branch) => {
			*index += 1;
			collect_kept(&branch.pos, mask, index, kept);
			collect_kept(&branch.neg, mask, index, kept);
		}
	}
}

/// Writes the candidate words, one per line, as a resumable cache.
pub fn save_candidates(path: &Path, candidates: &[Word]) -> Result<(), SearchError> {
	let mut content = String::new();
	for candidate in candidates {
		content.push_str(&candidate.to_string());
		content.push('\n');
	}
	fs::write(path, content)?;
	Ok(())
}

/// Reads a previously saved candidate list.
pub fn load_candidates(path: &Path, leaf_rule: &LeafRule) -> Result<Vec<Word>, SearchError> {
	let content = fs::read_to_string(path)?;
	let mut candidates = Vec::new();
	for line in content.lines().filter(|line| !line.trim().is_empty()) {
		candidates.push(Word::parse(line, leaf_rule.clone())?);
	}
	Ok(candidates)
}

#[cfg(test)]
use itertools::Itertools;

#[test]
fn test_deletion_candidates() {
	let mpt = Mpt::parse("b c 2 1 a 2 d 1 0", LeafRule::Digits).unwrap();
	let deletion = Deletion::new(&mpt);
	let candidates = deletion.generate_candidates().unwrap();
	let mut words: Vec<String> = candidates
		.iter()
		.map(|candidate| candidate.to_string())
		.collect();
	words.sort();
	let mut expected = vec![
		"b c 2 1 a 2 d 1 0",
		"b c 2 1 a 2 0",
		"b c 2 1 d 1 0",
		"b c 2 1 0",
		"b 2 a 2 d 1 0",
		"b 2 d 1 0",
		"b 1 a 2 d 1 0",
		"b 1 a 2 0",
	];
	expected.sort_unstable();
	assert_eq!(words, expected);
}

#[test]
fn test_deletion_candidates_cover_every_category() {
	let mpt = Mpt::parse("b c 2 1 a 2 d 1 0", LeafRule::Digits).unwrap();
	let deletion = Deletion::new(&mpt);
	for candidate in deletion.generate_candidates().unwrap() {
		let categories: FnvHashSet<&str> = candidate.answers().into_iter().collect();
		assert!(categories.contains("0"));
		assert!(categories.contains("1"));
		assert!(categories.contains("2"));
	}
}

#[test]
fn test_subtree_candidates() {
	let mpt = Mpt::parse("b c 2 1 a 2 d 1 0", LeafRule::Digits).unwrap();
	let deletion = Deletion::new(&mpt);
	let branch = match mpt.root() {
		Node::Branch(branch) => branch,
		Node::Leaf(_) => unreachable!(),
	};
	let masks = deletion.node_candidates(&branch.pos);
	let tokens = ["c", "2", "1"];
	let subtrees: Vec<String> = masks
		.iter()
		.map(|mask| {
			tokens
				.iter()
				.zip(mask.iter())
				.filter(|(_, &keep)| keep == 1)
				.map(|(token, _)| *token)
				.join(" ")
		})
		.sorted()
		.collect();
	assert_eq!(subtrees, vec!["1", "2", "c 2 1"]);
}

#[test]
fn test_ignored_parameters_are_kept_whole() {
	let mpt = Mpt::parse("b c 2 1 a 2 d 1 0", LeafRule::Digits).unwrap();
	let mut ignore = FnvHashSet::default();
	ignore.insert("d".to_owned());
	let deletion = Deletion::with_ignored(&mpt, ignore);
	let candidates = deletion.generate_candidates().unwrap();
	for candidate in candidates.iter() {
		let tokens = candidate.tokens();
		if tokens.iter().any(|token| token == "d") {
			// the d subtree always survives intact
			let position = tokens.iter().position(|token| token == "d").unwrap();
			assert_eq!(&tokens[position..position + 3], &["d", "1", "0"]);
		}
	}
	assert!(candidates
		.iter()
		.all(|candidate| candidate.to_string() != "b c 2 1 a 2 0"));
}

#[test]
fn test_candidate_file_round_trip() {
	let mpt = Mpt::parse("b c 2 1 a 2 d 1 0", LeafRule::Digits).unwrap();
	let deletion = Deletion::new(&mpt);
	let candidates = deletion.generate_candidates().unwrap();
	let dir = std::env::temp_dir().join("proctree_deletion_test");
	std::fs::create_dir_all(&dir).unwrap();
	let path = dir.join("candidates.txt");
	save_candidates(&path, &candidates).unwrap();
	let loaded = load_candidates(&path, &LeafRule::Digits).unwrap();
	assert_eq!(candidates, loaded);
	std::fs::remove_file(&path).unwrap();
}
