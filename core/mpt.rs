use crate::error::ModelError;
use crate::formula::{derive_formulae, CategoryFormula, CategoryKey};
use crate::tree::{tree_to_word, word_to_tree, Node};
use crate::word::{LeafRule, Word};
use std::fmt;

/**
A multinomial processing tree model: a BMPT word together with its decoded tree.

A model built by joining several independently specified subtrees additionally carries the raw formula lines of each subtree, from which the identifiability bound and the static mixture ratios are computed.
*/
#[derive(Clone, Debug)]
pub struct Mpt {
	word: Word,
	root: Node,
	subtrees: Option<Vec<Vec<String>>>,
}

impl Mpt {
	/// Builds a model from a word, decoding the tree.
	pub fn from_word(word: Word) -> Self {
		let root = word_to_tree(&word);
		Self {
			word,
			root,
			subtrees: None,
		}
	}

	/// Builds a model from a tree, encoding the word under the given leaf rule.
	pub fn from_tree(root: Node, leaf_rule: LeafRule) -> Result<Self, ModelError> {
		let word = tree_to_word(&root, leaf_rule)?;
		Ok(Self {
			word,
			root,
			subtrees: None,
		})
	}

	/// Builds a model from a whitespace separated token string.
	pub fn parse(text: &str, leaf_rule: LeafRule) -> Result<Self, ModelError> {
		Ok(Self::from_word(Word::parse(text, leaf_rule)?))
	}

	pub fn word(&self) -> &Word {
		&self.word
	}

	pub fn root(&self) -> &Node {
		&self.root
	}

	pub fn subtrees(&self) -> Option<&[Vec<String>]> {
		self.subtrees.as_deref()
	}

	pub fn set_subtrees(&mut self, subtrees: Vec<Vec<String>>) {
		self.subtrees = Some(subtrees);
	}

	/// The category formulae of the model in canonical category order.
	pub fn formulae(&self) -> Vec<CategoryFormula> {
		derive_formulae(&self.root)
	}

	/// The distinct answer categories in canonical order.
	pub fn categories(&self) -> Vec<String> {
		let mut keys: Vec<CategoryKey> = self
			.word
			.distinct_answers()
			.into_iter()
			.map(CategoryKey::new)
			.collect();
		keys.sort();
		keys.into_iter().map(CategoryKey::into_name).collect()
	}

	/// The distinct parameters fit by optimization, sorted by name.
	pub fn free_parameters(&self) -> Vec<String> {
		let mut parameters: Vec<String> = self
			.word
			.distinct_parameters()
			.into_iter()
			.filter(|parameter| !is_static_parameter(parameter))
			.map(str::to_owned)
			.collect();
		parameters.sort();
		parameters
	}

	/// The distinct static mixture parameters, sorted by name.
	pub fn static_parameters(&self) -> Vec<String> {
		let mut parameters: Vec<String> = self
			.word
			.distinct_parameters()
			.into_iter()
			.filter(|parameter| is_static_parameter(parameter))
			.map(str::to_owned)
			.collect();
		parameters.sort();
		parameters
	}

	/**
	The maximum number of free parameters the model may carry and remain identifiable: each subtree with `k` categories contributes `k - 1` degrees of freedom.

	A model without recorded subtrees is treated as a single tree.
	*/
	pub fn max_free_parameters(&self) -> usize {
		match &self.subtrees {
			Some(subtrees) => subtrees
				.iter()
				.map(|lines| lines.len().saturating_sub(1))
				.sum(),
			None => self.categories().len().saturating_sub(1),
		}
	}

	pub fn abstract_form(&self) -> Result<String, ModelError> {
		self.word.abstract_form()
	}
}

impl fmt::Display for Mpt {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.word)
	}
}

/// Models compare by abstract form: two models are equal iff they encode the same tree structure up to renaming of parameters and categories.
impl PartialEq for Mpt {
	fn eq(&self, other: &Self) -> bool {
		match (self.word.abstract_form(), other.word.abstract_form()) {
			(Ok(left), Ok(right)) => left == right,
			_ => false,
		}
	}
}

/// Parameters named `y` followed by a digit are static mixture ratios introduced by joining; they are pinned to empirical ratios and excluded from optimization.
pub fn is_static_parameter(name: &str) -> bool {
	let bytes = name.as_bytes();
	bytes.len() >= 2 && bytes[0] == b'y' && bytes[1].is_ascii_digit()
}

#[test]
fn test_equality_by_abstract_form() {
	let mpt1 = Mpt::parse("a b c 1 2 a 4 e 4 5 d 6 7", LeafRule::Digits).unwrap();
	let mpt2 = Mpt::parse("pq b c 1 2 pq 4 e 4 5 z 6 7", LeafRule::Digits).unwrap();
	let mpt3 = Mpt::parse("a b c 1 2 a 4 e 4 5 6", LeafRule::Digits).unwrap();
	assert_eq!(mpt1, mpt2);
	assert_ne!(mpt1, mpt3);
}

#[test]
fn test_static_parameter_convention() {
	assert!(is_static_parameter("y0"));
	assert!(is_static_parameter("y12"));
	assert!(!is_static_parameter("y"));
	assert!(!is_static_parameter("yes"));
	assert!(!is_static_parameter("g1"));
}

#[test]
fn test_parameter_partition() {
	let mpt = Mpt::parse("y0 Do 0 G1 0 1 y1 Dn 3 G1 2 3 Do 4 G2 4 5", LeafRule::Digits).unwrap();
	assert_eq!(mpt.free_parameters(), vec!["Dn", "Do", "G1", "G2"]);
	assert_eq!(mpt.static_parameters(), vec!["y0", "y1"]);
}

#[test]
fn test_max_free_parameters() {
	let mut mpt = Mpt::parse("y0 Do 0 G1 0 1 y1 Dn 3 G1 2 3 Do 4 G2 4 5", LeafRule::Digits).unwrap();
	assert_eq!(mpt.max_free_parameters(), 5);
	mpt.set_subtrees(vec![
		vec!["Do + (1-Do) * G1".to_owned(), "(1-Do) * (1-G1)".to_owned()],
		vec!["(1-Dn) * G1".to_owned(), "Dn + (1-Dn) * (1-G1)".to_owned()],
		vec!["Do + (1-Do) * G2".to_owned(), "(1-Do) * (1-G2)".to_owned()],
	]);
	assert_eq!(mpt.max_free_parameters(), 3);
}
