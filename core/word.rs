use crate::error::ModelError;
use fnv::FnvHashSet;
use std::fmt;

/// A `LeafRule` decides which tokens of a word are answer categories (leaves) as opposed to parameters (inner nodes). It is chosen at construction time and travels with the word, so leaf classification is never ambient state.
#[derive(Clone, Debug)]
pub enum LeafRule {
	/// A token consisting solely of ascii digits is a leaf. This is the default used by the easy format, whose categories are numbered.
	Digits,
	/// Tokens from an explicit set of category names are leaves, as declared by a `[leaf, …]` line in a bmpt model file.
	Names(FnvHashSet<String>),
}

impl LeafRule {
	pub fn names(names: impl IntoIterator<Item = String>) -> Self {
		Self::Names(names.into_iter().collect())
	}

	pub fn is_leaf(&self, token: &str) -> bool {
		match self {
			Self::Digits => !token.is_empty() && token.bytes().all(|byte| byte.is_ascii_digit()),
			Self::Names(names) => names.contains(token),
		}
	}
}

impl Default for LeafRule {
	fn default() -> Self {
		Self::Digits
	}
}

/**
A processing tree in the BMPT language: a parameter token is immediately followed by its positive subtree's tokens and then its negative subtree's tokens, a leaf token is an answer category.

Words are validated on construction, so every `Word` in the program encodes a complete binary tree.
*/
#[derive(Clone, Debug)]
pub struct Word {
	tokens: Vec<String>,
	leaf_rule: LeafRule,
}

impl Word {
	/// Creates a word from its tokens, verifying that they form a complete tree under the given leaf rule.
	pub fn new(tokens: Vec<String>, leaf_rule: LeafRule) -> Result<Self, ModelError> {
		let word = Self { tokens, leaf_rule };
		word.validate()?;
		Ok(word)
	}

	/// Creates a word from a whitespace separated token string.
	pub fn parse(text: &str, leaf_rule: LeafRule) -> Result<Self, ModelError> {
		let tokens = text.split_whitespace().map(str::to_owned).collect();
		Self::new(tokens, leaf_rule)
	}

	/// A word is well formed iff the expected-outcomes counter, starting at one, incremented by every parameter and decremented by every leaf, reaches zero exactly at the last token.
	fn validate(&self) -> Result<(), ModelError> {
		let mut expected_outcomes: i64 = 1;
		for token in self.tokens.iter() {
			if expected_outcomes == 0 {
				return Err(ModelError::MalformedWord {
					word: self.to_string(),
				});
			}
			if self.is_leaf(token) {
				expected_outcomes -= 1;
			} else {
				expected_outcomes += 1;
			}
		}
		if expected_outcomes != 0 {
			return Err(ModelError::MalformedWord {
				word: self.to_string(),
			});
		}
		Ok(())
	}

	pub fn tokens(&self) -> &[String] {
		&self.tokens
	}

	pub fn leaf_rule(&self) -> &LeafRule {
		&self.leaf_rule
	}

	pub fn is_leaf(&self, token: &str) -> bool {
		self.leaf_rule.is_leaf(token)
	}

	/// All the answer category tokens, with duplicates, in word order.
	pub fn answers(&self) -> Vec<&str> {
		self.tokens
			.iter()
			.map(String::as_str)
			.filter(|token| self.is_leaf(token))
			.collect()
	}

	/// All the parameter tokens, with duplicates, in word order.
	pub fn parameters(&self) -> Vec<&str> {
		self.tokens
			.iter()
			.map(String::as_str)
			.filter(|token| !self.is_leaf(token))
			.collect()
	}

	/// The distinct answer categories in first occurrence order.
	pub fn distinct_answers(&self) -> Vec<&str> {
		first_occurrences(self.answers())
	}

	/// The distinct parameters in first occurrence order.
	pub fn distinct_parameters(&self) -> Vec<&str> {
		first_occurrences(self.parameters())
	}

	/**
	The abstract form of the word replaces every token by a positional index in first occurrence order, `p0 p1 a0 …` — e.g. `a b 1 0 c 1 0` becomes `p0 p1 a0 a1 p2 a0 a1`.

	Two words with the same abstract form encode the same tree structure up to renaming, so the abstract form serves as the canonicalization key for structural equality and deduplication.
	*/
	pub fn abstract_form(&self) -> Result<String, ModelError> {
		let answers = self.distinct_answers();
		let parameters = self.distinct_parameters();
		let mut abstract_tokens = Vec::with_capacity(self.tokens.len());
		for token in self.tokens.iter() {
			if let Some(index) = answers.iter().position(|answer| *answer == token.as_str()) {
				abstract_tokens.push(format!("a{}", index));
			} else if let Some(index) = parameters
				.iter()
				.position(|parameter| *parameter == token.as_str())
			{
				abstract_tokens.push(format!("p{}", index));
			} else {
				return Err(ModelError::UnrecognizedToken {
					token: token.clone(),
				});
			}
		}
		Ok(abstract_tokens.join(" "))
	}

	/**
	Splits the word at the root into the positive subtree, reached with the root parameter's probability, and the negative subtree, reached with its complement.

	The split point is found by scanning the tokens after the root with the expected-outcomes counter; the counter reaching zero marks the end of the positive subtree.
	*/
	pub fn split_pos_neg(&self) -> Result<(Word, Word), ModelError> {
		if self.tokens.len() < 3 {
			return Err(ModelError::UnbalancedSplit {
				word: self.to_string(),
			});
		}
		let mut expected_outcomes: i64 = 1;
		for (index, token) in self.tokens[1..].iter().enumerate() {
			if self.is_leaf(token) {
				expected_outcomes -= 1;
			} else {
				expected_outcomes += 1;
			}
			if expected_outcomes == 0 {
				let pos = self.tokens[1..=index + 1].to_vec();
				let neg = self.tokens[index + 2..].to_vec();
				return Ok((
					Word::new(pos, self.leaf_rule.clone())?,
					Word::new(neg, self.leaf_rule.clone())?,
				));
			}
		}
		Err(ModelError::UnbalancedSplit {
			word: self.to_string(),
		})
	}

	pub fn len(&self) -> usize {
		self.tokens.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tokens.is_empty()
	}
}

impl fmt::Display for Word {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.tokens.join(" "))
	}
}

impl PartialEq for Word {
	fn eq(&self, other: &Self) -> bool {
		self.tokens == other.tokens
	}
}

impl Eq for Word {}

fn first_occurrences(tokens: Vec<&str>) -> Vec<&str> {
	let mut seen = Vec::new();
	for token in tokens {
		if !seen.contains(&token) {
			seen.push(token);
		}
	}
	seen
}

#[cfg(test)]
fn word(text: &str) -> Word {
	Word::parse(text, LeafRule::Digits).unwrap()
}

#[test]
fn test_answers_and_parameters() {
	let word = word("pq b c 1 2 pq 4 e 4 5 z 6 7");
	assert_eq!(word.answers(), vec!["1", "2", "4", "4", "5", "6", "7"]);
	assert_eq!(word.parameters(), vec!["pq", "b", "c", "pq", "e", "z"]);
	assert_eq!(word.distinct_parameters(), vec!["pq", "b", "c", "e", "z"]);
}

#[test]
fn test_abstract_form() {
	let word1 = word("a b c 1 2 a 4 e 4 5 d 6 7");
	let word2 = word("pq b c 1 2 pq 4 e 4 5 z 6 7");
	let word3 = word("a b c 1 2 a 4 e 4 5 6");
	assert_eq!(
		word1.abstract_form().unwrap(),
		"p0 p1 p2 a0 a1 p0 a2 p3 a2 a3 p4 a4 a5"
	);
	assert_eq!(word1.abstract_form().unwrap(), word2.abstract_form().unwrap());
	assert_eq!(
		word3.abstract_form().unwrap(),
		"p0 p1 p2 a0 a1 p0 a2 p3 a2 a3 a4"
	);
	assert_ne!(word1.abstract_form().unwrap(), word3.abstract_form().unwrap());
}

#[test]
fn test_split_pos_neg() {
	let word1 = word("p 0 1");
	let (pos, neg) = word1.split_pos_neg().unwrap();
	assert_eq!(pos.to_string(), "0");
	assert_eq!(neg.to_string(), "1");
	let word2 = word("a 0 b 0 1");
	let (pos, neg) = word2.split_pos_neg().unwrap();
	assert_eq!(pos.to_string(), "0");
	assert_eq!(neg.to_string(), "b 0 1");
	let word3 = word("a b 0 1 0");
	let (pos, neg) = word3.split_pos_neg().unwrap();
	assert_eq!(pos.to_string(), "b 0 1");
	assert_eq!(neg.to_string(), "0");
}

#[test]
fn test_malformed_words_are_rejected() {
	assert!(Word::parse("a 0", LeafRule::Digits).is_err());
	assert!(Word::parse("a 0 1 2", LeafRule::Digits).is_err());
	assert!(Word::parse("0 1", LeafRule::Digits).is_err());
	assert!(Word::parse("0", LeafRule::Digits).is_ok());
}

#[test]
fn test_named_leaves() {
	let rule = LeafRule::names(vec!["hit".to_owned(), "miss".to_owned()]);
	let word = Word::parse("d hit g hit miss", rule).unwrap();
	assert_eq!(word.answers(), vec!["hit", "hit", "miss"]);
	assert_eq!(word.parameters(), vec!["d", "g"]);
}
