use crate::error::SearchError;
use proctree_core::Word;
use std::collections::BTreeMap;

/**
The substitution operation: splits the occurrences of repeated parameters into separately fit parameters.

Each parameter maps to a restricted growth string over its occurrences in word order; an occurrence assigned a nonzero class gets the class index appended to its name, occurrences in class zero keep the original name and stay merged.
*/
pub struct Substitution {
	config: BTreeMap<String, Vec<u32>>,
}

impl Substitution {
	pub fn new(config: BTreeMap<String, Vec<u32>>) -> Self {
		Self { config }
	}

	/// Rewrites the word according to the configuration.
	pub fn apply(&self, word: &Word) -> Result<Word, SearchError> {
		let mut tokens: Vec<String> = word.tokens().to_vec();
		for (parameter, rgs) in self.config.iter() {
			apply_rgs(parameter, rgs, &mut tokens);
		}
		Ok(Word::new(tokens, word.leaf_rule().clone())?)
	}
}

/// Renames the occurrences of the parameter according to the restricted growth string; class zero keeps the bare name.
pub fn apply_rgs(parameter: &str, rgs: &[u32], tokens: &mut Vec<String>) {
	let mut occurrence = 0;
	for token in tokens.iter_mut() {
		if token == parameter {
			if let Some(&class) = rgs.get(occurrence) {
				if class != 0 {
					*token = format!("{}{}", parameter, class);
				}
			}
			occurrence += 1;
		}
	}
}

#[cfg(test)]
use proctree_core::LeafRule;

#[test]
fn test_apply_rgs() {
	let mut tokens: Vec<String> = "a a 0 1 b 2 3"
		.split(' ')
		.map(str::to_owned)
		.collect();
	apply_rgs("a", &[1, 0], &mut tokens);
	assert_eq!(tokens, vec!["a1", "a", "0", "1", "b", "2", "3"]);
}

#[test]
fn test_substitution() {
	use maplit::btreemap;
	let word = Word::parse("a a 0 1 b 2 3", LeafRule::Digits).unwrap();
	let substitution = Substitution::new(btreemap! {
		"a".to_owned() => vec![1, 0],
		"b".to_owned() => vec![12],
	});
	let substituted = substitution.apply(&word).unwrap();
	assert_eq!(substituted.to_string(), "a1 a 0 1 b12 2 3");
}

#[test]
fn test_zero_string_is_the_identity() {
	let word = Word::parse("a a 0 a 1 2", LeafRule::Digits).unwrap();
	use maplit::btreemap;
	let substitution = Substitution::new(btreemap! {
		"a".to_owned() => vec![0, 0, 0],
	});
	assert_eq!(substitution.apply(&word).unwrap(), word);
}
