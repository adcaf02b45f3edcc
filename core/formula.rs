use crate::error::ModelError;
use crate::tree::Node;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt;

/// A parameter assignment maps parameter names to probability values.
pub type Assignment = BTreeMap<String, f64>;

/// One factor of a branch formula: a parameter probability `p` or its complement `(1-p)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Factor {
	pub parameter: String,
	pub negated: bool,
}

/// The ordered product of the factors along one root-to-leaf path. The empty product, produced by a tree that is a single leaf, renders and evaluates as `1`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BranchFormula {
	pub factors: Vec<Factor>,
}

/// The sum of the branch formulas of all leaves sharing one answer category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryFormula {
	pub category: String,
	pub branches: Vec<BranchFormula>,
}

impl Factor {
	pub fn positive(parameter: impl Into<String>) -> Self {
		Self {
			parameter: parameter.into(),
			negated: false,
		}
	}

	pub fn negative(parameter: impl Into<String>) -> Self {
		Self {
			parameter: parameter.into(),
			negated: true,
		}
	}

	/// Parses a single factor, either `p` or `(1-p)`, tolerating whitespace inside the complement.
	pub fn parse(text: &str) -> Result<Self, ModelError> {
		let text = text.trim();
		let malformed = || ModelError::MalformedFormula {
			term: text.to_owned(),
		};
		if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
			let parameter = inner
				.trim()
				.strip_prefix('1')
				.map(str::trim_start)
				.and_then(|t| t.strip_prefix('-'))
				.map(str::trim)
				.ok_or_else(malformed)?;
			if !is_identifier(parameter) {
				return Err(malformed());
			}
			Ok(Self::negative(parameter))
		} else {
			if !is_identifier(text) {
				return Err(malformed());
			}
			Ok(Self::positive(text))
		}
	}

	pub fn evaluate(&self, assignment: &Assignment) -> Result<f64, ModelError> {
		let value = assignment
			.get(&self.parameter)
			.copied()
			.ok_or_else(|| ModelError::UnknownParameter {
				parameter: self.parameter.clone(),
			})?;
		Ok(if self.negated { 1.0 - value } else { value })
	}
}

impl BranchFormula {
	/// Parses a `*`-separated factor product. The literal `1` parses as the empty product.
	pub fn parse(text: &str) -> Result<Self, ModelError> {
		let text = text.trim();
		if text == "1" {
			return Ok(Self::default());
		}
		let factors = text
			.split('*')
			.map(Factor::parse)
			.collect::<Result<Vec<_>, _>>()?;
		Ok(Self { factors })
	}

	pub fn evaluate(&self, assignment: &Assignment) -> Result<f64, ModelError> {
		let mut product = 1.0;
		for factor in self.factors.iter() {
			product *= factor.evaluate(assignment)?;
		}
		Ok(product)
	}

	/// Counts the positive (bare) and negative (complement) occurrences of the parameter in this branch, the quantities the EM maximization step weighs branch frequencies with.
	pub fn count_occurrences(&self, parameter: &str) -> (usize, usize) {
		let mut pos = 0;
		let mut neg = 0;
		for factor in self.factors.iter() {
			if factor.parameter == parameter {
				if factor.negated {
					neg += 1;
				} else {
					pos += 1;
				}
			}
		}
		(pos, neg)
	}

	pub fn parameters(&self) -> impl Iterator<Item = &str> {
		self.factors.iter().map(|factor| factor.parameter.as_str())
	}
}

impl CategoryFormula {
	pub fn evaluate(&self, assignment: &Assignment) -> Result<f64, ModelError> {
		let mut sum = 0.0;
		for branch in self.branches.iter() {
			sum += branch.evaluate(assignment)?;
		}
		Ok(sum)
	}

	pub fn parameters(&self) -> impl Iterator<Item = &str> {
		self.branches.iter().flat_map(BranchFormula::parameters)
	}
}

impl fmt::Display for Factor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.negated {
			write!(f, "(1-{})", self.parameter)
		} else {
			write!(f, "{}", self.parameter)
		}
	}
}

impl fmt::Display for BranchFormula {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.factors.is_empty() {
			write!(f, "1")
		} else {
			write!(f, "{}", self.factors.iter().join(" * "))
		}
	}
}

impl fmt::Display for CategoryFormula {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.branches.iter().join(" + "))
	}
}

/// Parses one easy-format line, a `+`-separated list of branch products.
pub fn parse_branches(line: &str) -> Result<Vec<BranchFormula>, ModelError> {
	line.split('+').map(BranchFormula::parse).collect()
}

/**
Derives, for every answer category, the branch formulas of all root-to-leaf paths reaching it. Descending into a positive child multiplies the running product by the parameter, descending into a negative child by its complement.

The returned categories are ordered by the canonical answer order: numeric categories first, sorted by value, then the remaining names lexicographically. No numeric evaluation happens here; the result is the symbolic backbone the fitting engine consumes.
*/
pub fn derive_formulae(root: &Node) -> Vec<CategoryFormula> {
	let mut by_category: BTreeMap<CategoryKey, Vec<BranchFormula>> = BTreeMap::new();
	collect_branches(root, Vec::new(), &mut by_category);
	by_category
		.into_iter()
		.map(|(key, branches)| CategoryFormula {
			category: key.into_name(),
			branches,
		})
		.collect()
}

fn collect_branches(
	node: &Node,
	path: Vec<Factor>,
	out: &mut BTreeMap<CategoryKey, Vec<BranchFormula>>,
) {
	match node {
		Node::Leaf(leaf) => {
			out.entry(CategoryKey::new(&leaf.category))
				.or_default()
				.push(BranchFormula { factors: path });
		}
		Node::Branch(branch) => {
			let mut pos_path = path.clone();
			pos_path.push(Factor::positive(&branch.parameter));
			collect_branches(&branch.pos, pos_path, out);
			let mut neg_path = path;
			neg_path.push(Factor::negative(&branch.parameter));
			collect_branches(&branch.neg, neg_path, out);
		}
	}
}

/// The canonical sort key for answer categories: numeric names by value, other names lexicographically after them.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum CategoryKey {
	Number(u64, String),
	Text(String),
}

impl CategoryKey {
	pub fn new(category: &str) -> Self {
		match category.parse::<u64>() {
			Ok(number) => Self::Number(number, category.to_owned()),
			Err(_) => Self::Text(category.to_owned()),
		}
	}

	pub fn into_name(self) -> String {
		match self {
			Self::Number(_, name) => name,
			Self::Text(name) => name,
		}
	}
}

#[cfg(test)]
use crate::word::{LeafRule, Word};
#[cfg(test)]
use crate::tree::word_to_tree;

#[test]
fn test_derive_formulae_single_split() {
	let word = Word::parse("p 0 1", LeafRule::Digits).unwrap();
	let formulae = derive_formulae(&word_to_tree(&word));
	assert_eq!(formulae.len(), 2);
	assert_eq!(formulae[0].category, "0");
	assert_eq!(formulae[0].to_string(), "p");
	assert_eq!(formulae[1].category, "1");
	assert_eq!(formulae[1].to_string(), "(1-p)");
}

#[test]
fn test_derive_formulae_two_high_threshold() {
	let word = Word::parse("Do 0 G1 0 1", LeafRule::Digits).unwrap();
	let formulae = derive_formulae(&word_to_tree(&word));
	assert_eq!(formulae[0].to_string(), "Do + (1-Do) * G1");
	assert_eq!(formulae[1].to_string(), "(1-Do) * (1-G1)");
}

#[test]
fn test_formula_probabilities_sum_to_one() {
	use maplit::btreemap;
	let word = Word::parse("b c 2 1 a 2 d 1 0", LeafRule::Digits).unwrap();
	let formulae = derive_formulae(&word_to_tree(&word));
	let assignment = btreemap! {
		"a".to_owned() => 0.3,
		"b".to_owned() => 0.618,
		"c".to_owned() => 0.75,
		"d".to_owned() => 0.05,
	};
	let total: f64 = formulae
		.iter()
		.map(|formula| formula.evaluate(&assignment).unwrap())
		.sum();
	assert!((total - 1.0).abs() < 1e-12);
}

#[test]
fn test_parse_branches() {
	let branches = parse_branches("do + (1 - do) * g").unwrap();
	assert_eq!(branches.len(), 2);
	assert_eq!(branches[0], BranchFormula {
		factors: vec![Factor::positive("do")],
	});
	assert_eq!(branches[1], BranchFormula {
		factors: vec![Factor::negative("do"), Factor::positive("g")],
	});
	assert_eq!(branches[1].to_string(), "(1-do) * g");
	assert!(parse_branches("do + ()").is_err());
}

#[test]
fn test_count_occurrences() {
	let branch = BranchFormula::parse("a * (1 - b) * c").unwrap();
	assert_eq!(branch.count_occurrences("a"), (1, 0));
	let branch = BranchFormula::parse("(1 - a) * b * (1 - a) * a").unwrap();
	assert_eq!(branch.count_occurrences("a"), (1, 2));
}

#[test]
fn test_evaluate() {
	use maplit::btreemap;
	let assignment = btreemap! {
		"a".to_owned() => 0.1,
		"b".to_owned() => 0.8,
	};
	let branches = parse_branches("a + (1 - b) * a").unwrap();
	let total: f64 = branches
		.iter()
		.map(|branch| branch.evaluate(&assignment).unwrap())
		.sum();
	assert!((total - 0.12).abs() < 1e-12);
	assert!(branches[0]
		.evaluate(&Assignment::new())
		.is_err());
}

fn is_identifier(text: &str) -> bool {
	!text.is_empty()
		&& text
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
