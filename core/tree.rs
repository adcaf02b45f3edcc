use crate::error::ModelError;
use crate::word::{LeafRule, Word};

/** A `Node` of a decoded processing tree. It has two types:
1. **Branch**: a `BranchNode` carries a parameter and owns its two subtrees.
2. **Leaf**: a `LeafNode` carries an answer category.
*/
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
	Branch(BranchNode),
	Leaf(LeafNode),
}

/// An inner node. The positive child is reached with the parameter's probability, the negative child with its complement.
#[derive(Clone, Debug, PartialEq)]
pub struct BranchNode {
	pub parameter: String,
	pub pos: Box<Node>,
	pub neg: Box<Node>,
}

/// A terminal node holding the answer category its path leads to.
#[derive(Clone, Debug, PartialEq)]
pub struct LeafNode {
	pub category: String,
}

impl Node {
	pub fn branch(parameter: impl Into<String>, pos: Node, neg: Node) -> Self {
		Self::Branch(BranchNode {
			parameter: parameter.into(),
			pos: Box::new(pos),
			neg: Box::new(neg),
		})
	}

	pub fn leaf(category: impl Into<String>) -> Self {
		Self::Leaf(LeafNode {
			category: category.into(),
		})
	}

	pub fn is_leaf(&self) -> bool {
		matches!(self, Self::Leaf(_))
	}

	/// The parameter of a branch node or the category of a leaf.
	pub fn content(&self) -> &str {
		match self {
			Self::Branch(branch) => &branch.parameter,
			Self::Leaf(leaf) => &leaf.category,
		}
	}

	/// The answer categories reachable from this node, with duplicates, in pre-order.
	pub fn answers(&self) -> Vec<&str> {
		match self {
			Self::Leaf(leaf) => vec![leaf.category.as_str()],
			Self::Branch(branch) => {
				let mut answers = branch.pos.answers();
				answers.extend(branch.neg.answers());
				answers
			}
		}
	}

	/// The number of tokens this node contributes to its word, i.e. the size of the subtree.
	pub fn token_len(&self) -> usize {
		match self {
			Self::Leaf(_) => 1,
			Self::Branch(branch) => 1 + branch.pos.token_len() + branch.neg.token_len(),
		}
	}
}

/**
Decodes a word into its tree by scanning the tokens left to right: parameter tokens are pushed onto a stack of incomplete nodes, a completed node is attached to the most recent incomplete one, popping down recursively until a single root remains.
*/
pub fn word_to_tree(word: &Word) -> Node {
	let mut stack: Vec<(String, Option<Node>)> = Vec::new();
	let mut root = None;
	for token in word.tokens() {
		if !word.is_leaf(token) {
			stack.push((token.clone(), None));
			continue;
		}
		let mut node = Node::leaf(token.clone());
		loop {
			match stack.last_mut() {
				None => {
					root = Some(node);
					break;
				}
				Some((_, pos)) if pos.is_none() => {
					*pos = Some(node);
					break;
				}
				Some(_) => {
					let (parameter, pos) = stack.pop().unwrap();
					node = Node::branch(parameter, pos.unwrap(), node);
				}
			}
		}
	}
	root.expect("a validated word decodes to a tree")
}

/// Encodes a tree as its word by pre-order traversal. Fails if the leaf rule does not classify the tree's contents consistently.
pub fn tree_to_word(root: &Node, leaf_rule: LeafRule) -> Result<Word, ModelError> {
	let mut tokens = Vec::with_capacity(root.token_len());
	collect_tokens(root, &mut tokens);
	Word::new(tokens, leaf_rule)
}

fn collect_tokens(node: &Node, tokens: &mut Vec<String>) {
	match node {
		Node::Leaf(leaf) => tokens.push(leaf.category.clone()),
		Node::Branch(branch) => {
			tokens.push(branch.parameter.clone());
			collect_tokens(&branch.pos, tokens);
			collect_tokens(&branch.neg, tokens);
		}
	}
}

#[test]
fn test_tree_to_word() {
	let root = Node::branch(
		"a",
		Node::branch("b", Node::leaf("1"), Node::leaf("2")),
		Node::leaf("3"),
	);
	let word = tree_to_word(&root, LeafRule::Digits).unwrap();
	assert_eq!(word.to_string(), "a b 1 2 3");
	let root = Node::branch(
		"a",
		Node::branch(
			"bef",
			Node::branch("a", Node::leaf("6"), Node::leaf("8")),
			Node::leaf("2"),
		),
		Node::leaf("13"),
	);
	let word = tree_to_word(&root, LeafRule::Digits).unwrap();
	assert_eq!(word.to_string(), "a bef a 6 8 2 13");
}

#[test]
fn test_word_to_tree() {
	let word = Word::parse("a bc c 0 1 a 2 e 2 3 d 4 5", LeafRule::Digits).unwrap();
	let root = Node::branch(
		"a",
		Node::branch(
			"bc",
			Node::branch("c", Node::leaf("0"), Node::leaf("1")),
			Node::branch(
				"a",
				Node::leaf("2"),
				Node::branch("e", Node::leaf("2"), Node::leaf("3")),
			),
		),
		Node::branch("d", Node::leaf("4"), Node::leaf("5")),
	);
	assert_eq!(word_to_tree(&word), root);
}

#[test]
fn test_word_tree_round_trip() {
	for text in &["0", "p 0 1", "b c 2 1 a 2 d 1 0", "a b c 1 2 a 4 e 4 5 d 6 7"] {
		let word = Word::parse(text, LeafRule::Digits).unwrap();
		let tree = word_to_tree(&word);
		let round_tripped = tree_to_word(&tree, LeafRule::Digits).unwrap();
		assert_eq!(word, round_tripped);
		assert_eq!(word_to_tree(&round_tripped), tree);
	}
}
