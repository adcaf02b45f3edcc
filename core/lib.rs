/*!
This crate contains the multinomial processing tree data model: BMPT words, their decoded binary trees, the category formulae derived from them, and the transformations between the representations.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod error;
mod formula;
mod join;
mod mpt;
mod parse;
mod transform;
mod tree;
mod word;

pub use self::error::ModelError;
pub use self::formula::{
	derive_formulae, parse_branches, Assignment, BranchFormula, CategoryFormula, Factor,
};
pub use self::join::join;
pub use self::mpt::{is_static_parameter, Mpt};
pub use self::parse::{parse_easy, parse_bmpt};
pub use self::transform::{easy_to_bmpt, to_easy};
pub use self::tree::{tree_to_word, word_to_tree, BranchNode, LeafNode, Node};
pub use self::word::{LeafRule, Word};
