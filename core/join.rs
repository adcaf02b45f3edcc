use crate::error::ModelError;
use crate::mpt::Mpt;
use crate::tree::Node;

/**
Joins independently specified subtrees into one equivalent model by building a balanced prefix tree of `y`-numbered mixture parameters above their roots.

The first half of the subtrees is reachable through the positive branch of each mixture parameter, the second half through the negative branch. The numbering matches the bottom-up ratio computation used for pinning the mixture values: the left recursion continues at `prefix + ⌈n/2⌉`, the right at `prefix + 1`. A single subtree passes through unchanged.
*/
pub fn join(mpts: Vec<Mpt>) -> Result<Mpt, ModelError> {
	let mut mpts = mpts;
	match mpts.len() {
		0 => Err(ModelError::EmptyModel),
		1 => Ok(mpts.remove(0)),
		_ => {
			let leaf_rule = mpts[0].word().leaf_rule().clone();
			let roots: Vec<&Node> = mpts.iter().map(Mpt::root).collect();
			let root = join_nodes(&roots, 0);
			Mpt::from_tree(root, leaf_rule)
		}
	}
}

fn join_nodes(nodes: &[&Node], prefix: usize) -> Node {
	if nodes.len() == 1 {
		return nodes[0].clone();
	}
	let (left, right) = nodes.split_at(nodes.len() / 2);
	let pos = join_nodes(left, prefix + (nodes.len() + 1) / 2);
	let neg = join_nodes(right, prefix + 1);
	Node::branch(format!("y{}", prefix), pos, neg)
}

#[cfg(test)]
use crate::word::LeafRule;

#[test]
fn test_join_three_subtrees() {
	let mpts = vec![
		Mpt::parse("Do 0 G1 0 1", LeafRule::Digits).unwrap(),
		Mpt::parse("Dn 3 G1 2 3", LeafRule::Digits).unwrap(),
		Mpt::parse("Do 4 G2 4 5", LeafRule::Digits).unwrap(),
	];
	let joint = join(mpts).unwrap();
	assert_eq!(
		joint.to_string(),
		"y0 Do 0 G1 0 1 y1 Dn 3 G1 2 3 Do 4 G2 4 5"
	);
}

#[test]
fn test_join_single_subtree_passes_through() {
	let mpt = Mpt::parse("Do 0 G1 0 1", LeafRule::Digits).unwrap();
	let joint = join(vec![mpt.clone()]).unwrap();
	assert_eq!(joint.to_string(), mpt.to_string());
}

#[test]
fn test_join_prefix_numbering_ten_subtrees() {
	let mpts: Vec<Mpt> = (0..10)
		.map(|index| {
			let word = format!("t {} {}", 2 * index, 2 * index + 1);
			Mpt::parse(&word, LeafRule::Digits).unwrap()
		})
		.collect();
	let joint = join(mpts).unwrap();
	let parameters = joint.static_parameters();
	assert_eq!(
		parameters,
		vec!["y0", "y1", "y2", "y3", "y4", "y5", "y6", "y7", "y8"]
	);
	// the left half is selected by y5, the right by y1
	let tokens = joint.word().tokens();
	assert_eq!(tokens[0], "y0");
	assert_eq!(tokens[1], "y5");
	assert!(tokens.contains(&"y8".to_owned()));
}
