use crate::error::ModelError;
use crate::join::join;
use crate::mpt::Mpt;
use crate::transform::{easy_to_bmpt, to_easy};
use crate::word::{LeafRule, Word};

/**
Parses an easy-format model: one line per answer category, `#` comments, blank lines separating independent subtrees.

Each subtree is converted to its BMPT word with category numbers offset by the categories of the preceding subtrees, then the subtrees are joined with mixture parameters. The joined model records the raw subtree lines for identifiability and ratio computation.
*/
pub fn parse_easy(content: &str) -> Result<Mpt, ModelError> {
	let groups = subtree_groups(content);
	if groups.is_empty() {
		return Err(ModelError::EmptyModel);
	}
	let mut mpts = Vec::with_capacity(groups.len());
	let mut leaf_step = 0;
	for group in groups.iter() {
		let lines: Vec<&str> = group.iter().map(String::as_str).collect();
		let word = easy_to_bmpt(&lines, leaf_step)?;
		mpts.push(Mpt::from_word(word));
		leaf_step += group.len();
	}
	let mut joint = join(mpts)?;
	joint.set_subtrees(groups);
	Ok(joint)
}

/**
Parses a BMPT-format model: one word per line, with an optional leading `[leaf, leaf, …]` line declaring the answer category names. Without a declaration, all-digit tokens are the leaves.

Multiple word lines are joined into a single model the same way easy-format subtrees are.
*/
pub fn parse_bmpt(content: &str) -> Result<Mpt, ModelError> {
	let lines: Vec<String> = stripped_lines(content)
		.into_iter()
		.filter(|line| !line.is_empty())
		.collect();
	let leaf_rule = lines
		.iter()
		.find(|line| line.starts_with('['))
		.map(|line| leaf_rule_from_declaration(line))
		.unwrap_or(LeafRule::Digits);
	let words = lines
		.iter()
		.filter(|line| !line.starts_with('['))
		.map(|line| Word::parse(line, leaf_rule.clone()))
		.collect::<Result<Vec<_>, _>>()?;
	if words.is_empty() {
		return Err(ModelError::EmptyModel);
	}
	let mpts: Vec<Mpt> = words.into_iter().map(Mpt::from_word).collect();
	let subtrees: Vec<Vec<String>> = mpts
		.iter()
		.map(|mpt| to_easy(mpt).lines().map(str::to_owned).collect())
		.collect();
	let mut joint = join(mpts)?;
	joint.set_subtrees(subtrees);
	Ok(joint)
}

fn leaf_rule_from_declaration(line: &str) -> LeafRule {
	let names = line
		.trim_start_matches('[')
		.trim_end_matches(']')
		.split(',')
		.map(|name| name.trim().to_owned())
		.filter(|name| !name.is_empty());
	LeafRule::names(names)
}

/// Removes full-line comments, then strips inline comments and surrounding whitespace. Blank lines survive so they can separate subtrees.
fn stripped_lines(content: &str) -> Vec<String> {
	content
		.lines()
		.filter(|line| !line.trim_start().starts_with('#'))
		.map(|line| line.split('#').next().unwrap_or("").trim().to_owned())
		.collect()
}

/// Groups consecutive non-blank lines into subtrees.
fn subtree_groups(content: &str) -> Vec<Vec<String>> {
	let mut groups = Vec::new();
	let mut current = Vec::new();
	for line in stripped_lines(content) {
		if line.is_empty() {
			if !current.is_empty() {
				groups.push(std::mem::take(&mut current));
			}
		} else {
			current.push(line);
		}
	}
	if !current.is_empty() {
		groups.push(current);
	}
	groups
}

#[test]
fn test_parse_easy_single_tree() {
	let content = "# a two high threshold tree\nDo + (1-Do) * G1\n(1-Do) * (1-G1)\n";
	let mpt = parse_easy(content).unwrap();
	assert_eq!(mpt.to_string(), "Do 0 G1 0 1");
	assert_eq!(mpt.max_free_parameters(), 1);
}

#[test]
fn test_parse_easy_with_joining() {
	let content = "\
Do + (1-Do) * G1
(1-Do) * (1-G1)

(1-Dn) * G1  # inline comment
Dn + (1-Dn) * (1-G1)

Do + (1-Do) * G2
(1-Do) * (1-G2)
";
	let mpt = parse_easy(content).unwrap();
	assert_eq!(
		mpt.to_string(),
		"y0 Do 0 G1 0 1 y1 Dn 3 G1 2 3 Do 4 G2 4 5"
	);
	assert_eq!(mpt.subtrees().unwrap().len(), 3);
	assert_eq!(mpt.max_free_parameters(), 3);
}

#[test]
fn test_parse_bmpt_with_custom_leaves() {
	let content = "[hit, miss]\nd hit g hit miss\n";
	let mpt = parse_bmpt(content).unwrap();
	assert_eq!(mpt.to_string(), "d hit g hit miss");
	assert_eq!(mpt.categories(), vec!["hit", "miss"]);
}

#[test]
fn test_parse_bmpt_digit_leaves() {
	let content = "a b c 0 1 a 2 e 2 3 def 4 5\n";
	let mpt = parse_bmpt(content).unwrap();
	assert_eq!(mpt.to_string(), "a b c 0 1 a 2 e 2 3 def 4 5");
}

#[test]
fn test_parse_empty_model() {
	assert!(parse_easy("# only a comment\n").is_err());
	assert!(parse_bmpt("").is_err());
}
