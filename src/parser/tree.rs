use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Any block delimiter: opener, closer (`/wp:`) or void opener (`/-->`).
/// Attributes are matched only so their braces cannot end the delimiter early.
static DELIMITER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)<!--\s+(/)?wp:([a-z][a-z0-9_-]*/)?([a-z][a-z0-9_-]*)\s+(\{.*?\}\s+)?(/)?-->",
    )
    .unwrap()
});

/// A block from the full tree parse; freeform HTML between blocks is not kept.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBlock {
    pub name: String,
    pub inner_blocks: Vec<ParsedBlock>,
}

enum Delimiter {
    Open(ParsedBlock),
    Void(ParsedBlock),
    Close,
}

/// Parses every block in `content`, of any name, keeping nesting.
///
/// Un-namespaced names resolve to `core/`. A closer pops the innermost open
/// block whatever its name; openers still open at the end are kept.
pub fn parse_blocks(content: &str) -> Vec<ParsedBlock> {
    let mut output = Vec::new();
    let mut stack: Vec<ParsedBlock> = Vec::new();

    for caps in DELIMITER_RE.captures_iter(content) {
        let is_closer = caps.get(1).is_some();
        let is_void = caps.get(5).is_some();
        let namespace = caps.get(2).map(|m| m.as_str()).unwrap_or("core/");
        let name = format!("{}{}", namespace, &caps[3]);

        let delimiter = if is_closer {
            Delimiter::Close
        } else {
            let block = ParsedBlock {
                name,
                inner_blocks: Vec::new(),
            };
            if is_void {
                Delimiter::Void(block)
            } else {
                Delimiter::Open(block)
            }
        };

        match delimiter {
            Delimiter::Open(block) => stack.push(block),
            Delimiter::Void(block) => attach(block, &mut stack, &mut output),
            Delimiter::Close => {
                // A stray closer outside any block is plain text.
                if let Some(block) = stack.pop() {
                    attach(block, &mut stack, &mut output);
                }
            }
        }
    }

    while let Some(block) = stack.pop() {
        attach(block, &mut stack, &mut output);
    }
    output
}

fn attach(block: ParsedBlock, stack: &mut [ParsedBlock], output: &mut Vec<ParsedBlock>) {
    match stack.last_mut() {
        Some(parent) => parent.inner_blocks.push(block),
        None => output.push(block),
    }
}

/// Adds the name of every block in the tree, nested ones included.
pub fn collect_names(blocks: &[ParsedBlock], names: &mut BTreeSet<String>) {
    for block in blocks {
        names.insert(block.name.clone());
        collect_names(&block.inner_blocks, names);
    }
}
