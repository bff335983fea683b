//! Parser for the ReScript compiler's `-dparsetree` dump.
//!
//! The dump is line-oriented and indentation-significant: an ordinary line's
//! children are exactly the following lines with strictly greater indentation,
//! `[`/`]` lines delimit explicit lists, and `[]` marks an empty list. Blank
//! lines and the literal `<arg>` marker are noise and skipped.

use crate::error::Error;

/// Tag of identifier-expression nodes, the only kind reference extraction
/// looks at.
const IDENT_TAG: &str = "Pexp_ident";

/// One node of the parsed dump tree. Built per parse call and discarded once
/// references have been extracted; nothing holds a tree long-term.
#[derive(Debug)]
pub struct Node {
    /// Child nodes in document order.
    pub children: Vec<Node>,
    /// Tokens from the node's own line; `fields[0]` is the tag.
    pub fields: Vec<String>,
    /// The node-kind label, e.g. `Pexp_ident`. Empty-list nodes carry
    /// `<empty>`, explicit lists `<list>`.
    pub tag: String,
}

/// An identifier occurrence extracted from the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Module qualifier, when the identifier was dotted.
    pub module: Option<String>,
    /// The identifier's own name.
    pub name: String,
}

impl Reference {
    /// Render back to `Module.name` form.
    pub fn display_name(&self) -> String {
        return match &self.module {
            None => self.name.clone(),
            Some(module) => format!("{module}.{}", self.name),
        };
    }

    /// Split a raw dotted identifier into qualifier and name. Deeper paths
    /// keep only the first two segments, matching the dump's module-access
    /// shape.
    fn from_raw(raw: &str) -> Self {
        let mut parts = raw.splitn(3, '.');
        let first = parts.next().unwrap_or_default().to_string();
        return match parts.next() {
            None => Self {
                module: None,
                name: first,
            },
            Some(second) => Self {
                module: Some(first),
                name: second.to_string(),
            },
        };
    }
}

/// True when position `i` is preceded by whitespace or starts the line.
/// Parenthesized runs only count as tokens at such boundaries.
fn at_word_boundary(chars: &[char], i: usize) -> bool {
    return match i.checked_sub(1) {
        None => true,
        Some(prev) => chars.get(prev).is_some_and(|c| return c.is_whitespace()),
    };
}

/// Walk descendants depth-first, collecting identifier nodes that refer to
/// `query`.
fn collect_references(node: &Node, query: &str, refs: &mut Vec<Reference>) {
    let dotted = format!("{query}.");
    for child in &node.children {
        if child.tag == IDENT_TAG {
            if let Some(ident) = child.fields.get(1) {
                if ident == query || ident.starts_with(&dotted) {
                    refs.push(Reference::from_raw(ident));
                }
            }
        }
        collect_references(child, query, refs);
    }
    return;
}

/// Index of the closing `)` for a run opened at `open`. Runs contain no
/// nested parentheses; `None` when another `(` or end-of-line intervenes.
fn find_paren_close(chars: &[char], open: usize) -> Option<usize> {
    let mut i = open.saturating_add(1);
    while let Some(&c) = chars.get(i) {
        match c {
            ')' => return Some(i),
            '(' => return None,
            _ => i = i.saturating_add(1),
        }
    }
    return None;
}

/// Collect every identifier occurrence referring to `query`, in document
/// order. Matches nodes whose identifier equals `query` or starts with
/// `"{query}."`. Duplicates are preserved; callers that need uniqueness
/// dedupe themselves.
pub fn find_references(root: &Node, query: &str) -> Vec<Reference> {
    let mut refs = Vec::new();
    collect_references(root, query, &mut refs);
    return refs;
}

/// Count of leading space characters, the dump's notion of depth.
fn leading_spaces(line: &str) -> usize {
    return line.chars().take_while(|c| return c.is_whitespace()).count();
}

/// Build a node from its line content and already-parsed children.
fn node_from_line(content: &str, children: Vec<Node>) -> Node {
    let fields = tokenize(content);
    let tag = fields.first().cloned().unwrap_or_default();
    return Node {
        children,
        fields,
        tag,
    };
}

/// Parse a full dump into its root node.
///
/// # Errors
///
/// Returns `Error::Parse` on truncated or unbalanced input. Never returns a
/// partial tree: a dump that fails here failed entirely.
pub fn parse(raw: &str) -> Result<Node, Error> {
    let lines: Vec<&str> = raw.lines().collect();
    let mut cursor = 0_usize;
    return parse_node(&lines, &mut cursor);
}

/// Recursive descent over the remaining lines, driven by indentation.
fn parse_node(lines: &[&str], cursor: &mut usize) -> Result<Node, Error> {
    skip_ignored_lines(lines, cursor);
    let Some(line) = lines.get(*cursor) else {
        return Err(Error::Parse {
            reason: "unexpected end of dump".to_string(),
        });
    };

    let trimmed = line.trim();
    if trimmed == "[]" {
        *cursor = cursor.saturating_add(1);
        return Ok(node_from_line("<empty>", Vec::new()));
    }

    if trimmed == "[" {
        *cursor = cursor.saturating_add(1);
        let mut children = Vec::new();
        loop {
            skip_ignored_lines(lines, cursor);
            match lines.get(*cursor) {
                None => {
                    return Err(Error::Parse {
                        reason: "unclosed `[` in dump".to_string(),
                    });
                },
                Some(next) if next.trim() == "]" => {
                    *cursor = cursor.saturating_add(1);
                    break;
                },
                Some(_) => children.push(parse_node(lines, cursor)?),
            }
        }
        return Ok(node_from_line("<list>", children));
    }

    let indent = leading_spaces(line);
    let content = trimmed.to_string();
    *cursor = cursor.saturating_add(1);

    let mut children = Vec::new();
    while let Some(next) = lines.get(*cursor) {
        if leading_spaces(next) <= indent {
            break;
        }
        children.push(parse_node(lines, cursor)?);
    }
    return Ok(node_from_line(&content, children));
}

/// Scan a quoted token opened at `open`, honoring backslash escapes. Returns
/// the token (outer quote characters stripped, escapes left intact) and the
/// index just past the closing quote; `None` when the quote never closes.
fn scan_quoted(chars: &[char], open: usize, quote: char) -> Option<(String, usize)> {
    let mut i = open.saturating_add(1);
    while let Some(&c) = chars.get(i) {
        if c == '\\' {
            // An escape consumes the next character, whatever it is.
            chars.get(i.saturating_add(1))?;
            i = i.saturating_add(2);
            continue;
        }
        if c == quote {
            let raw: String = chars
                .get(open..=i)
                .map(|run| return run.iter().collect())
                .unwrap_or_default();
            let token = raw.trim_matches(|c: char| return c == '"' || c == '\'').to_string();
            return Some((token, i.saturating_add(1)));
        }
        i = i.saturating_add(1);
    }
    return None;
}

/// Advance past blank lines and literal `<arg>` marker lines.
fn skip_ignored_lines(lines: &[&str], cursor: &mut usize) {
    while let Some(line) = lines.get(*cursor) {
        let trimmed = line.trim();
        if !trimmed.is_empty() && trimmed != "<arg>" {
            break;
        }
        *cursor = cursor.saturating_add(1);
    }
    return;
}

/// Split a dump line into tokens.
///
/// Three shapes are recognized: parenthesized runs (kept whole, parentheses
/// included) when they start at a word boundary, quoted strings (quotes
/// stripped, backslash escapes honored), and plain atoms delimited by
/// whitespace, quotes, and parentheses. Unmatched delimiters are skipped.
fn tokenize(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0_usize;

    while let Some(&c) = chars.get(i) {
        if c.is_whitespace() {
            i = i.saturating_add(1);
            continue;
        }

        if c == '(' && at_word_boundary(&chars, i) {
            if let Some(close) = find_paren_close(&chars, i) {
                let token: String = chars
                    .get(i..=close)
                    .map(|run| return run.iter().collect())
                    .unwrap_or_default();
                tokens.push(token);
                i = close.saturating_add(1);
                continue;
            }
            i = i.saturating_add(1);
            continue;
        }

        if c == '"' || c == '\'' {
            if let Some((token, next)) = scan_quoted(&chars, i, c) {
                tokens.push(token);
                i = next;
                continue;
            }
            i = i.saturating_add(1);
            continue;
        }

        if c == '(' || c == ')' {
            i = i.saturating_add(1);
            continue;
        }

        let start = i;
        while let Some(&a) = chars.get(i) {
            if a.is_whitespace() || a == '"' || a == '\'' || a == '(' || a == ')' {
                break;
            }
            i = i.saturating_add(1);
        }
        let atom: String = chars
            .get(start..i)
            .map(|run| return run.iter().collect())
            .unwrap_or_default();
        tokens.push(atom);
    }

    return tokens;
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;

    /// A cut-down but structurally faithful `-dparsetree` dump.
    const SAMPLE: &str = r#"[
  structure_item (A.res[1,0+0]..[1,0+23])
    Pstr_eval
    expression (A.res[1,0+0]..[1,0+23])
      Pexp_apply
      expression (A.res[1,0+0]..[1,0+11])
        Pexp_ident "Lodash.uniq" (A.res[1,0+0]..[1,0+11])
      [
        <arg>
        expression (A.res[1,0+12]..[1,0+23])
          Pexp_ident "Other.thing" (A.res[1,0+12]..[1,0+23])
      ]
  structure_item (A.res[2,24+0]..[2,24+10])
    Pstr_eval
    expression (A.res[2,24+0]..[2,24+10])
      Pexp_ident "Lodash.map" (A.res[2,24+0]..[2,24+10])
]
"#;

    #[test]
    fn parses_nested_structure() {
        let root = parse(SAMPLE).unwrap();
        assert_eq!(root.tag, "<list>");
        assert_eq!(root.children.len(), 2);

        let first = root.children.first().unwrap();
        assert_eq!(first.tag, "structure_item");
        assert_eq!(first.children.len(), 2);
        let eval = first.children.first().unwrap();
        assert_eq!(eval.tag, "Pstr_eval");
        assert!(eval.children.is_empty());
    }

    #[test]
    fn empty_list_marker_has_no_children() {
        let root = parse("top\n  []\n").unwrap();
        assert_eq!(root.tag, "top");
        assert_eq!(root.children.len(), 1);
        let empty = root.children.first().unwrap();
        assert_eq!(empty.tag, "<empty>");
        assert!(empty.children.is_empty());
    }

    #[test]
    fn blank_and_arg_lines_are_skipped() {
        let root = parse("\n<arg>\n\ntop\n").unwrap();
        assert_eq!(root.tag, "top");
    }

    #[test]
    fn unclosed_bracket_is_a_parse_error() {
        let result = parse("[\n  item\n");
        assert!(matches!(result, Err(Error::Parse { .. })));
    }

    #[test]
    fn empty_input_is_a_parse_error() {
        assert!(matches!(parse(""), Err(Error::Parse { .. })));
        assert!(matches!(parse("\n<arg>\n"), Err(Error::Parse { .. })));
    }

    #[test]
    fn tokenizer_strips_quotes_and_keeps_paren_runs() {
        let tokens = tokenize(r#"Pexp_ident "Lodash.uniq" (A.res[1,0+0]..[1,0+11])"#);
        assert_eq!(
            tokens,
            vec!["Pexp_ident", "Lodash.uniq", "(A.res[1,0+0]..[1,0+11])"]
        );
    }

    #[test]
    fn tokenizer_honors_escapes_inside_quotes() {
        let tokens = tokenize(r#"tag "a\"b" 'c d'"#);
        assert_eq!(tokens, vec!["tag", r#"a\"b"#, "c d"]);
    }

    #[test]
    fn paren_run_mid_word_splits_into_atoms() {
        // A `(` not at a word boundary is a separator, not a run opener.
        let tokens = tokenize("foo(bar) (baz)");
        assert_eq!(tokens, vec!["foo", "bar", "(baz)"]);
    }

    #[test]
    fn references_are_document_ordered_and_scoped() {
        let root = parse(SAMPLE).unwrap();
        let refs = find_references(&root, "Lodash");
        let names: Vec<String> = refs.iter().map(Reference::display_name).collect();
        assert_eq!(names, vec!["Lodash.uniq", "Lodash.map"]);
    }

    #[test]
    fn bare_identifier_matches_exactly() {
        let dump = "top\n  Pexp_ident \"Lodash\"\n  Pexp_ident \"Lodashy\"\n";
        let root = parse(dump).unwrap();
        let refs = find_references(&root, "Lodash");
        assert_eq!(
            refs,
            vec![Reference {
                module: None,
                name: "Lodash".to_string(),
            }]
        );
    }

    #[test]
    fn dotted_reference_splits_into_module_and_name() {
        let reference = Reference::from_raw("Lodash.flatten.deep");
        assert_eq!(reference.module.as_deref(), Some("Lodash"));
        assert_eq!(reference.name, "flatten");
    }
}
