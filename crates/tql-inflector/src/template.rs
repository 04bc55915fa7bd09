//! Query template scanning
//!
//! A single pass over the template finds two kinds of tokens:
//!
//! - placeholders, `${name}`, anywhere outside backslash escapes;
//! - relationship type lists, the `T1|T2` in `[var:T1|T2]`, optionally
//!   followed by the entailment marker `!`.
//!
//! The scanner knows string literals and backtick identifiers, so a `[` or
//! `!` inside them is never taken for pattern syntax. Map literals need no
//! special care: a type list only starts at `[`, optional variable, `:`.

use std::ops::Range;
use tql_core::{FlattenedParams, Result, TqlError};

/// Separator for list values substituted into a relationship type list
pub const TYPE_SEPARATOR: &str = "|";

/// Separator for list values substituted anywhere else
pub const LIST_SEPARATOR: &str = ",";

/// Entailment marker following a relationship type list
pub const ENTAILMENT_MARKER: char = '!';

/// A `${name}` token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Byte range of the whole token
    pub span: Range<usize>,
    pub name: String,
    /// Whether the token sits inside a relationship type list
    pub relationship_type: bool,
}

/// The type list of one relationship pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSegment {
    /// From the start of the first type to the end of the last
    pub span: Range<usize>,
    /// Type names in order; `None` where a type still holds a placeholder
    pub types: Vec<Option<String>>,
    /// Byte offset of the entailment marker
    pub marker: Option<usize>,
}

impl TypeSegment {
    pub fn is_entailed(&self) -> bool {
        self.marker.is_some()
    }

    /// Type names, if none of them holds a placeholder
    pub fn literal_types(&self) -> Option<Vec<String>> {
        self.types.iter().cloned().collect()
    }
}

/// Tokens found in one template, each list in template order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateScan {
    pub placeholders: Vec<Placeholder>,
    pub segments: Vec<TypeSegment>,
}

/// Scan a template
pub fn scan(template: &str) -> TemplateScan {
    Scanner {
        src: template,
        bytes: template.as_bytes(),
        pos: 0,
        out: TemplateScan::default(),
    }
    .run()
}

/// Replace every placeholder with its flattened value
///
/// List values are joined with `|` inside a relationship type list and with
/// `,` elsewhere. Entailment markers are left in place.
pub fn substitute_placeholders(template: &str, values: &FlattenedParams) -> Result<String> {
    let scan = scan(template);
    let mut replacements = Vec::with_capacity(scan.placeholders.len());
    for placeholder in scan.placeholders {
        let value = values
            .get(&placeholder.name)
            .ok_or_else(|| TqlError::MissingParameter(placeholder.name.clone()))?;
        let separator = if placeholder.relationship_type {
            TYPE_SEPARATOR
        } else {
            LIST_SEPARATOR
        };
        replacements.push((placeholder.span, value.join(separator)));
    }
    Ok(splice(template, replacements))
}

/// Type lists carrying the entailment marker
pub fn entailed_segments(template: &str) -> Vec<TypeSegment> {
    scan(template)
        .segments
        .into_iter()
        .filter(TypeSegment::is_entailed)
        .collect()
}

/// Render a type list, quoting names that are not plain identifiers
///
/// Quoted names escape an embedded backtick by doubling it.
pub fn join_types(types: &[String]) -> String {
    types
        .iter()
        .map(|name| {
            if is_plain_identifier(name) {
                name.clone()
            } else {
                format!("`{}`", name.replace('`', "``"))
            }
        })
        .collect::<Vec<_>>()
        .join(TYPE_SEPARATOR)
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Apply non-overlapping replacements given in ascending order
pub fn splice(template: &str, replacements: Vec<(Range<usize>, String)>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut cursor = 0;
    for (range, text) in replacements {
        out.push_str(&template[cursor..range.start]);
        out.push_str(&text);
        cursor = range.end;
    }
    out.push_str(&template[cursor..]);
    out
}

// ============================================================================
// Scanner
// ============================================================================

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    out: TemplateScan,
}

/// Identifier bytes; any non-ASCII byte counts so multi-byte characters
/// are never split
fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.')
}

impl<'a> Scanner<'a> {
    fn run(mut self) -> TemplateScan {
        while let Some(&b) = self.bytes.get(self.pos) {
            match b {
                b'\'' | b'"' => self.string_literal(),
                b'`' => self.quoted_identifier(),
                b'\\' => self.pos += 2,
                b'$' => match self.placeholder_at(self.pos, false) {
                    Some(placeholder) => {
                        self.pos = placeholder.span.end;
                        self.out.placeholders.push(placeholder);
                    }
                    None => self.pos += 1,
                },
                b'[' => {
                    if !self.type_segment() {
                        self.pos += 1;
                    }
                }
                _ => self.pos += 1,
            }
        }
        self.out
    }

    fn peek(&self, at: usize) -> Option<u8> {
        self.bytes.get(at).copied()
    }

    fn skip_ws(&self, mut at: usize) -> usize {
        while self.peek(at).map_or(false, |b| b.is_ascii_whitespace()) {
            at += 1;
        }
        at
    }

    /// `'...'` or `"..."`; placeholders inside are still substituted
    fn string_literal(&mut self) {
        let quote = self.bytes[self.pos];
        self.pos += 1;
        while let Some(b) = self.peek(self.pos) {
            match b {
                b'\\' => self.pos += 2,
                b'$' => match self.placeholder_at(self.pos, false) {
                    Some(placeholder) => {
                        self.pos = placeholder.span.end;
                        self.out.placeholders.push(placeholder);
                    }
                    None => self.pos += 1,
                },
                b if b == quote => {
                    self.pos += 1;
                    return;
                }
                _ => self.pos += 1,
            }
        }
    }

    fn quoted_identifier(&mut self) {
        let mut placeholders = Vec::new();
        self.pos = match self.backtick_end(self.pos, false, &mut placeholders) {
            Some(end) => end,
            None => self.bytes.len(),
        };
        self.out.placeholders.extend(placeholders);
    }

    /// End of the backtick identifier opening at `start`, collecting the
    /// placeholders inside it
    fn backtick_end(
        &self,
        start: usize,
        relationship_type: bool,
        placeholders: &mut Vec<Placeholder>,
    ) -> Option<usize> {
        let mut at = start + 1;
        loop {
            match self.peek(at)? {
                b'`' if self.peek(at + 1) == Some(b'`') => at += 2,
                b'`' => return Some(at + 1),
                b'$' => match self.placeholder_at(at, relationship_type) {
                    Some(placeholder) => {
                        at = placeholder.span.end;
                        placeholders.push(placeholder);
                    }
                    None => at += 1,
                },
                _ => at += 1,
            }
        }
    }

    /// `${name}` starting at `start`
    fn placeholder_at(&self, start: usize, relationship_type: bool) -> Option<Placeholder> {
        if self.peek(start)? != b'$' || self.peek(start + 1)? != b'{' {
            return None;
        }
        let name_start = start + 2;
        let mut at = name_start;
        while self.peek(at).map_or(false, is_name_byte) {
            at += 1;
        }
        if at == name_start || self.peek(at)? != b'}' {
            return None;
        }
        Some(Placeholder {
            span: start..at + 1,
            name: self.src[name_start..at].to_string(),
            relationship_type,
        })
    }

    /// Try to read `[ var? : T (| :? T)* !?` at the current `[`
    fn type_segment(&mut self) -> bool {
        let mut at = self.skip_ws(self.pos + 1);

        // Optional variable
        match self.peek(at) {
            Some(b'`') => {
                let mut ignored = Vec::new();
                match self.backtick_end(at, false, &mut ignored) {
                    Some(end) if ignored.is_empty() => at = self.skip_ws(end),
                    _ => return false,
                }
            }
            Some(b) if is_ident_byte(b) => {
                while self.peek(at).map_or(false, is_ident_byte) {
                    at += 1;
                }
                at = self.skip_ws(at);
            }
            _ => {}
        }

        if self.peek(at) != Some(b':') {
            return false;
        }
        at = self.skip_ws(at + 1);

        let mut placeholders = Vec::new();
        let Some((first_end, first)) = self.type_name(at, &mut placeholders) else {
            return false;
        };
        let span_start = at;
        let mut end = first_end;
        let mut types = vec![first];

        loop {
            let mut next = self.skip_ws(end);
            if self.peek(next) != Some(b'|') {
                break;
            }
            next = self.skip_ws(next + 1);
            if self.peek(next) == Some(b':') {
                next = self.skip_ws(next + 1);
            }
            let mut atom_placeholders = Vec::new();
            match self.type_name(next, &mut atom_placeholders) {
                Some((atom_end, name)) => {
                    placeholders.extend(atom_placeholders);
                    types.push(name);
                    end = atom_end;
                }
                None => break,
            }
        }

        let marker_at = self.skip_ws(end);
        let marker = (self.peek(marker_at) == Some(ENTAILMENT_MARKER as u8)
            && self.peek(marker_at + 1) != Some(b'='))
        .then_some(marker_at);

        self.out.placeholders.extend(placeholders);
        self.out.segments.push(TypeSegment {
            span: span_start..end,
            types,
            marker,
        });
        self.pos = marker.map_or(end, |m| m + 1);
        true
    }

    /// One type name: a backtick identifier, or a run of identifier bytes
    /// and placeholders
    fn type_name(
        &self,
        start: usize,
        placeholders: &mut Vec<Placeholder>,
    ) -> Option<(usize, Option<String>)> {
        let before = placeholders.len();

        if self.peek(start)? == b'`' {
            let end = self.backtick_end(start, true, placeholders)?;
            let name = (placeholders.len() == before)
                .then(|| self.src[start + 1..end - 1].replace("``", "`"));
            return Some((end, name));
        }

        let mut at = start;
        loop {
            match self.peek(at) {
                Some(b) if is_ident_byte(b) => at += 1,
                Some(b'$') => match self.placeholder_at(at, true) {
                    Some(placeholder) => {
                        at = placeholder.span.end;
                        placeholders.push(placeholder);
                    }
                    None => break,
                },
                _ => break,
            }
        }
        if at == start {
            return None;
        }
        let name = (placeholders.len() == before).then(|| self.src[start..at].to_string());
        Some((at, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tql_core::ParamValue;

    fn values(pairs: &[(&str, ParamValue)]) -> FlattenedParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn many(items: &[&str]) -> ParamValue {
        ParamValue::Many(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_placeholder_before_marker_keeps_marker() {
        let flattened = values(&[("node_id", "HP_123".into()), ("rel_id", "RO_123".into())]);
        let actual = substitute_placeholders("({node_id}-[:${rel_id}!]-(end)", &flattened).unwrap();
        assert_eq!(actual, "({node_id}-[:RO_123!]-(end)");
    }

    #[test]
    fn test_missing_placeholder() {
        let err = substitute_placeholders("MATCH (n {id: '${id}'}) RETURN n", &values(&[]))
            .unwrap_err();
        assert!(matches!(err, TqlError::MissingParameter(ref name) if name == "id"));
    }

    #[test]
    fn test_list_join_depends_on_position() {
        let flattened = values(&[("rels", many(&["a", "b"])), ("ids", many(&["'x'", "'y'"]))]);
        let actual = substitute_placeholders(
            "MATCH (n)-[r:${rels}]->(m) WHERE m.id IN [${ids}] RETURN n",
            &flattened,
        )
        .unwrap();
        assert_eq!(actual, "MATCH (n)-[r:a|b]->(m) WHERE m.id IN ['x','y'] RETURN n");
    }

    #[test]
    fn test_placeholder_in_string_literal() {
        let flattened = values(&[("id", "foo".into())]);
        let actual =
            substitute_placeholders("MATCH (n {fragment: '${id}'}) RETURN n", &flattened).unwrap();
        assert_eq!(actual, "MATCH (n {fragment: 'foo'}) RETURN n");
    }

    #[test]
    fn test_non_placeholders_untouched() {
        let template = "MATCH (n {a: '$'})-[:x]-(m) WHERE m.b = '${' RETURN $id, {x}";
        assert_eq!(substitute_placeholders(template, &values(&[])).unwrap(), template);
    }

    #[test]
    fn test_segment_detection() {
        let segments = scan("MATCH (n)-[r:foo|:bar !]-(m)<-[:`has part`]-(o)").segments;
        assert_eq!(segments.len(), 2);
        assert_eq!(
            segments[0].types,
            vec![Some("foo".to_string()), Some("bar".to_string())]
        );
        assert!(segments[0].is_entailed());
        assert_eq!(segments[1].types, vec![Some("has part".to_string())]);
        assert!(!segments[1].is_entailed());
    }

    #[test]
    fn test_doubled_backtick_in_type_name() {
        let template = format!("MATCH (n)-[:{}!]-(m) RETURN n", join_types(&["it`s".to_string()]));
        let segments = entailed_segments(&template);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].literal_types(), Some(vec!["it`s".to_string()]));
    }

    #[test]
    fn test_brackets_that_are_not_relationships() {
        let template = "MATCH (n) WHERE n.x IN ['a:b!', \"[:c!]\"] AND n.`[:d!]` = 1 \
                        RETURN [x IN n.list | x], {k: [:e]}";
        let segments = scan(template).segments;
        // Only the bare `[:e]` inside the map value has pattern shape
        assert_eq!(segments.len(), 1);
        assert!(!segments[0].is_entailed());
        assert!(entailed_segments(template).is_empty());
    }

    #[test]
    fn test_not_equal_is_not_a_marker() {
        assert!(entailed_segments("[r:x!= 1]").is_empty());
    }

    #[test]
    fn test_unsubstituted_type_is_not_literal() {
        let segments = entailed_segments("MATCH (n)-[:${rel}!]-(m) RETURN n");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].literal_types(), None);
    }

    #[test]
    fn test_join_types_quotes_when_needed() {
        let types = vec!["foo".to_string(), "has part".to_string(), "1x".to_string()];
        assert_eq!(join_types(&types), "foo|`has part`|`1x`");
    }

    #[test]
    fn test_join_types_escapes_backticks() {
        let types = vec!["it`s".to_string(), "a`b`c".to_string()];
        assert_eq!(join_types(&types), "`it``s`|`a``b``c`");
    }

    proptest! {
        #[test]
        fn prop_text_without_placeholders_is_unchanged(template in "[^$]{0,64}") {
            let out = substitute_placeholders(&template, &FlattenedParams::new()).unwrap();
            prop_assert_eq!(out, template);
        }

        #[test]
        fn prop_text_without_marker_has_no_entailment(template in "[^!]{0,64}") {
            prop_assert!(entailed_segments(&template).is_empty());
        }

        #[test]
        fn prop_scalar_substitution(
            name in "[a-z_][a-z0-9_]{0,8}",
            value in "[A-Za-z][A-Za-z0-9_]{0,8}",
            prefix in "[^$!]{0,16}",
        ) {
            let template = format!("{prefix}-[:${{{name}}}!]-()");
            let flattened = values(&[(name.as_str(), ParamValue::Single(value.clone()))]);
            let out = substitute_placeholders(&template, &flattened).unwrap();
            prop_assert_eq!(out, format!("{prefix}-[:{value}!]-()"));
        }
    }
}
