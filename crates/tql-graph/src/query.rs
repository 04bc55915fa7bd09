//! Pattern query dialect
//!
//! A small Cypher subset understood by the in-memory engine:
//!
//! ```text
//! MATCH part (, part)* (MATCH part (, part)*)*
//!   (WHERE cond (AND cond)*)?
//! RETURN DISTINCT? item (, item)* (LIMIT n)?
//!
//! part  := (var =)? node (rel node)*
//! node  := ( var? (:Label)* {key: literal, ...}? )
//! rel   := <?-[ var? (:T1|T2...)? (*min..max)? {..}? ]->?  |  -->  |  <--  |  --
//! cond  := var.key (= | <>) literal  |  var.key IN [literal, ...]
//! item  := * | var (AS alias)? | var.key (AS alias)?
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while},
    character::complete::{anychar, char, digit1, multispace0, satisfy},
    combinator::{cut, map, map_opt, not, opt, recognize, value},
    error::{context, ContextError, ErrorKind, ParseError as NomParseError},
    multi::{fold_many0, many0, many1, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated},
    IResult, Parser,
};

/// Query parse failure with the byte offset it was detected at
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub parts: Vec<PatternPart>,
    pub conditions: Vec<Condition>,
    pub distinct: bool,
    pub items: Vec<ReturnItem>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternPart {
    pub path_var: Option<String>,
    pub start: NodePattern,
    pub chain: Vec<(RelPattern, NodePattern)>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodePattern {
    pub var: Option<String>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Literal)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelPattern {
    pub var: Option<String>,
    /// Empty matches any type
    pub types: Vec<String>,
    pub direction: Direction,
    /// `None` for a single hop, otherwise `(min, max)` hops
    pub length: Option<(usize, Option<usize>)>,
    pub properties: Vec<(String, Literal)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
    List(Vec<Literal>),
}

impl Literal {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Null => serde_json::Value::Null,
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        var: String,
        key: String,
        op: CompareOp,
        value: Literal,
    },
    In {
        var: String,
        key: String,
        values: Vec<Literal>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReturnItem {
    All,
    Var { name: String, alias: Option<String> },
    Property { var: String, key: String, alias: Option<String> },
}

impl ReturnItem {
    /// Column name in the result row
    pub fn column(&self) -> String {
        match self {
            Self::All => "*".to_string(),
            Self::Var { name, alias } => alias.clone().unwrap_or_else(|| name.clone()),
            Self::Property { var, key, alias } => {
                alias.clone().unwrap_or_else(|| format!("{var}.{key}"))
            }
        }
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Parse one query
pub fn parse(input: &str) -> Result<Query, ParseError> {
    match query(input) {
        Ok(("", parsed)) => Ok(parsed),
        Ok((rest, _)) => Err(error_at(input, rest, "unexpected input")),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            Err(error_at(input, e.input, e.context.unwrap_or("syntax error")))
        }
        Err(nom::Err::Incomplete(_)) => Err(error_at(input, "", "unexpected end of query")),
    }
}

fn error_at(input: &str, rest: &str, message: &str) -> ParseError {
    let near: String = rest.chars().take(16).collect();
    let message = if near.is_empty() {
        format!("{message} at end of query")
    } else {
        format!("{message} near '{near}'")
    };
    ParseError {
        message,
        offset: input.len() - rest.len(),
    }
}

/// Innermost labelled failure and where it happened
#[derive(Debug, Clone, PartialEq)]
struct SyntaxError<'a> {
    input: &'a str,
    context: Option<&'static str>,
}

impl<'a> NomParseError<&'a str> for SyntaxError<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        Self {
            input,
            context: None,
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }

    fn or(self, other: Self) -> Self {
        match (self.context, other.context) {
            (Some(_), None) => self,
            (None, Some(_)) => other,
            _ if self.input.len() <= other.input.len() => self,
            _ => other,
        }
    }
}

impl<'a> ContextError<&'a str> for SyntaxError<'a> {
    fn add_context(_input: &'a str, ctx: &'static str, other: Self) -> Self {
        Self {
            input: other.input,
            context: other.context.or(Some(ctx)),
        }
    }
}

type Res<'a, O> = IResult<&'a str, O, SyntaxError<'a>>;

fn ws<'a, O, E: NomParseError<&'a str>, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Case-insensitive keyword that is not the prefix of a longer word
fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = SyntaxError<'a>> {
    ws(terminated(tag_no_case(word), not(satisfy(is_ident_char))))
}

fn symbol<'a>(c: char) -> impl Parser<&'a str, Output = char, Error = SyntaxError<'a>> {
    ws(char(c))
}

/// Plain or backtick-quoted name; a doubled backtick escapes one
fn identifier(input: &str) -> Res<'_, String> {
    let quoted = preceded(
        char('`'),
        cut(terminated(
            fold_many0(
                alt((value('`', tag("``")), satisfy(|c| c != '`'))),
                String::new,
                push_char,
            ),
            context("unterminated quoted identifier", char('`')),
        )),
    );
    let plain = map(
        recognize(pair(
            satisfy(|c: char| c.is_alphabetic() || c == '_'),
            take_while(is_ident_char),
        )),
        |name: &str| name.to_string(),
    );
    ws(alt((quoted, plain))).parse(input)
}

fn push_char(mut text: String, c: char) -> String {
    text.push(c);
    text
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        other => other,
    }
}

fn quoted_string<'a>(quote: char) -> impl Parser<&'a str, Output = String, Error = SyntaxError<'a>> {
    preceded(
        char(quote),
        cut(terminated(
            fold_many0(
                alt((
                    preceded(char('\\'), map(anychar, unescape)),
                    satisfy(move |c| c != '\\' && c != quote),
                )),
                String::new,
                push_char,
            ),
            context("unterminated string literal", char(quote)),
        )),
    )
}

fn number(input: &str) -> Res<'_, Literal> {
    map_opt(
        recognize((opt(char('-')), digit1, opt(pair(char('.'), digit1)))),
        |text: &str| {
            if text.contains('.') {
                text.parse().ok().map(Literal::Float)
            } else {
                text.parse().ok().map(Literal::Integer)
            }
        },
    )
    .parse(input)
}

fn unsigned(input: &str) -> Res<'_, usize> {
    ws(map_opt(digit1, |digits: &str| digits.parse().ok())).parse(input)
}

fn list(input: &str) -> Res<'_, Vec<Literal>> {
    preceded(
        symbol('['),
        cut(terminated(
            separated_list0(symbol(','), literal),
            context("expected ']'", symbol(']')),
        )),
    )
    .parse(input)
}

fn literal(input: &str) -> Res<'_, Literal> {
    context(
        "expected literal",
        ws(alt((
            map(alt((quoted_string('\''), quoted_string('"'))), Literal::String),
            number,
            value(Literal::Bool(true), keyword("true")),
            value(Literal::Bool(false), keyword("false")),
            value(Literal::Null, keyword("null")),
            map(list, Literal::List),
        ))),
    )
    .parse(input)
}

fn property_map(input: &str) -> Res<'_, Vec<(String, Literal)>> {
    preceded(
        symbol('{'),
        cut(terminated(
            separated_list0(
                symbol(','),
                separated_pair(identifier, cut(symbol(':')), cut(literal)),
            ),
            context("expected '}'", symbol('}')),
        )),
    )
    .parse(input)
}

fn node_pattern(input: &str) -> Res<'_, NodePattern> {
    let (input, _) = context("expected '('", symbol('(')).parse(input)?;
    let (input, var) = opt(identifier).parse(input)?;
    let (input, labels) = many0(preceded(symbol(':'), cut(identifier))).parse(input)?;
    let (input, properties) = opt(property_map).parse(input)?;
    let (input, _) = cut(context("expected ')'", symbol(')'))).parse(input)?;
    Ok((
        input,
        NodePattern {
            var,
            labels,
            properties: properties.unwrap_or_default(),
        },
    ))
}

/// `*`, `*n`, `*min..`, `*..max` or `*min..max`
fn hop_range(input: &str) -> Res<'_, (usize, Option<usize>)> {
    let (input, min) = opt(unsigned).parse(input)?;
    let (input, range) = opt(preceded(ws(tag("..")), opt(unsigned))).parse(input)?;
    let Some(max) = range else {
        return Ok((input, min.map_or((1, None), |n| (n, Some(n)))));
    };

    let min = min.unwrap_or(1);
    if max.map_or(false, |max| max < min) {
        return Err(nom::Err::Failure(SyntaxError {
            input,
            context: Some("empty hop range"),
        }));
    }
    Ok((input, (min, max)))
}

fn rel_pattern(input: &str) -> Res<'_, RelPattern> {
    let (input, incoming) = opt(symbol('<')).parse(input)?;
    let (input, _) = symbol('-').parse(input)?;

    let mut rel = RelPattern {
        var: None,
        types: Vec::new(),
        direction: Direction::Both,
        length: None,
        properties: Vec::new(),
    };

    let (input, bracket) = opt(symbol('[')).parse(input)?;
    let input = if bracket.is_some() {
        let (input, var) = opt(identifier).parse(input)?;
        // `:A|:B` is accepted as well as `:A|B`
        let (input, types) = opt(preceded(
            symbol(':'),
            cut(separated_list1(
                symbol('|'),
                preceded(opt(symbol(':')), identifier),
            )),
        ))
        .parse(input)?;
        let (input, length) = opt(preceded(symbol('*'), cut(hop_range))).parse(input)?;
        let (input, properties) = opt(property_map).parse(input)?;
        let (input, _) = cut(context("expected ']'", symbol(']'))).parse(input)?;

        rel.var = var;
        rel.types = types.unwrap_or_default();
        rel.length = length;
        rel.properties = properties.unwrap_or_default();
        input
    } else {
        input
    };

    let (input, _) = cut(context("expected '-'", symbol('-'))).parse(input)?;
    let (input, outgoing) = opt(symbol('>')).parse(input)?;

    rel.direction = match (incoming.is_some(), outgoing.is_some()) {
        (true, false) => Direction::Incoming,
        (false, true) => Direction::Outgoing,
        (false, false) => Direction::Both,
        (true, true) => {
            return Err(nom::Err::Failure(SyntaxError {
                input,
                context: Some("relationship cannot point both ways"),
            }))
        }
    };
    Ok((input, rel))
}

fn pattern_part(input: &str) -> Res<'_, PatternPart> {
    let (input, path_var) = opt(terminated(identifier, symbol('='))).parse(input)?;
    let (input, start) = node_pattern(input)?;
    let (input, chain) = many0(pair(rel_pattern, cut(node_pattern))).parse(input)?;
    Ok((
        input,
        PatternPart {
            path_var,
            start,
            chain,
        },
    ))
}

fn match_clause(input: &str) -> Res<'_, Vec<PatternPart>> {
    preceded(
        keyword("MATCH"),
        cut(separated_list1(symbol(','), pattern_part)),
    )
    .parse(input)
}

fn condition(input: &str) -> Res<'_, Condition> {
    let (input, (var, _, key)) = (identifier, cut(symbol('.')), cut(identifier)).parse(input)?;

    let (input, values) =
        opt(preceded(keyword("IN"), cut(context("IN expects a list", list)))).parse(input)?;
    if let Some(values) = values {
        return Ok((input, Condition::In { var, key, values }));
    }

    let (input, op) = cut(context(
        "expected =, <> or IN",
        ws(alt((
            value(CompareOp::Ne, tag("<>")),
            value(CompareOp::Eq, tag("=")),
        ))),
    ))
    .parse(input)?;
    let (input, value) = cut(literal).parse(input)?;
    Ok((input, Condition::Compare { var, key, op, value }))
}

fn return_item(input: &str) -> Res<'_, ReturnItem> {
    alt((
        value(ReturnItem::All, symbol('*')),
        map(
            (
                identifier,
                opt(preceded(symbol('.'), cut(identifier))),
                opt(preceded(keyword("AS"), cut(identifier))),
            ),
            |(var, key, alias)| match key {
                Some(key) => ReturnItem::Property { var, key, alias },
                None => ReturnItem::Var { name: var, alias },
            },
        ),
    ))
    .parse(input)
}

fn query(input: &str) -> Res<'_, Query> {
    let (input, clauses) = context("expected MATCH", many1(match_clause)).parse(input)?;
    let (input, conditions) =
        opt(preceded(keyword("WHERE"), cut(separated_list1(keyword("AND"), condition))))
            .parse(input)?;
    let (input, _) = context("expected RETURN", keyword("RETURN")).parse(input)?;
    let (input, distinct) = opt(keyword("DISTINCT")).parse(input)?;
    let (input, items) = cut(context(
        "expected return item",
        separated_list1(symbol(','), return_item),
    ))
    .parse(input)?;
    let (input, limit) = opt(preceded(
        keyword("LIMIT"),
        cut(context("LIMIT expects a non-negative integer", unsigned)),
    ))
    .parse(input)?;

    Ok((
        input,
        Query {
            parts: clauses.into_iter().flatten().collect(),
            conditions: conditions.unwrap_or_default(),
            distinct: distinct.is_some(),
            items,
            limit,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_match_all() {
        let query = parse("MATCH (n) RETURN n").unwrap();
        assert_eq!(query.parts.len(), 1);
        assert_eq!(query.parts[0].start.var.as_deref(), Some("n"));
        assert!(query.parts[0].chain.is_empty());
        assert_eq!(query.items[0].column(), "n");
    }

    #[test]
    fn test_parse_alternation_and_direction() {
        let query = parse("MATCH (n)<-[r:foo|:fizz]-(m:Class) RETURN n, r, m").unwrap();
        let (rel, node) = &query.parts[0].chain[0];
        assert_eq!(rel.var.as_deref(), Some("r"));
        assert_eq!(rel.types, vec!["foo", "fizz"]);
        assert_eq!(rel.direction, Direction::Incoming);
        assert_eq!(rel.length, None);
        assert_eq!(node.labels, vec!["Class"]);
    }

    #[test]
    fn test_parse_variable_length() {
        let cases = [
            ("*", (1, None)),
            ("*2", (2, Some(2))),
            ("*1..3", (1, Some(3))),
            ("*..4", (1, Some(4))),
            ("*0..", (0, None)),
        ];
        for (suffix, expected) in cases {
            let query = parse(&format!("MATCH (a)-[r:x{suffix}]->(b) RETURN r")).unwrap();
            assert_eq!(query.parts[0].chain[0].0.length, Some(expected), "{suffix}");
        }
    }

    #[test]
    fn test_parse_properties_and_where() {
        let query = parse(
            "MATCH p = (n:Class {fragment: 'foo', depth: -2})-->(m) \
             WHERE m.fragment IN ['a', \"b\"] AND n.iri <> 'x' \
             RETURN DISTINCT m.fragment AS name LIMIT 5",
        )
        .unwrap();

        let part = &query.parts[0];
        assert_eq!(part.path_var.as_deref(), Some("p"));
        assert_eq!(
            part.start.properties,
            vec![
                ("fragment".to_string(), Literal::String("foo".to_string())),
                ("depth".to_string(), Literal::Integer(-2)),
            ]
        );
        assert_eq!(part.chain[0].0.direction, Direction::Outgoing);
        assert_eq!(query.conditions.len(), 2);
        assert!(query.distinct);
        assert_eq!(query.items[0].column(), "name");
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn test_backticks_and_escapes() {
        let query =
            parse(r"MATCH (p {`frag ment`: 'it\'s'})<-[:`sub-type`]-(c) RETURN c").unwrap();
        assert_eq!(query.parts[0].start.properties[0].0, "frag ment");
        assert_eq!(
            query.parts[0].start.properties[0].1,
            Literal::String("it's".to_string())
        );
        assert_eq!(query.parts[0].chain[0].0.types, vec!["sub-type"]);
    }

    #[test]
    fn test_doubled_backtick_in_quoted_name() {
        let query = parse("MATCH (n)-[r:`it``s`|`plain`]-(m) RETURN r").unwrap();
        assert_eq!(query.parts[0].chain[0].0.types, vec!["it`s", "plain"]);
    }

    #[test]
    fn test_lowercase_keywords_and_multiple_parts() {
        let query = parse(
            "match (a {flag: true, score: 1.5, gone: null}), (b) \
             match (c) where c.tags in [1, 2] return a, b, c.tags",
        )
        .unwrap();
        assert_eq!(query.parts.len(), 3);
        assert_eq!(
            query.parts[0].start.properties,
            vec![
                ("flag".to_string(), Literal::Bool(true)),
                ("score".to_string(), Literal::Float(1.5)),
                ("gone".to_string(), Literal::Null),
            ]
        );
        assert_eq!(
            query.conditions,
            vec![Condition::In {
                var: "c".to_string(),
                key: "tags".to_string(),
                values: vec![Literal::Integer(1), Literal::Integer(2)],
            }]
        );
        assert_eq!(query.items[2].column(), "c.tags");
    }

    #[test]
    fn test_keyword_prefix_is_an_identifier() {
        let query = parse("MATCH (matches) RETURN matches AS returned").unwrap();
        assert_eq!(query.parts[0].start.var.as_deref(), Some("matches"));
        assert_eq!(query.items[0].column(), "returned");
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("RETURN n").is_err());
        assert!(parse("MATCH (n RETURN n").is_err());
        assert!(parse("MATCH (n)-[:foo!]-(m) RETURN n").is_err());
        assert!(parse("MATCH (n)<-[r]->(m) RETURN n").is_err());
        assert!(parse("MATCH (n) RETURN n extra").is_err());

        let err = parse("MATCH (n {a: 'unterminated}) RETURN n").unwrap_err();
        assert!(err.message.contains("unterminated string literal"), "{err}");
        assert_eq!(err.offset, 37);

        let err = parse("MATCH (n RETURN n").unwrap_err();
        assert!(err.message.contains("expected ')'"), "{err}");
        assert_eq!(err.offset, 9);

        let err = parse("MATCH (a)-[:x*3..1]->(b) RETURN a").unwrap_err();
        assert!(err.message.contains("empty hop range"), "{err}");
    }
}
