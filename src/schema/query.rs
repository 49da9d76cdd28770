//! Minimal GraphQL document parser.
//!
//! Covers what subscription clients send in practice: `query` and
//! `subscription` operations (named or anonymous), variable definitions
//! with defaults, aliases, arguments and nested selection sets. Fragments,
//! directives and mutations are rejected.

use std::iter::Peekable;
use std::str::Chars;

use serde_json::{Map, Number, Value};

use crate::executor::GraphQLError;

/// Kind of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// `query` or an anonymous selection set.
    Query,
    /// `subscription`.
    Subscription,
}

/// Parsed GraphQL document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Operations in source order.
    pub operations: Vec<OperationDefinition>,
}

/// One operation of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDefinition {
    /// Operation kind.
    pub kind: OperationKind,
    /// Operation name, if given.
    pub name: Option<String>,
    /// Declared variables.
    pub variables: Vec<VariableDefinition>,
    /// Top-level selection set.
    pub selection_set: Vec<Field>,
}

/// A declared variable and its default value.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    /// Name without the leading `$`.
    pub name: String,
    /// Default value, if declared.
    pub default: Option<InputValue>,
}

/// A selected field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Alias, if given.
    pub alias: Option<String>,
    /// Field name.
    pub name: String,
    /// Arguments in source order.
    pub arguments: Vec<(String, InputValue)>,
    /// Sub-selection; empty for leaf fields.
    pub selection_set: Vec<Field>,
}

/// Argument or default value as written in the document.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    /// `null`.
    Null,
    /// `true` / `false`.
    Boolean(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal.
    String(String),
    /// Enum value.
    Enum(String),
    /// `[...]`.
    List(Vec<InputValue>),
    /// `{...}`.
    Object(Vec<(String, InputValue)>),
    /// `$name`.
    Variable(String),
}

impl InputValue {
    /// Converts to JSON, substituting variables from `variables`.
    ///
    /// Unknown variables become `null`.
    #[must_use]
    pub fn to_value(&self, variables: &Map<String, Value>) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Boolean(b) => Value::Bool(*b),
            Self::Int(n) => Value::Number((*n).into()),
            Self::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::String(s) | Self::Enum(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(|v| v.to_value(variables)).collect()),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value(variables)))
                    .collect(),
            ),
            Self::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        }
    }
}

impl Field {
    /// Key under which the field appears in the response.
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Argument values with variables substituted.
    #[must_use]
    pub fn argument_values(&self, variables: &Map<String, Value>) -> Map<String, Value> {
        self.arguments
            .iter()
            .map(|(name, value)| (name.clone(), value.to_value(variables)))
            .collect()
    }
}

impl OperationDefinition {
    /// Merges provided variables with declared defaults.
    #[must_use]
    pub fn coerce_variables(&self, provided: &Map<String, Value>) -> Map<String, Value> {
        let mut values = provided.clone();
        for definition in &self.variables {
            if values.get(&definition.name).is_none_or(Value::is_null)
                && let Some(default) = &definition.default
            {
                values.insert(definition.name.clone(), default.to_value(&Map::new()));
            }
        }
        values
    }
}

impl Document {
    /// Picks the operation to run.
    ///
    /// # Errors
    ///
    /// Fails if `name` matches no operation, or if `name` is `None` and the
    /// document holds more than one operation.
    pub fn operation(&self, name: Option<&str>) -> Result<&OperationDefinition, GraphQLError> {
        match name {
            Some(name) => self
                .operations
                .iter()
                .find(|op| op.name.as_deref() == Some(name))
                .ok_or_else(|| GraphQLError::new(format!("Unknown operation named \"{name}\"."))),
            None => match self.operations.as_slice() {
                [only] => Ok(only),
                _ => Err(GraphQLError::new(
                    "Must provide operation name if query contains multiple operations.",
                )),
            },
        }
    }
}

/// Parses a GraphQL document.
///
/// # Errors
///
/// Returns a `Syntax Error` for malformed input and an error naming the
/// feature for unsupported constructs.
pub fn parse(source: &str) -> Result<Document, GraphQLError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let mut operations = Vec::new();
    while parser.peek().is_some() {
        operations.push(parser.operation()?);
    }
    if operations.is_empty() {
        return Err(syntax("document contains no operations"));
    }
    Ok(Document { operations })
}

fn syntax(message: impl AsRef<str>) -> GraphQLError {
    GraphQLError::new(format!("Syntax Error: {}", message.as_ref()))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Punct(char),
    Spread,
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Punct(c) => format!("`{c}`"),
            Self::Spread => "`...`".to_string(),
            Self::Name(name) => format!("name `{name}`"),
            Self::Int(n) => format!("integer {n}"),
            Self::Float(f) => format!("float {f}"),
            Self::Str(s) => format!("string \"{s}\""),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, GraphQLError> {
    let mut chars = source.chars().peekable();
    let mut tokens = Vec::new();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() || c == ',' || c == '\u{feff}' => {
                chars.next();
            }
            '#' => {
                for c in chars.by_ref() {
                    if c == '\n' || c == '\r' {
                        break;
                    }
                }
            }
            '{' | '}' | '(' | ')' | ':' | '$' | '!' | '=' | '[' | ']' | '@' | '|' | '&' => {
                chars.next();
                tokens.push(Token::Punct(c));
            }
            '.' => {
                for _ in 0..3 {
                    if chars.next() != Some('.') {
                        return Err(syntax("expected `...`"));
                    }
                }
                tokens.push(Token::Spread);
            }
            '"' => {
                chars.next();
                tokens.push(Token::Str(lex_string(&mut chars)?));
            }
            c if c == '-' || c.is_ascii_digit() => tokens.push(lex_number(&mut chars)?),
            c if c == '_' || c.is_ascii_alphabetic() => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '_' || c.is_ascii_alphanumeric() {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Name(name));
            }
            other => return Err(syntax(format!("unexpected character `{other}`"))),
        }
    }
    Ok(tokens)
}

fn lex_string(chars: &mut Peekable<Chars<'_>>) -> Result<String, GraphQLError> {
    let mut out = String::new();
    loop {
        match chars.next() {
            None | Some('\n' | '\r') => return Err(syntax("unterminated string")),
            Some('"') => return Ok(out),
            Some('\\') => match chars.next() {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some('/') => out.push('/'),
                Some('b') => out.push('\u{8}'),
                Some('f') => out.push('\u{c}'),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('u') => {
                    let hex: String = chars.by_ref().take(4).collect();
                    let ch = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| syntax(format!("invalid unicode escape `\\u{hex}`")))?;
                    out.push(ch);
                }
                Some(other) => return Err(syntax(format!("invalid escape `\\{other}`"))),
                None => return Err(syntax("unterminated string")),
            },
            Some(c) => out.push(c),
        }
    }
}

fn lex_number(chars: &mut Peekable<Chars<'_>>) -> Result<Token, GraphQLError> {
    let mut text = String::new();
    let mut is_float = false;
    if chars.peek() == Some(&'-') {
        text.push('-');
        chars.next();
    }
    while let Some(&c) = chars.peek() {
        match c {
            '0'..='9' => text.push(c),
            '.' | 'e' | 'E' => {
                is_float = true;
                text.push(c);
            }
            '+' | '-' if text.ends_with(['e', 'E']) => text.push(c),
            _ => break,
        }
        chars.next();
    }
    if is_float {
        text.parse()
            .map(Token::Float)
            .map_err(|_| syntax(format!("invalid number `{text}`")))
    } else {
        text.parse()
            .map(Token::Int)
            .map_err(|_| syntax(format!("invalid number `{text}`")))
    }
}

/// Deepest nesting of selection sets, list or object values and list types.
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, GraphQLError>,
    ) -> Result<T, GraphQLError> {
        if self.depth >= MAX_DEPTH {
            return Err(syntax("query nested too deeply"));
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Result<Token, GraphQLError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| syntax("unexpected end of document"))?;
        self.pos += 1;
        Ok(token)
    }

    fn at_punct(&self, c: char) -> bool {
        self.peek() == Some(&Token::Punct(c))
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.at_punct(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), GraphQLError> {
        match self.advance()? {
            Token::Punct(found) if found == c => Ok(()),
            other => Err(syntax(format!("expected `{c}`, found {}", other.describe()))),
        }
    }

    fn name(&mut self) -> Result<String, GraphQLError> {
        match self.advance()? {
            Token::Name(name) => Ok(name),
            other => Err(syntax(format!("expected a name, found {}", other.describe()))),
        }
    }

    fn reject_directives(&self) -> Result<(), GraphQLError> {
        if self.at_punct('@') {
            return Err(GraphQLError::new("Directives are not supported."));
        }
        Ok(())
    }

    fn operation(&mut self) -> Result<OperationDefinition, GraphQLError> {
        if self.at_punct('{') {
            return Ok(OperationDefinition {
                kind: OperationKind::Query,
                name: None,
                variables: Vec::new(),
                selection_set: self.selection_set()?,
            });
        }

        let kind = match self.advance()? {
            Token::Name(keyword) => match keyword.as_str() {
                "query" => OperationKind::Query,
                "subscription" => OperationKind::Subscription,
                "mutation" => return Err(GraphQLError::new("Mutations are not supported.")),
                "fragment" => return Err(GraphQLError::new("Fragments are not supported.")),
                other => return Err(syntax(format!("unexpected name `{other}`"))),
            },
            other => return Err(syntax(format!("unexpected {}", other.describe()))),
        };

        let name = match self.peek() {
            Some(Token::Name(_)) => Some(self.name()?),
            _ => None,
        };
        let variables = if self.at_punct('(') {
            self.variable_definitions()?
        } else {
            Vec::new()
        };
        self.reject_directives()?;

        Ok(OperationDefinition {
            kind,
            name,
            variables,
            selection_set: self.selection_set()?,
        })
    }

    fn variable_definitions(&mut self) -> Result<Vec<VariableDefinition>, GraphQLError> {
        self.expect_punct('(')?;
        let mut definitions = Vec::new();
        while !self.eat_punct(')') {
            self.expect_punct('$')?;
            let name = self.name()?;
            self.expect_punct(':')?;
            self.type_reference()?;
            let default = if self.eat_punct('=') {
                Some(self.value(true)?)
            } else {
                None
            };
            self.reject_directives()?;
            definitions.push(VariableDefinition { name, default });
        }
        Ok(definitions)
    }

    /// Variable types are not checked, only skipped.
    fn type_reference(&mut self) -> Result<(), GraphQLError> {
        self.nested(|p| {
            if p.eat_punct('[') {
                p.type_reference()?;
                p.expect_punct(']')?;
            } else {
                p.name()?;
            }
            p.eat_punct('!');
            Ok(())
        })
    }

    fn selection_set(&mut self) -> Result<Vec<Field>, GraphQLError> {
        self.nested(|p| {
            p.expect_punct('{')?;
            let mut fields = Vec::new();
            while !p.eat_punct('}') {
                if p.peek() == Some(&Token::Spread) {
                    return Err(GraphQLError::new("Fragments are not supported."));
                }
                fields.push(p.field()?);
            }
            if fields.is_empty() {
                return Err(syntax("selection set must not be empty"));
            }
            Ok(fields)
        })
    }

    fn field(&mut self) -> Result<Field, GraphQLError> {
        let first = self.name()?;
        let (alias, name) = if self.eat_punct(':') {
            (Some(first), self.name()?)
        } else {
            (None, first)
        };

        let mut arguments = Vec::new();
        if self.eat_punct('(') {
            while !self.eat_punct(')') {
                let arg = self.name()?;
                self.expect_punct(':')?;
                arguments.push((arg, self.value(false)?));
            }
        }
        self.reject_directives()?;

        let selection_set = if self.at_punct('{') {
            self.selection_set()?
        } else {
            Vec::new()
        };

        Ok(Field {
            alias,
            name,
            arguments,
            selection_set,
        })
    }

    fn value(&mut self, constant: bool) -> Result<InputValue, GraphQLError> {
        match self.advance()? {
            Token::Punct('$') if !constant => Ok(InputValue::Variable(self.name()?)),
            Token::Int(n) => Ok(InputValue::Int(n)),
            Token::Float(f) => Ok(InputValue::Float(f)),
            Token::Str(s) => Ok(InputValue::String(s)),
            Token::Name(name) => Ok(match name.as_str() {
                "true" => InputValue::Boolean(true),
                "false" => InputValue::Boolean(false),
                "null" => InputValue::Null,
                _ => InputValue::Enum(name),
            }),
            Token::Punct('[') => self.nested(|p| {
                let mut items = Vec::new();
                while !p.eat_punct(']') {
                    items.push(p.value(constant)?);
                }
                Ok(InputValue::List(items))
            }),
            Token::Punct('{') => self.nested(|p| {
                let mut fields = Vec::new();
                while !p.eat_punct('}') {
                    let key = p.name()?;
                    p.expect_punct(':')?;
                    fields.push((key, p.value(constant)?));
                }
                Ok(InputValue::Object(fields))
            }),
            other => Err(syntax(format!("unexpected {}", other.describe()))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_ok(source: &str) -> Document {
        match parse(source) {
            Ok(document) => document,
            Err(e) => panic!("failed to parse {source:?}: {e}"),
        }
    }

    #[test]
    fn parses_anonymous_subscription() {
        let document = parse_ok("subscription{ syncData { field } }");
        let Ok(op) = document.operation(None) else {
            panic!("expected one operation");
        };
        assert_eq!(op.kind, OperationKind::Subscription);
        let [root] = op.selection_set.as_slice() else {
            panic!("expected one root field");
        };
        assert_eq!(root.name, "syncData");
        let [leaf] = root.selection_set.as_slice() else {
            panic!("expected one leaf");
        };
        assert_eq!(leaf.name, "field");
        assert!(leaf.selection_set.is_empty());
    }

    #[test]
    fn shorthand_selection_is_a_query() {
        let document = parse_ok("{ hello }");
        assert_eq!(document.operations.len(), 1);
        assert!(document.operations.iter().all(|op| op.kind == OperationKind::Query));
    }

    #[test]
    fn parses_aliases_arguments_and_variables() {
        let document = parse_ok(
            r#"
            # count down from a variable
            subscription Tick($from: Int = 3, $tags: [String!]) {
                ticks: countdown(from: $from, label: "go\n", mode: FAST, opts: {x: [1, 2.5, null]}) {
                    value
                }
            }
            "#,
        );
        let Ok(op) = document.operation(Some("Tick")) else {
            panic!("named operation not found");
        };
        assert_eq!(op.variables.len(), 2);

        let variables = op.coerce_variables(&Map::new());
        assert_eq!(variables.get("from"), Some(&json!(3)));
        assert!(variables.get("tags").is_none());

        let [field] = op.selection_set.as_slice() else {
            panic!("expected one root field");
        };
        assert_eq!(field.response_key(), "ticks");
        let args = field.argument_values(&variables);
        assert_eq!(args.get("from"), Some(&json!(3)));
        assert_eq!(args.get("label"), Some(&json!("go\n")));
        assert_eq!(args.get("mode"), Some(&json!("FAST")));
        assert_eq!(args.get("opts"), Some(&json!({"x": [1, 2.5, null]})));
    }

    #[test]
    fn provided_variables_override_defaults() {
        let document = parse_ok("subscription ($from: Int = 3) { countdown(from: $from) { value } }");
        let Ok(op) = document.operation(None) else {
            panic!("expected one operation");
        };
        let mut provided = Map::new();
        provided.insert("from".to_string(), json!(5));
        assert_eq!(op.coerce_variables(&provided).get("from"), Some(&json!(5)));
    }

    #[test]
    fn selects_operation_by_name() {
        let document = parse_ok("query A { a } subscription B { b { c } }");
        assert!(document.operation(None).is_err());
        let Ok(op) = document.operation(Some("B")) else {
            panic!("operation B not found");
        };
        assert_eq!(op.kind, OperationKind::Subscription);
        assert!(document.operation(Some("C")).is_err());
    }

    #[test]
    fn rejects_unsupported_constructs() {
        for source in [
            "mutation { a }",
            "fragment F on T { a }",
            "{ ...F }",
            "{ a @skip(if: true) }",
        ] {
            assert!(parse(source).is_err(), "{source} should be rejected");
        }
    }

    #[test]
    fn reports_syntax_errors() {
        for source in ["", "subscription {", "{ }", "{ a(b: ) }", "{ a } }", "{ \"open }"] {
            let Err(error) = parse(source) else {
                panic!("{source:?} should not parse");
            };
            assert!(error.message.starts_with("Syntax Error"), "{}", error.message);
        }
    }

    fn assert_too_deep(source: &str) {
        let Err(error) = parse(source) else {
            panic!("deeply nested document should not parse");
        };
        assert!(error.message.contains("nested too deeply"), "{}", error.message);
    }

    #[test]
    fn rejects_deeply_nested_values() {
        let depth = 100_000;
        assert_too_deep(&format!(
            "subscription {{ a(x: {}1{}) {{ b }} }}",
            "[".repeat(depth),
            "]".repeat(depth)
        ));
        assert_too_deep(&format!(
            "subscription {{ a(x: {}1{}) {{ b }} }}",
            "{k: ".repeat(depth),
            "}".repeat(depth)
        ));
    }

    #[test]
    fn rejects_deeply_nested_selections_and_types() {
        let depth = 100_000;
        assert_too_deep(&format!(
            "subscription {}b{}",
            "{ a ".repeat(depth),
            " }".repeat(depth)
        ));
        assert_too_deep(&format!(
            "subscription ($v: {}Int{}) {{ a }}",
            "[".repeat(depth),
            "]".repeat(depth)
        ));
    }

    #[test]
    fn moderate_nesting_still_parses() {
        let source = format!(
            "subscription {{ a(x: {}1{}) {{ b }} }}",
            "[".repeat(32),
            "]".repeat(32)
        );
        parse_ok(&source);
    }
}
