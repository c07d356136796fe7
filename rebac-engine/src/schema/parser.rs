//! Parser for the schema DSL.
//!
//! ```text
//! model
//!   schema 1.1
//!
//! type user
//!
//! type folder
//!   relations
//!     define parent: [folder]
//!     define read: [user, team#member] or read from parent
//!
//! condition group_filter(requested_group: string, resource_group: string) {
//!   requested_group == resource_group
//! }
//! ```
//!
//! Each `define` holds a single-line expression: terms joined by `or`, where a
//! term is a direct subject set, a relation on the same object, or
//! `relation from hierarchy_relation`.

use super::{
    ConditionDeclaration, RelationDefinition, RelationExpr, SchemaDefinition, SubjectSpec,
    TypeDefinition,
};
use crate::condition::ParamType;
use crate::error::SchemaError;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace1, satisfy, space0, space1},
    combinator::{all_consuming, cut, map, map_opt, not, opt, peek, recognize, value},
    error::{context, ErrorKind, ParseError, VerboseError, VerboseErrorKind},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use std::collections::BTreeMap;

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

const RESERVED_KEYWORDS: &[&str] = &[
    "type",
    "relations",
    "define",
    "or",
    "and",
    "but",
    "not",
    "from",
    "with",
    "condition",
    "this",
];

enum Item {
    Type(TypeDefinition),
    Condition(ConditionDraft),
}

/// A condition as written, before its parameter list is checked
struct ConditionDraft {
    name: String,
    parameters: Vec<(String, ParamType)>,
    expression: String,
}

impl ConditionDraft {
    fn into_declaration(self) -> Result<ConditionDeclaration, SchemaError> {
        let ConditionDraft {
            name,
            parameters: declared,
            expression,
        } = self;

        let mut parameters = BTreeMap::new();
        for (parameter, param_type) in declared {
            if parameters.contains_key(&parameter) {
                return Err(SchemaError::InvalidCondition {
                    name,
                    message: format!("parameter '{}' is declared more than once", parameter),
                });
            }
            parameters.insert(parameter, param_type);
        }

        Ok(ConditionDeclaration {
            name,
            parameters,
            expression,
        })
    }
}

/// Parse DSL source into an uncompiled schema definition
pub fn parse_schema(source: &str) -> Result<SchemaDefinition, SchemaError> {
    let items = match all_consuming(schema)(source) {
        Ok((_, items)) => items,
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => {
            return Err(to_schema_error(source, &err))
        }
        Err(nom::Err::Incomplete(_)) => {
            return Err(SchemaError::Parse {
                line: 0,
                column: 0,
                message: "incomplete input".to_string(),
            })
        }
    };

    let mut definition = SchemaDefinition::default();
    for item in items {
        match item {
            Item::Type(type_def) => definition.types.push(type_def),
            Item::Condition(draft) => definition.conditions.push(draft.into_declaration()?),
        }
    }
    Ok(definition)
}

fn to_schema_error(source: &str, err: &VerboseError<&str>) -> SchemaError {
    let Some((remaining, _)) = err.errors.first() else {
        return SchemaError::Parse {
            line: 0,
            column: 0,
            message: "invalid schema".to_string(),
        };
    };

    let offset = source.len().saturating_sub(remaining.len());
    let consumed = source.get(..offset).unwrap_or_default();
    let line = consumed.matches('\n').count() + 1;
    let column = consumed
        .rfind('\n')
        .map_or(consumed.chars().count(), |pos| {
            consumed.get(pos + 1..).unwrap_or_default().chars().count()
        })
        + 1;

    let expected = err.errors.iter().find_map(|(_, kind)| match kind {
        VerboseErrorKind::Context(ctx) => Some(*ctx),
        _ => None,
    });
    let near: String = remaining
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .chars()
        .take(24)
        .collect();
    let message = match (expected, near.is_empty()) {
        (Some(ctx), false) => format!("invalid {} near '{}'", ctx, near),
        (Some(ctx), true) => format!("invalid {} at end of input", ctx),
        (None, false) => format!("unexpected input near '{}'", near),
        (None, true) => "unexpected end of input".to_string(),
    };

    SchemaError::Parse {
        line,
        column,
        message,
    }
}

fn comment(input: &str) -> Res<'_, ()> {
    value((), pair(char('#'), take_while(|c| c != '\n' && c != '\r')))(input)
}

/// Whitespace, newlines and comments
fn ws(input: &str) -> Res<'_, ()> {
    value((), many0(alt((value((), multispace1), comment))))(input)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn identifier(input: &str) -> Res<'_, &str> {
    let (rest, id) = take_while1(is_ident_char)(input)?;
    if RESERVED_KEYWORDS.contains(&id) {
        return Err(nom::Err::Error(VerboseError::from_error_kind(
            input,
            ErrorKind::Tag,
        )));
    }
    Ok((rest, id))
}

/// A keyword that is not the prefix of a longer identifier
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> Res<'a, &'a str> {
    terminated(tag(kw), not(peek(satisfy(is_ident_char))))
}

fn header(input: &str) -> Res<'_, ()> {
    value(
        (),
        tuple((
            keyword("model"),
            ws,
            keyword("schema"),
            space1,
            take_while1(|c: char| c.is_ascii_digit() || c == '.'),
        )),
    )(input)
}

/// `user`, `team#member`, `user with group_filter`
fn subject_spec(input: &str) -> Res<'_, SubjectSpec> {
    map(
        tuple((
            identifier,
            opt(preceded(char('#'), identifier)),
            opt(preceded(tuple((space1, keyword("with"), space1)), identifier)),
        )),
        |(subject_type, relation, condition)| SubjectSpec {
            subject_type: subject_type.to_string(),
            relation: relation.map(str::to_string),
            condition: condition.map(str::to_string),
        },
    )(input)
}

fn direct_set(input: &str) -> Res<'_, RelationExpr> {
    context(
        "subject set",
        map(
            delimited(
                pair(char('['), space0),
                cut(separated_list1(
                    tuple((space0, char(','), space0)),
                    subject_spec,
                )),
                cut(pair(space0, char(']'))),
            ),
            RelationExpr::direct,
        ),
    )(input)
}

fn tuple_to_userset(input: &str) -> Res<'_, RelationExpr> {
    map(
        tuple((identifier, space1, keyword("from"), space1, cut(identifier))),
        |(computed, _, _, _, tupleset)| RelationExpr::tuple_to_userset(tupleset, computed),
    )(input)
}

fn term(input: &str) -> Res<'_, RelationExpr> {
    alt((
        direct_set,
        tuple_to_userset,
        map(identifier, RelationExpr::computed),
    ))(input)
}

fn expression(input: &str) -> Res<'_, RelationExpr> {
    context(
        "relation expression",
        map(
            separated_list1(tuple((space1, keyword("or"), space1)), term),
            |mut terms| {
                if terms.len() == 1 {
                    terms.remove(0)
                } else {
                    RelationExpr::union(terms)
                }
            },
        ),
    )(input)
}

fn define(input: &str) -> Res<'_, RelationDefinition> {
    preceded(
        pair(keyword("define"), space1),
        context(
            "relation definition",
            cut(map(
                tuple((identifier, space0, char(':'), space0, expression)),
                |(name, _, _, _, expression)| RelationDefinition {
                    name: name.to_string(),
                    expression,
                },
            )),
        ),
    )(input)
}

fn type_def(input: &str) -> Res<'_, TypeDefinition> {
    map(
        preceded(
            pair(keyword("type"), space1),
            context(
                "type definition",
                cut(pair(
                    identifier,
                    opt(preceded(
                        tuple((ws, keyword("relations"), ws)),
                        many0(terminated(define, ws)),
                    )),
                )),
            ),
        ),
        |(name, relations)| TypeDefinition {
            name: name.to_string(),
            relations: relations.unwrap_or_default(),
        },
    )(input)
}

fn param_type(input: &str) -> Res<'_, ParamType> {
    map_opt(
        recognize(pair(
            take_while1(is_ident_char),
            opt(delimited(char('<'), take_while1(|c| c != '>'), char('>'))),
        )),
        ParamType::parse,
    )(input)
}

fn parameter(input: &str) -> Res<'_, (String, ParamType)> {
    map(
        tuple((identifier, space0, char(':'), space0, param_type)),
        |(name, _, _, _, param_type)| (name.to_string(), param_type),
    )(input)
}

/// Body of a condition: everything between balanced braces, skipping braces
/// inside string literals
fn braced_body(input: &str) -> Res<'_, &str> {
    let (body_start, _) = char('{')(input)?;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (index, c) in body_start.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' if depth == 0 => {
                let body = body_start.get(..index).unwrap_or_default();
                let rest = body_start.get(index + 1..).unwrap_or_default();
                return Ok((rest, body.trim()));
            }
            '}' => depth -= 1,
            _ => {}
        }
    }

    Err(nom::Err::Failure(VerboseError::from_error_kind(
        input,
        ErrorKind::TakeUntil,
    )))
}

fn condition_def(input: &str) -> Res<'_, ConditionDraft> {
    map(
        preceded(
            pair(keyword("condition"), space1),
            context(
                "condition definition",
                cut(tuple((
                    identifier,
                    space0,
                    delimited(
                        pair(char('('), space0),
                        separated_list0(tuple((space0, char(','), space0)), parameter),
                        pair(space0, char(')')),
                    ),
                    ws,
                    braced_body,
                ))),
            ),
        ),
        |(name, _, parameters, _, body)| ConditionDraft {
            name: name.to_string(),
            parameters,
            expression: body.to_string(),
        },
    )(input)
}

fn item(input: &str) -> Res<'_, Item> {
    alt((
        map(type_def, Item::Type),
        map(condition_def, Item::Condition),
    ))(input)
}

fn schema(input: &str) -> Res<'_, Vec<Item>> {
    preceded(
        tuple((ws, opt(header), ws)),
        many0(terminated(item, ws)),
    )(input)
}
