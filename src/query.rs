//! # Dynamic Query Builder
//!
//! Translates a flat parameter map plus an operator map into SQL filter
//! clauses with named bound parameters. This is the data-access layer's
//! filtering/pagination surface: callers pass the raw query parameters they
//! accepted from a request and an operator map describing how each key maps
//! to SQL, and get back a clause string plus the bound-parameter map to hand
//! to the store.
//!
//! ## Injection defense
//!
//! No parameter value is ever interpolated into the SQL text. Every value
//! travels through the bound-parameter map, with synthetic names minted for
//! expanded `IN` lists (`key0`, `key1`, …) and `BETWEEN` bounds (`key_1`,
//! `key_2`). The only text that reaches the SQL string directly is column
//! names and limit/offset counts from the operator map, and those are
//! validated against an identifier whitelist / parsed as unsigned integers
//! before emission.
//!
//! ## Operators
//!
//! Operator strings are parsed into the closed [`Operator`] enum up front;
//! an unrecognized operator is a hard error, never silently dropped. Keys
//! starting with `__` are directives that shape the query tail and are
//! applied in a fixed order regardless of map iteration order:
//! `IS NULL` → `IS NOT NULL` → `ORDER BY … ASC` → `ORDER BY … DESC` →
//! `LIMIT` → `OFFSET`.
//!
//! ## Example
//!
//! ```rust
//! use servkit::query::translate;
//! use std::collections::HashMap;
//!
//! let mut params = serde_json::Map::new();
//! params.insert("status".into(), "created".into());
//! let mut operators = HashMap::new();
//! operators.insert("__limit".to_string(), "1".to_string());
//!
//! let (sql, bound) = translate("SELECT * FROM orders WHERE 1=1 ", &params, &operators).unwrap();
//! assert_eq!(sql, "SELECT * FROM orders WHERE 1=1 AND status = :status\nLIMIT 1\n");
//! assert_eq!(bound["status"], "created");
//! ```

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Parameter / bound-parameter map. `serde_json::Map` iterates in key order,
/// so clause emission is deterministic for a given input.
pub type Params = serde_json::Map<String, Value>;

/// Operator map: parameter key (or `__` directive) to operator string.
pub type Operators = HashMap<String, String>;

/// Errors raised while translating a parameter map into SQL clauses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// An `IN` expansion over an empty sequence is ambiguous (match all?
    /// match none?) and is rejected outright.
    #[error("empty IN-list for parameter '{key}'")]
    EmptyInList { key: String },

    /// `IN` list elements must be scalars.
    #[error("non-scalar element in IN-list for parameter '{key}'")]
    NonScalarListElement { key: String },

    /// A `between` value must be a string with exactly one comma.
    #[error("malformed between value for parameter '{key}'")]
    MalformedBetween { key: String },

    /// The operator string did not parse into a known operator.
    #[error("unknown operator '{operator}' for parameter '{key}'")]
    UnknownOperator { key: String, operator: String },

    /// A directive payload failed validation (bad count, bad identifier).
    #[error("invalid payload '{value}' for directive '{directive}'")]
    InvalidDirective { directive: String, value: String },
}

/// Closed set of per-parameter comparison operators.
///
/// Parsing is exhaustive: anything outside this set is an
/// [`QueryError::UnknownOperator`], caught before any SQL is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    NotEq,
    Lte,
    Lt,
    Gte,
    Gt,
    Like,
    Between,
}

impl Operator {
    fn parse(s: &str) -> Option<Operator> {
        match s {
            "!=" => Some(Operator::NotEq),
            "<=" => Some(Operator::Lte),
            "<" => Some(Operator::Lt),
            ">=" => Some(Operator::Gte),
            ">" => Some(Operator::Gt),
            "like" => Some(Operator::Like),
            "between" => Some(Operator::Between),
            _ => None,
        }
    }

    /// SQL spelling for the simple comparison operators.
    fn sql(self) -> &'static str {
        match self {
            Operator::NotEq => "!=",
            Operator::Lte => "<=",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Gt => ">",
            Operator::Like => "like",
            // Between is expanded into two clauses, never spelled inline.
            Operator::Between => "between",
        }
    }
}

/// Query-tail directives, applied after all per-parameter clauses in this
/// exact order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    IsNull,
    IsNotNull,
    OrderByAsc,
    OrderByDesc,
    Limit,
    Offset,
}

impl Directive {
    /// Fixed application order, independent of operator-map iteration.
    const ORDER: [Directive; 6] = [
        Directive::IsNull,
        Directive::IsNotNull,
        Directive::OrderByAsc,
        Directive::OrderByDesc,
        Directive::Limit,
        Directive::Offset,
    ];

    fn key(self) -> &'static str {
        match self {
            Directive::IsNull => "__is_null",
            Directive::IsNotNull => "__is_not_null",
            Directive::OrderByAsc => "__order_by_asc",
            Directive::OrderByDesc => "__order_by_desc",
            Directive::Limit => "__limit",
            Directive::Offset => "__offset",
        }
    }

    fn render(self, sql: &mut String, raw: &str) -> Result<(), QueryError> {
        match self {
            Directive::IsNull => {
                for column in split_columns(self, raw)? {
                    sql.push_str(&format!("AND {column} IS NULL\n"));
                }
            }
            Directive::IsNotNull => {
                for column in split_columns(self, raw)? {
                    sql.push_str(&format!("AND {column} IS NOT NULL\n"));
                }
            }
            Directive::OrderByAsc => {
                let columns = split_columns(self, raw)?.join(", ");
                sql.push_str(&format!("ORDER BY {columns} ASC\n"));
            }
            Directive::OrderByDesc => {
                let columns = split_columns(self, raw)?.join(", ");
                sql.push_str(&format!("ORDER BY {columns} DESC\n"));
            }
            Directive::Limit => {
                let n = parse_count(self, raw)?;
                sql.push_str(&format!("LIMIT {n}\n"));
            }
            Directive::Offset => {
                let n = parse_count(self, raw)?;
                sql.push_str(&format!("OFFSET {n}\n"));
            }
        }
        Ok(())
    }
}

/// Column names reaching the SQL text directly must look like identifiers.
fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn split_columns(directive: Directive, raw: &str) -> Result<Vec<&str>, QueryError> {
    let columns: Vec<&str> = raw.split(',').map(str::trim).collect();
    if columns.is_empty() || columns.iter().any(|c| !is_identifier(c)) {
        return Err(QueryError::InvalidDirective {
            directive: directive.key().to_string(),
            value: raw.to_string(),
        });
    }
    Ok(columns)
}

fn parse_count(directive: Directive, raw: &str) -> Result<u64, QueryError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| QueryError::InvalidDirective {
            directive: directive.key().to_string(),
            value: raw.to_string(),
        })
}

fn is_scalar(value: &Value) -> bool {
    matches!(
        value,
        Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null
    )
}

/// Translate a parameter map and operator map into SQL clauses appended to
/// `base_sql`, plus the bound-parameter map.
///
/// Every emitted clause ends with a newline. Per-parameter clauses come
/// first (in parameter-map key order), then the tail directives in their
/// fixed order.
///
/// # Arguments
///
/// * `base_sql` - Base query text the clauses are appended to verbatim
/// * `params` - Parameter key → value; values end up in the bound map only
/// * `operators` - Parameter key → operator string, plus `__` directives
///
/// # Errors
///
/// Returns a [`QueryError`] for an empty `IN` list, a malformed `between`
/// value, an unknown operator, or an invalid directive payload. Nothing is
/// ever silently dropped.
pub fn translate(
    base_sql: &str,
    params: &Params,
    operators: &Operators,
) -> Result<(String, Params), QueryError> {
    let mut sql = String::from(base_sql);
    let mut bound = params.clone();

    for (key, value) in params {
        match operators.get(key) {
            None => match value {
                Value::Array(items) => {
                    if items.is_empty() {
                        return Err(QueryError::EmptyInList { key: key.clone() });
                    }
                    // Expand into one synthetic bound parameter per element;
                    // the original key must not leak into the bound set.
                    bound.remove(key);
                    let mut placeholders = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        if !is_scalar(item) {
                            return Err(QueryError::NonScalarListElement { key: key.clone() });
                        }
                        let name = format!("{key}{i}");
                        placeholders.push(format!(":{name}"));
                        bound.insert(name, item.clone());
                    }
                    sql.push_str(&format!("AND {key} IN ({})\n", placeholders.join(", ")));
                }
                _ => {
                    sql.push_str(&format!("AND {key} = :{key}\n"));
                }
            },
            Some(op_str) => {
                let op = Operator::parse(op_str).ok_or_else(|| QueryError::UnknownOperator {
                    key: key.clone(),
                    operator: op_str.clone(),
                })?;
                match op {
                    Operator::Between => {
                        let s = value
                            .as_str()
                            .ok_or_else(|| QueryError::MalformedBetween { key: key.clone() })?;
                        if s.matches(',').count() != 1 {
                            return Err(QueryError::MalformedBetween { key: key.clone() });
                        }
                        let (low, high) = s
                            .split_once(',')
                            .ok_or_else(|| QueryError::MalformedBetween { key: key.clone() })?;
                        bound.remove(key);
                        bound.insert(format!("{key}_1"), Value::String(low.to_string()));
                        bound.insert(format!("{key}_2"), Value::String(high.to_string()));
                        sql.push_str(&format!("AND {key} >= :{key}_1\n"));
                        sql.push_str(&format!("AND {key} <= :{key}_2\n"));
                    }
                    simple => {
                        sql.push_str(&format!("AND {key} {} :{key}\n", simple.sql()));
                    }
                }
            }
        }
    }

    for directive in Directive::ORDER {
        if let Some(raw) = operators.get(directive.key()) {
            directive.render(&mut sql, raw)?;
        }
    }

    debug!(
        clause_bytes = sql.len() - base_sql.len(),
        bound_params = bound.len(),
        "Query translated"
    );

    Ok((sql, bound))
}
