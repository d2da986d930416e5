//! Parameter binding utilities for database queries.
//!
//! Named `:name` placeholders, and `?` placeholders on PostgreSQL, are rewritten
//! into the positional form each driver understands before the statement is
//! prepared; the bind functions then attach
//! `QueryParam` values to database-specific query objects.

use crate::db::DatabaseType;
use crate::error::{DbError, DbResult};
use crate::models::{Params, QueryParam};
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

/// A statement ready to prepare: SQL in driver placeholder syntax plus the values
/// to bind, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement<'a> {
    pub sql: Cow<'a, str>,
    pub values: Vec<QueryParam>,
}

/// Resolve `params` against `sql` for the given backend.
pub fn bind_statement(sql: &str, params: Params, db: DatabaseType) -> DbResult<BoundStatement<'_>> {
    match params {
        Params::None => Ok(BoundStatement {
            sql: Cow::Borrowed(sql),
            values: Vec::new(),
        }),
        Params::Positional(values) if db == DatabaseType::Postgres => {
            expand_positional(sql, values, db)
        }
        Params::Positional(values) => Ok(BoundStatement {
            sql: Cow::Borrowed(sql),
            values,
        }),
        Params::Named(values) => expand_named(sql, &values, db),
    }
}

/// Position just past a literal, quoted identifier, comment or `::` cast that
/// starts at `i`, or `None` when `i` is plain SQL.
fn skip_non_code(sql: &str, i: usize, db: DatabaseType) -> Option<usize> {
    let bytes = sql.as_bytes();
    let next = bytes.get(i + 1);
    let end = match bytes[i] {
        b'\'' => skip_quoted(bytes, i, b'\'', db == DatabaseType::MySql),
        b'"' => skip_quoted(bytes, i, b'"', db == DatabaseType::MySql),
        b'`' if db != DatabaseType::Postgres => skip_quoted(bytes, i, b'`', false),
        b'-' if next == Some(&b'-') => skip_line_comment(bytes, i),
        b'#' if db == DatabaseType::MySql => skip_line_comment(bytes, i),
        b'/' if next == Some(&b'*') => skip_block_comment(bytes, i),
        b'$' if db == DatabaseType::Postgres => skip_dollar_quoted(sql, i),
        b':' if next == Some(&b':') => i + 2,
        _ => return None,
    };
    Some(end)
}

/// Rewrite `?` placeholders into `$1..$n` for PostgreSQL. `??` stands for a
/// literal `?` operator. SQL without `?` placeholders is passed through as is.
fn expand_positional(
    sql: &str,
    values: Vec<QueryParam>,
    db: DatabaseType,
) -> DbResult<BoundStatement<'_>> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut slots = 0;
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if let Some(end) = skip_non_code(sql, i, db) {
            i = end;
            continue;
        }
        if bytes[i] != b'?' {
            i += 1;
            continue;
        }
        out.push_str(&sql[copied..i]);
        if bytes.get(i + 1) == Some(&b'?') {
            out.push('?');
            i += 2;
        } else {
            slots += 1;
            out.push('$');
            out.push_str(&slots.to_string());
            i += 1;
        }
        copied = i;
    }

    if copied == 0 {
        return Ok(BoundStatement {
            sql: Cow::Borrowed(sql),
            values,
        });
    }
    if slots != values.len() {
        return Err(DbError::query(
            format!(
                "Statement has {} placeholder(s) but {} value(s) were bound",
                slots,
                values.len()
            ),
            None,
            "Pass exactly one value per ? placeholder",
        ));
    }
    out.push_str(&sql[copied..]);
    Ok(BoundStatement {
        sql: Cow::Owned(out),
        values,
    })
}

/// Rewrite `:name` placeholders into `?` (MySQL, SQLite) or `$n` (PostgreSQL).
///
/// String literals, quoted identifiers, comments, `::` casts and PostgreSQL
/// dollar-quoted bodies are copied through untouched. Every placeholder must have
/// a value and every value must be used.
fn expand_named<'a>(
    sql: &'a str,
    values: &BTreeMap<String, QueryParam>,
    db: DatabaseType,
) -> DbResult<BoundStatement<'a>> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut bound = Vec::new();
    // name -> first slot it was bound to
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if let Some(end) = skip_non_code(sql, i, db) {
            i = end;
            continue;
        }
        match bytes[i] {
            b':' if bytes.get(i + 1).is_some_and(|b| is_ident_start(*b)) => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && is_ident_char(bytes[end]) {
                    end += 1;
                }
                let name = &sql[start..end];
                let value = values.get(name).ok_or_else(|| {
                    DbError::query(
                        format!("No value bound for parameter :{}", name),
                        None,
                        "Add the parameter to the named parameter map",
                    )
                })?;

                out.push_str(&sql[copied..i]);
                match db {
                    DatabaseType::Postgres => {
                        let slot = match slots.get(name) {
                            Some(slot) => *slot,
                            None => {
                                bound.push(value.clone());
                                slots.insert(name, bound.len());
                                bound.len()
                            }
                        };
                        out.push('$');
                        out.push_str(&slot.to_string());
                    }
                    DatabaseType::MySql | DatabaseType::SQLite => {
                        bound.push(value.clone());
                        slots.entry(name).or_insert(bound.len());
                        out.push('?');
                    }
                }
                copied = end;
                i = end;
            }
            _ => i += 1,
        }
    }

    if let Some(unused) = values.keys().find(|k| !slots.contains_key(k.as_str())) {
        return Err(DbError::query(
            format!("Parameter :{} does not appear in the statement", unused),
            None,
            "Remove the parameter or reference it in the SQL",
        ));
    }

    if copied == 0 {
        return Ok(BoundStatement {
            sql: Cow::Borrowed(sql),
            values: bound,
        });
    }
    out.push_str(&sql[copied..]);
    Ok(BoundStatement {
        sql: Cow::Owned(out),
        values: bound,
    })
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Skip a quoted run starting at `start`; a doubled quote is an escaped quote.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8, backslash_escapes: bool) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash_escapes && b == b'\\' {
            i += 2;
            continue;
        }
        if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(bytes.len(), |p| start + p + 1)
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |p| start + 2 + p + 2)
}

/// Skip `$tag$ ... $tag$`. A `$` that does not open a dollar quote (for example
/// a `$1` placeholder) is stepped over.
fn skip_dollar_quoted(sql: &str, start: usize) -> usize {
    let bytes = sql.as_bytes();
    let mut end = start + 1;
    while end < bytes.len() && is_ident_char(bytes[end]) {
        end += 1;
    }
    let tag_is_valid = end == start + 1 || is_ident_start(bytes[start + 1]);
    if end >= bytes.len() || bytes[end] != b'$' || !tag_is_valid {
        return start + 1;
    }
    let delimiter = &sql[start..=end];
    sql[end + 1..]
        .find(delimiter)
        .map_or(bytes.len(), |p| end + 1 + p + delimiter.len())
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
        // SQLite doesn't have native JSON type, store as string
        QueryParam::Json(v) => query.bind(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(pairs: &[(&str, i64)]) -> Params {
        Params::named(pairs.iter().map(|(k, v)| (*k, *v)))
    }

    #[test]
    fn test_positional_passthrough() {
        let stmt = bind_statement(
            "SELECT ? + ?",
            Params::Positional(vec![QueryParam::Int(1), QueryParam::Int(2)]),
            DatabaseType::SQLite,
        )
        .unwrap();
        assert!(matches!(stmt.sql, Cow::Borrowed("SELECT ? + ?")));
        assert_eq!(stmt.values.len(), 2);
    }

    #[test]
    fn test_named_to_question_marks() {
        let stmt = bind_statement(
            "SELECT * FROM t WHERE a = :a AND b = :b OR a = :a",
            named(&[("a", 1), ("b", 2)]),
            DatabaseType::MySql,
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE a = ? AND b = ? OR a = ?");
        assert_eq!(
            stmt.values,
            vec![QueryParam::Int(1), QueryParam::Int(2), QueryParam::Int(1)]
        );
    }

    #[test]
    fn test_named_to_dollar_slots_reuses_index() {
        let stmt = bind_statement(
            "SELECT * FROM t WHERE a = :a AND b = :b OR a = :a",
            named(&[("a", 1), ("b", 2)]),
            DatabaseType::Postgres,
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE a = $1 AND b = $2 OR a = $1");
        assert_eq!(stmt.values, vec![QueryParam::Int(1), QueryParam::Int(2)]);
    }

    #[test]
    fn test_skips_literals_comments_and_casts() {
        let sql = "SELECT ':x', \"col:x\", v::text -- :x\n/* :x */ FROM t WHERE id = :x";
        let stmt = bind_statement(sql, named(&[("x", 7)]), DatabaseType::Postgres).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT ':x', \"col:x\", v::text -- :x\n/* :x */ FROM t WHERE id = $1"
        );
        assert_eq!(stmt.values, vec![QueryParam::Int(7)]);
    }

    #[test]
    fn test_escaped_quotes_stay_inside_literal() {
        let stmt = bind_statement(
            "SELECT 'it''s :x', :x",
            named(&[("x", 1)]),
            DatabaseType::SQLite,
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT 'it''s :x', ?");

        let stmt = bind_statement(
            r"SELECT 'a\':x', :x",
            named(&[("x", 1)]),
            DatabaseType::MySql,
        )
        .unwrap();
        assert_eq!(stmt.sql, r"SELECT 'a\':x', ?");
    }

    #[test]
    fn test_dollar_quoted_body_is_skipped() {
        let stmt = bind_statement(
            "SELECT $body$ :x $body$, :x",
            named(&[("x", 1)]),
            DatabaseType::Postgres,
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT $body$ :x $body$, $1");
    }

    #[test]
    fn test_missing_named_value() {
        let err = bind_statement("SELECT :a", named(&[]), DatabaseType::SQLite).unwrap_err();
        assert!(matches!(err, DbError::Query { .. }));
        assert!(err.to_string().contains(":a"));
    }

    #[test]
    fn test_unused_named_value() {
        let err = bind_statement("SELECT :a", named(&[("a", 1), ("b", 2)]), DatabaseType::MySql)
            .unwrap_err();
        assert!(err.to_string().contains(":b"));
    }

    #[test]
    fn test_positional_to_dollar_slots() {
        let stmt = bind_statement(
            "SELECT * FROM t WHERE id = ? AND note <> '?' AND tag = ? -- ?",
            Params::Positional(vec![QueryParam::Int(1), QueryParam::from("x")]),
            DatabaseType::Postgres,
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM t WHERE id = $1 AND note <> '?' AND tag = $2 -- ?"
        );
        assert_eq!(stmt.values.len(), 2);
    }

    #[test]
    fn test_positional_postgres_keeps_dollar_sql_and_escaped_operator() {
        let stmt = bind_statement(
            "SELECT $1::int",
            Params::Positional(vec![QueryParam::Int(1)]),
            DatabaseType::Postgres,
        )
        .unwrap();
        assert!(matches!(stmt.sql, Cow::Borrowed("SELECT $1::int")));

        let stmt = bind_statement(
            "SELECT doc ?? 'k' FROM t WHERE id = ?",
            Params::Positional(vec![QueryParam::Int(1)]),
            DatabaseType::Postgres,
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT doc ? 'k' FROM t WHERE id = $1");
    }

    #[test]
    fn test_positional_count_mismatch_on_postgres() {
        let err = bind_statement(
            "SELECT ? + ?",
            Params::Positional(vec![QueryParam::Int(1)]),
            DatabaseType::Postgres,
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Query { .. }));
        assert!(err.to_string().contains("2 placeholder"));
    }

    #[test]
    fn test_mysql_double_quoted_literal_honours_backslash() {
        let stmt = bind_statement(
            r#"SELECT "a\":x", :x"#,
            named(&[("x", 1)]),
            DatabaseType::MySql,
        )
        .unwrap();
        assert_eq!(stmt.sql, r#"SELECT "a\":x", ?"#);
        assert_eq!(stmt.values, vec![QueryParam::Int(1)]);
    }
}
