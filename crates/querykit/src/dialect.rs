//! SQL dialect descriptors.
//!
//! A [`Dialect`] knows how one database family spells the parts of a statement
//! that differ between vendors: placeholders, identifier quoting, LIMIT/OFFSET,
//! row locks and date extraction. It also reports which optional features the
//! family supports so the compiler can fail early with
//! [`DbError::UnsupportedFeature`] instead of sending SQL the server rejects.

use std::fmt;

use crate::error::{DbError, DbResult};

/// Row lock requested by a SELECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    #[default]
    None,
    ForUpdate,
    ForShare,
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    #[default]
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Write the placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize, out: &mut String) {
        match self {
            Dialect::Postgres => {
                out.push('$');
                out.push_str(&index.to_string());
            }
            Dialect::MySql | Dialect::Sqlite => out.push('?'),
        }
    }

    fn quote_char(&self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Postgres | Dialect::Sqlite => '"',
        }
    }

    /// Quote a single identifier segment, doubling embedded quote characters.
    pub fn quote_segment(&self, segment: &str, out: &mut String) {
        if segment == "*" {
            out.push('*');
            return;
        }
        let q = self.quote_char();
        out.push(q);
        for ch in segment.chars() {
            if ch == q {
                out.push(q);
            }
            out.push(ch);
        }
        out.push(q);
    }

    /// Quote a possibly qualified (`table.column`) and possibly aliased
    /// (`column as alias`) identifier.
    ///
    /// Expressions containing a parenthesis are written verbatim; use the raw
    /// builder methods for anything that is not a plain column reference.
    pub fn quote_identifier(&self, ident: &str, out: &mut String) {
        let ident = ident.trim();
        if ident.contains('(') {
            out.push_str(ident);
            return;
        }
        if let Some((name, alias)) = split_alias(ident) {
            self.quote_identifier(name, out);
            out.push_str(" as ");
            self.quote_segment(alias.trim(), out);
            return;
        }
        for (i, segment) in ident.split('.').enumerate() {
            if i > 0 {
                out.push('.');
            }
            self.quote_segment(segment.trim(), out);
        }
    }

    /// Convenience wrapper around [`Dialect::quote_identifier`].
    pub fn quoted(&self, ident: &str) -> String {
        let mut out = String::with_capacity(ident.len() + 4);
        self.quote_identifier(ident, &mut out);
        out
    }

    /// Render LIMIT/OFFSET. Writes nothing when both are absent.
    pub fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>, out: &mut String) {
        match (limit, offset) {
            (None, None) => {}
            (Some(limit), None) => {
                out.push_str(" LIMIT ");
                out.push_str(&limit.to_string());
            }
            (Some(limit), Some(offset)) => {
                out.push_str(" LIMIT ");
                out.push_str(&limit.to_string());
                out.push_str(" OFFSET ");
                out.push_str(&offset.to_string());
            }
            (None, Some(offset)) => {
                match self {
                    Dialect::Postgres => {}
                    // MySQL has no OFFSET without LIMIT.
                    Dialect::MySql => out.push_str(" LIMIT 18446744073709551615"),
                    Dialect::Sqlite => out.push_str(" LIMIT -1"),
                }
                out.push_str(" OFFSET ");
                out.push_str(&offset.to_string());
            }
        }
    }

    /// Trailing lock clause for a SELECT.
    pub fn lock_clause(&self, lock: LockMode) -> DbResult<Option<&'static str>> {
        match (self, lock) {
            (_, LockMode::None) => Ok(None),
            (Dialect::Sqlite, LockMode::ForUpdate) => {
                Err(DbError::unsupported(*self, "FOR UPDATE"))
            }
            (Dialect::Sqlite, LockMode::ForShare) => Err(DbError::unsupported(*self, "FOR SHARE")),
            (_, LockMode::ForUpdate) => Ok(Some("FOR UPDATE")),
            (Dialect::MySql, LockMode::ForShare) => Ok(Some("LOCK IN SHARE MODE")),
            (_, LockMode::ForShare) => Ok(Some("FOR SHARE")),
        }
    }

    /// Write the date part of a timestamp column.
    pub fn date_of(&self, column: &str, out: &mut String) {
        match self {
            Dialect::Postgres => {
                self.quote_identifier(column, out);
                out.push_str("::date");
            }
            Dialect::MySql | Dialect::Sqlite => {
                out.push_str("date(");
                self.quote_identifier(column, out);
                out.push(')');
            }
        }
    }

    pub fn supports_savepoints(&self) -> bool {
        true
    }

    pub fn supports_returning(&self) -> bool {
        !matches!(self, Dialect::MySql)
    }

    /// Whether a single open result can be streamed row by row.
    pub fn supports_server_cursors(&self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    /// Whether `ILIKE` / `NOT ILIKE` parse.
    pub fn supports_ilike(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Whether UPDATE/DELETE accept a trailing LIMIT.
    pub fn supports_mutation_limit(&self) -> bool {
        matches!(self, Dialect::MySql)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

/// Split `expr as alias` (case-insensitive) into its two halves.
fn split_alias(ident: &str) -> Option<(&str, &str)> {
    let lower = ident.to_ascii_lowercase();
    let pos = lower.rfind(" as ")?;
    Some((&ident[..pos], &ident[pos + 4..]))
}
