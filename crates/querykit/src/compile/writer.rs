use crate::compile::BoundStatement;
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::qb::expr::{Op, Raw};
use crate::value::Value;

/// Accumulates SQL text and bindings, numbering placeholders as they are written.
pub(crate) struct SqlWriter {
    dialect: Dialect,
    sql: String,
    bindings: Vec<Value>,
}

impl SqlWriter {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::with_capacity(128),
            bindings: Vec::new(),
        }
    }

    pub(crate) fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Append raw SQL (no parameters).
    pub(crate) fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Append a quoted identifier.
    pub(crate) fn push_ident(&mut self, ident: &str) {
        self.dialect.quote_identifier(ident, &mut self.sql);
    }

    pub(crate) fn push_date_of(&mut self, column: &str) {
        self.dialect.date_of(column, &mut self.sql);
    }

    /// Append ` op ` when the dialect can parse it.
    pub(crate) fn push_op(&mut self, op: Op) -> DbResult<()> {
        if op.is_case_insensitive() && !self.dialect.supports_ilike() {
            return Err(DbError::unsupported(self.dialect, "ILIKE"));
        }
        self.sql.push(' ');
        self.sql.push_str(op.as_sql());
        self.sql.push(' ');
        Ok(())
    }

    /// Append a parameter placeholder and bind its value.
    pub(crate) fn push_bind(&mut self, value: Value) {
        self.bindings.push(value);
        self.dialect.placeholder(self.bindings.len(), &mut self.sql);
    }

    /// Splice a raw fragment, turning each `?` into a placeholder for the next
    /// binding. `??` stands for a literal `?`. Text inside `'...'`, `"..."` and
    /// `` `...` `` is copied verbatim.
    pub(crate) fn push_raw(&mut self, raw: &Raw) -> DbResult<()> {
        let mut bindings = raw.bindings.iter();
        let mut chars = raw.sql.chars().peekable();
        let mut quote: Option<char> = None;
        let mut used = 0usize;
        while let Some(ch) = chars.next() {
            // A doubled quote closes and reopens the region.
            if let Some(open) = quote {
                if ch == open {
                    quote = None;
                }
                self.sql.push(ch);
                continue;
            }
            if matches!(ch, '\'' | '"' | '`') {
                quote = Some(ch);
                self.sql.push(ch);
                continue;
            }
            if ch != '?' {
                self.sql.push(ch);
                continue;
            }
            if chars.peek() == Some(&'?') {
                chars.next();
                self.sql.push('?');
                continue;
            }
            let Some(value) = bindings.next() else {
                return Err(DbError::syntax(format!(
                    "raw fragment '{}' has more placeholders than its {} binding(s)",
                    raw.sql,
                    raw.bindings.len()
                )));
            };
            used += 1;
            self.push_bind(value.clone());
        }
        if used != raw.bindings.len() {
            return Err(DbError::syntax(format!(
                "raw fragment '{}' has {used} placeholder(s) but {} binding(s)",
                raw.sql,
                raw.bindings.len()
            )));
        }
        Ok(())
    }

    pub(crate) fn limit_offset(&mut self, limit: Option<u64>, offset: Option<u64>) {
        self.dialect.limit_offset(limit, offset, &mut self.sql);
    }

    pub(crate) fn finish(self) -> BoundStatement {
        BoundStatement::new(self.sql, self.bindings)
    }
}
