//! Parametrized statement builder.
//!
//! Statement text only ever receives fixed fragments and placeholders; every
//! caller-supplied value travels as a bound parameter.

use market_core::{Placeholder, SqlValue};

#[derive(Debug, Clone)]
pub struct SqlBuilder {
    sql: String,
    params: Vec<SqlValue>,
    placeholder: Placeholder,
}

impl SqlBuilder {
    pub fn new(placeholder: Placeholder) -> Self {
        Self {
            sql: String::with_capacity(512),
            params: Vec::new(),
            placeholder,
        }
    }

    pub fn push(&mut self, fragment: &str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    pub fn push_bind(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        self.params.push(value.into());
        match self.placeholder {
            Placeholder::Question => self.sql.push('?'),
            Placeholder::Dollar => {
                self.sql.push('$');
                self.sql.push_str(&self.params.len().to_string());
            }
        }
        self
    }

    /// Writes `(p1, p2, ...)`. An empty set renders `(NULL)`, which matches nothing.
    pub fn push_in<I, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.sql.push('(');
        let mut empty = true;
        for value in values {
            if !empty {
                self.sql.push_str(", ");
            }
            self.push_bind(value);
            empty = false;
        }
        if empty {
            self.sql.push_str("NULL");
        }
        self.sql.push(')');
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn finish(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.params)
    }
}
