//! Rendering of predicates and value expressions to DataFusion SQL.
//!
//! All SQL text the engine produces goes through [`SqlWriter`]: identifiers
//! are validated and quoted by [`SqlSecurity`], literal values are pushed as
//! parameters and numbered `$1, $2, ...` when the writer is finished.

use serde::Serialize;

use super::{Clause, Param, Predicate};
use crate::catalog::NumericExpr;
use crate::error::Result;
use crate::security::SqlSecurity;

enum Part {
    Sql(String),
    Param(Param),
}

/// Rendered SQL text together with the parameters its placeholders refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<Param>,
}

/// A single rendered clause.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledClause {
    pub expression: String,
    pub bound_parameters: Vec<Param>,
}

/// Accumulates SQL text and parameters.
pub struct SqlWriter {
    parts: Vec<Part>,
    first_placeholder: usize,
}

impl Default for SqlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// A writer whose first placeholder is `$first`.
    pub fn starting_at(first: usize) -> Self {
        Self {
            parts: Vec::new(),
            first_placeholder: first.max(1),
        }
    }

    pub fn sql(&mut self, s: impl AsRef<str>) {
        self.parts.push(Part::Sql(s.as_ref().to_owned()));
    }

    pub fn param(&mut self, param: Param) {
        self.parts.push(Part::Param(param));
    }

    /// Pushes a validated, quoted identifier.
    pub fn identifier(&mut self, identifier: &str) -> Result<()> {
        let quoted = SqlSecurity::escape_identifier(identifier)?;
        self.sql(quoted);
        Ok(())
    }

    /// Pushes a numeric value expression, evaluated as `DOUBLE`.
    ///
    /// Cells that do not convert become NULL rather than failing the query.
    pub fn numeric_expr(&mut self, expr: &NumericExpr) -> Result<()> {
        match expr {
            NumericExpr::Column(column) => self.try_cast_double(column),
            NumericExpr::FourDigitYear(column) => {
                let quoted = SqlSecurity::escape_identifier(column)?;
                self.sql(format!(
                    "CASE WHEN CAST({quoted} AS VARCHAR) ~ '^[0-9]{{4}}$' \
                     THEN TRY_CAST(CAST({quoted} AS VARCHAR) AS DOUBLE) END"
                ));
                Ok(())
            }
            NumericExpr::Coalesce(columns) => match columns.as_slice() {
                [single] => self.try_cast_double(single),
                _ => {
                    self.sql("COALESCE(");
                    for (i, column) in columns.iter().enumerate() {
                        if i > 0 {
                            self.sql(", ");
                        }
                        self.try_cast_double(column)?;
                    }
                    self.sql(")");
                    Ok(())
                }
            },
        }
    }

    fn try_cast_double(&mut self, column: &str) -> Result<()> {
        self.sql("TRY_CAST(");
        self.identifier(column)?;
        self.sql(" AS DOUBLE)");
        Ok(())
    }

    /// Pushes a single clause.
    pub fn clause(&mut self, clause: &Clause) -> Result<()> {
        match clause {
            Clause::Range {
                expr, bound, value, ..
            } => {
                self.numeric_expr(expr)?;
                self.sql(format!(" {} ", bound.operator()));
                self.param(Param::Number(*value));
            }
            Clause::Membership { column, values, .. } => {
                self.identifier(column)?;
                self.sql(" IN (");
                self.param_list(values);
                self.sql(")");
            }
            Clause::ArrayIntersects { column, values, .. } => {
                self.sql("array_has_any(");
                self.identifier(column)?;
                self.sql(", make_array(");
                self.param_list(values);
                self.sql("))");
            }
            Clause::NotNull { column, .. } => {
                self.identifier(column)?;
                self.sql(" IS NOT NULL");
            }
            Clause::Flag { column, value, .. } => {
                self.identifier(column)?;
                self.sql(" = ");
                self.param(Param::Bool(*value));
            }
        }
        Ok(())
    }

    fn param_list(&mut self, values: &[String]) {
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.sql(", ");
            }
            self.param(Param::Text(value.clone()));
        }
    }

    /// Pushes the conjunction of the predicate's clauses; `TRUE` when empty.
    pub fn predicate(&mut self, predicate: &Predicate) -> Result<()> {
        if predicate.is_match_all() {
            self.sql("TRUE");
            return Ok(());
        }
        for (i, clause) in predicate.clauses().iter().enumerate() {
            if i > 0 {
                self.sql(" AND ");
            }
            self.sql("(");
            self.clause(clause)?;
            self.sql(")");
        }
        Ok(())
    }

    /// Joins the pushed parts, numbering placeholders in push order.
    pub fn build(self) -> SqlFragment {
        let mut counter = self.first_placeholder;
        let mut sql = String::new();
        let mut params = Vec::new();

        for part in self.parts {
            match part {
                Part::Sql(s) => sql += &s,
                Part::Param(param) => {
                    sql += &format!("${counter}");
                    params.push(param);
                    counter += 1;
                }
            }
        }

        SqlFragment { sql, params }
    }
}

/// Renders a predicate as a standalone `WHERE` body.
pub fn render_predicate(predicate: &Predicate) -> Result<SqlFragment> {
    let mut writer = SqlWriter::new();
    writer.predicate(predicate)?;
    Ok(writer.build())
}

/// Renders each clause separately, numbering placeholders across clauses.
pub fn render_clauses(predicate: &Predicate) -> Result<Vec<CompiledClause>> {
    let mut next = 1;
    predicate
        .clauses()
        .iter()
        .map(|clause| {
            let mut writer = SqlWriter::starting_at(next);
            writer.clause(clause)?;
            let fragment = writer.build();
            next += fragment.params.len();
            Ok(CompiledClause {
                expression: fragment.sql,
                bound_parameters: fragment.params,
            })
        })
        .collect()
}
