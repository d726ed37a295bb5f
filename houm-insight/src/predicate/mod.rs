//! Filter predicates.
//!
//! A [`Predicate`] is an ordered conjunction of typed [`Clause`]s. The
//! compiler builds predicates from a [`FilterSpec`]; executors either evaluate
//! the clauses directly or render them to SQL through [`sql`].
//!
//! Caller values live only in clause parameters. Column names come from the
//! field catalog, so a predicate's SQL text depends on nothing the caller
//! controls apart from how many values were supplied.

pub mod compiler;
pub mod filter_spec;
pub mod sql;

pub use compiler::compile;
pub use filter_spec::FilterSpec;

use serde::Serialize;

use crate::catalog::NumericExpr;

/// A literal value bound into a clause.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Param {
    Number(f64),
    Text(String),
    Bool(bool),
}

/// Direction of an inclusive range bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeBound {
    /// `expr >= value`
    AtLeast,
    /// `expr <= value`
    AtMost,
}

impl RangeBound {
    pub fn operator(self) -> &'static str {
        match self {
            RangeBound::AtLeast => ">=",
            RangeBound::AtMost => "<=",
        }
    }

    /// Whether `candidate` satisfies the bound.
    pub fn admits(self, candidate: f64, value: f64) -> bool {
        match self {
            RangeBound::AtLeast => candidate >= value,
            RangeBound::AtMost => candidate <= value,
        }
    }
}

/// One conjunct of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Inclusive bound on a numeric expression.
    Range {
        field: String,
        expr: NumericExpr,
        bound: RangeBound,
        value: f64,
    },
    /// Scalar column equals any of `values`.
    Membership {
        field: String,
        column: String,
        values: Vec<String>,
    },
    /// Array column shares at least one element with `values`.
    ArrayIntersects {
        field: String,
        column: String,
        values: Vec<String>,
    },
    /// Column is not null.
    NotNull { field: String, column: String },
    /// Boolean column equals `value`.
    Flag {
        field: String,
        column: String,
        value: bool,
    },
}

impl Clause {
    /// Name of the catalog field the clause was compiled from.
    pub fn field(&self) -> &str {
        match self {
            Clause::Range { field, .. }
            | Clause::Membership { field, .. }
            | Clause::ArrayIntersects { field, .. }
            | Clause::NotNull { field, .. }
            | Clause::Flag { field, .. } => field,
        }
    }

    /// Parameters bound by the clause, in placeholder order.
    pub fn params(&self) -> Vec<Param> {
        match self {
            Clause::Range { value, .. } => vec![Param::Number(*value)],
            Clause::Membership { values, .. } | Clause::ArrayIntersects { values, .. } => {
                values.iter().cloned().map(Param::Text).collect()
            }
            Clause::NotNull { .. } => Vec::new(),
            Clause::Flag { value, .. } => vec![Param::Bool(*value)],
        }
    }
}

/// Conjunction of clauses. The empty predicate matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    /// The predicate that matches every row.
    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn from_clauses(clauses: Vec<Clause>) -> Self {
        Self { clauses }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_match_all(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Conjoins two predicates. Clauses of `self` come first.
    ///
    /// ```rust
    /// use houm_insight::predicate::{Clause, Predicate};
    ///
    /// let hard = Predicate::from_clauses(vec![Clause::NotNull {
    ///     field: "location".into(),
    ///     column: "longitude".into(),
    /// }]);
    /// let soft = Predicate::match_all();
    /// assert_eq!(hard.and(&soft), hard);
    /// ```
    pub fn and(&self, other: &Predicate) -> Predicate {
        let mut clauses = Vec::with_capacity(self.clauses.len() + other.clauses.len());
        clauses.extend(self.clauses.iter().cloned());
        clauses.extend(other.clauses.iter().cloned());
        Predicate { clauses }
    }

    /// Every bound parameter, in placeholder order.
    pub fn bound_parameters(&self) -> Vec<Param> {
        self.clauses.iter().flat_map(Clause::params).collect()
    }
}
