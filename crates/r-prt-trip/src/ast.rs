//! ---
//! prt_section: "03-trip-evaluation"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Trip rule syntax tree, typed values and comparison semantics."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Typed value of a data point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    /// Boolean status, e.g. a breaker position or trip bit.
    Bool(bool),
    /// Integer status or enumeration.
    Int(i64),
    /// Analogue value.
    Float(f64),
}

impl DataValue {
    /// Type tag used in status views.
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::Bool(_) => "bool",
            DataValue::Int(_) => "int",
            DataValue::Float(_) => "float",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Bool(_) => None,
            DataValue::Int(v) => Some(*v as f64),
            DataValue::Float(v) => Some(*v),
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Bool(v) => write!(f, "{}", v),
            DataValue::Int(v) => write!(f, "{}", v),
            DataValue::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        DataValue::Bool(value)
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Int(value)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Float(value)
    }
}

/// Most recent value received for a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Hierarchical key, e.g. `IED1/LLN0$ST$Trip.stVal`.
    pub path: String,
    /// Typed value; the variant is the type tag.
    pub value: DataValue,
    /// When the value was last written.
    pub updated_at: DateTime<Utc>,
}

/// Data point table keyed by path.
pub type DataTable = BTreeMap<String, DataPoint>;

/// Comparison operators supported by the rule language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
}

impl CompareOp {
    fn apply<T: PartialOrd>(self, left: &T, right: &T) -> bool {
        match self {
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            CompareOp::Gt => left > right,
            CompareOp::Lt => left < right,
            CompareOp::Ge => left >= right,
            CompareOp::Le => left <= right,
        }
    }

    fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }

    /// Source text of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
        }
    }
}

/// Right-hand side of a comparison, typed by its lexical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// `true` or `false`.
    Bool(bool),
    /// Digits with an optional leading minus.
    Int(i64),
    /// Digits containing a decimal point.
    Float(f64),
    /// Anything else, compared against the data point's textual form.
    Str(String),
}

/// Rule expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// `path op literal`.
    Compare {
        /// Data point path.
        path: String,
        /// Operator.
        op: CompareOp,
        /// Literal operand.
        literal: Literal,
    },
    /// Conjunction.
    And(Box<Expr>, Box<Expr>),
    /// Disjunction.
    Or(Box<Expr>, Box<Expr>),
    /// Negation.
    Not(Box<Expr>),
}

impl Expr {
    /// Evaluate against the data table. A comparison on a missing path is false.
    pub fn evaluate(&self, data: &DataTable) -> bool {
        match self {
            Expr::Compare { path, op, literal } => match data.get(path) {
                Some(point) => compare(&point.value, *op, literal),
                None => false,
            },
            Expr::And(left, right) => left.evaluate(data) && right.evaluate(data),
            Expr::Or(left, right) => left.evaluate(data) || right.evaluate(data),
            Expr::Not(inner) => !inner.evaluate(data),
        }
    }

    /// Paths referenced anywhere in the expression.
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Compare { path, .. } => out.push(path),
            Expr::And(left, right) | Expr::Or(left, right) => {
                left.collect_paths(out);
                right.collect_paths(out);
            }
            Expr::Not(inner) => inner.collect_paths(out),
        }
    }
}

/// Compare a data value with a literal.
///
/// Numbers compare as `f64`. Booleans support only equality. String literals compare
/// against the value's textual form with equality only. Any other pairing is
/// unequal: `==` is false, `!=` is true and ordering operators are false.
pub fn compare(value: &DataValue, op: CompareOp, literal: &Literal) -> bool {
    match (value, literal) {
        (DataValue::Bool(v), Literal::Bool(l)) => op.is_equality() && op.apply(v, l),
        (_, Literal::Str(text)) => op.is_equality() && op.apply(&value.to_string(), text),
        (_, Literal::Int(l)) => match value.as_f64() {
            Some(v) => op.apply(&v, &(*l as f64)),
            None => op == CompareOp::Ne,
        },
        (_, Literal::Float(l)) => match value.as_f64() {
            Some(v) => op.apply(&v, l),
            None => op == CompareOp::Ne,
        },
        (_, Literal::Bool(_)) => op == CompareOp::Ne,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(points: &[(&str, DataValue)]) -> DataTable {
        points
            .iter()
            .map(|(path, value)| {
                (
                    path.to_string(),
                    DataPoint {
                        path: path.to_string(),
                        value: *value,
                        updated_at: Utc::now(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn numeric_values_coerce_to_float() {
        assert!(compare(&DataValue::Int(5), CompareOp::Gt, &Literal::Float(4.5)));
        assert!(compare(&DataValue::Float(5.0), CompareOp::Eq, &Literal::Int(5)));
        assert!(compare(&DataValue::Int(-2), CompareOp::Le, &Literal::Int(-2)));
    }

    #[test]
    fn booleans_support_equality_only() {
        let v = DataValue::Bool(true);
        assert!(compare(&v, CompareOp::Eq, &Literal::Bool(true)));
        assert!(compare(&v, CompareOp::Ne, &Literal::Bool(false)));
        assert!(!compare(&v, CompareOp::Gt, &Literal::Bool(false)));
    }

    #[test]
    fn mismatched_types_never_panic() {
        let v = DataValue::Bool(true);
        assert!(!compare(&v, CompareOp::Eq, &Literal::Int(1)));
        assert!(compare(&v, CompareOp::Ne, &Literal::Int(1)));
        assert!(!compare(&v, CompareOp::Gt, &Literal::Float(0.5)));
        assert!(!compare(&DataValue::Int(1), CompareOp::Lt, &Literal::Bool(true)));
    }

    #[test]
    fn strings_compare_textual_form() {
        assert!(compare(&DataValue::Int(3), CompareOp::Eq, &Literal::Str("3".into())));
        assert!(compare(&DataValue::Bool(false), CompareOp::Ne, &Literal::Str("on".into())));
        assert!(!compare(&DataValue::Int(3), CompareOp::Gt, &Literal::Str("2".into())));
    }

    #[test]
    fn missing_path_is_false() {
        let expr = Expr::Compare {
            path: "absent".into(),
            op: CompareOp::Ne,
            literal: Literal::Bool(true),
        };
        assert!(!expr.evaluate(&DataTable::new()));
        assert!(Expr::Not(Box::new(expr)).evaluate(&DataTable::new()));
    }

    #[test]
    fn data_values_deserialize_untagged() {
        let values: Vec<DataValue> = serde_json::from_str("[true, 5, 5.5]").unwrap();
        assert_eq!(
            values,
            vec![DataValue::Bool(true), DataValue::Int(5), DataValue::Float(5.5)]
        );
        let data = table(&[("a", DataValue::Int(1))]);
        assert_eq!(data["a"].value.type_name(), "int");
    }
}
