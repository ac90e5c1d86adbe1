//! ---
//! prt_section: "03-trip-evaluation"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Trip rule table, data point table and on-demand evaluation."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use r_prt_common::LastError;
use r_prt_metrics::TripMetrics;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ast::{DataPoint, DataTable, DataValue, Expr};
use crate::error::{Result, RuleError};
use crate::parser::parse_expression;

/// Named, parsed rule. Names are unique within an evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRule {
    pub name: String,
    pub expression: String,
    pub ast: Expr,
    pub enabled: bool,
}

/// Listing entry for a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleInfo {
    pub name: String,
    pub expression: String,
    pub enabled: bool,
}

/// Outcome of [`TripEvaluator::evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripResult {
    pub triggered: bool,
    /// First matching rule, in insertion order.
    pub rule_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl TripResult {
    fn clear(timestamp: DateTime<Utc>) -> Self {
        Self {
            triggered: false,
            rule_name: None,
            timestamp,
            message: "no rule triggered".into(),
        }
    }
}

#[derive(Default)]
struct Tables {
    rules: IndexMap<String, TripRule>,
    data: DataTable,
}

/// Evaluates boolean trip rules against the latest GOOSE data points.
///
/// Rules and data points share one lock so an evaluation sees a consistent
/// snapshot of both tables. The evaluator has no thread of its own.
pub struct TripEvaluator {
    tables: Mutex<Tables>,
    metrics: Option<TripMetrics>,
    last_error: LastError,
}

impl fmt::Debug for TripEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.lock();
        f.debug_struct("TripEvaluator")
            .field("rules", &tables.rules.len())
            .field("data_points", &tables.data.len())
            .finish_non_exhaustive()
    }
}

impl Default for TripEvaluator {
    fn default() -> Self {
        Self::new(None)
    }
}

impl TripEvaluator {
    pub fn new(metrics: Option<TripMetrics>) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            metrics,
            last_error: LastError::default(),
        }
    }

    /// Parse `expression` and insert it under `name`, replacing any rule with that name.
    ///
    /// A replaced rule keeps its position and enabled flag. On a syntax error the
    /// table is untouched and the error is recorded.
    pub fn add_rule(&self, name: &str, expression: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(self.last_error.capture(RuleError::EmptyName));
        }
        let ast = match parse_expression(expression) {
            Ok(ast) => ast,
            Err(err) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_parse_failure(name);
                }
                warn!(rule = %name, position = err.position, error = %err.message, "trip rule rejected");
                return Err(self.last_error.capture(RuleError::Parse {
                    rule: name.to_owned(),
                    position: err.position,
                    message: err.message,
                }));
            }
        };

        let mut tables = self.tables.lock();
        let enabled = tables.rules.get(name).map(|rule| rule.enabled).unwrap_or(true);
        tables.rules.insert(
            name.to_owned(),
            TripRule {
                name: name.to_owned(),
                expression: expression.to_owned(),
                ast,
                enabled,
            },
        );
        info!(rule = %name, expression, "trip rule installed");
        Ok(())
    }

    pub fn remove_rule(&self, name: &str) -> Result<()> {
        match self.tables.lock().rules.shift_remove(name) {
            Some(_) => {
                info!(rule = %name, "trip rule removed");
                Ok(())
            }
            None => Err(self.last_error.capture(RuleError::UnknownRule(name.to_owned()))),
        }
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut tables = self.tables.lock();
        match tables.rules.get_mut(name) {
            Some(rule) => {
                rule.enabled = enabled;
                debug!(rule = %name, enabled, "trip rule toggled");
                Ok(())
            }
            None => Err(self.last_error.capture(RuleError::UnknownRule(name.to_owned()))),
        }
    }

    /// Rules in insertion order.
    pub fn list_rules(&self) -> Vec<RuleInfo> {
        self.tables
            .lock()
            .rules
            .values()
            .map(|rule| RuleInfo {
                name: rule.name.clone(),
                expression: rule.expression.clone(),
                enabled: rule.enabled,
            })
            .collect()
    }

    pub fn rule(&self, name: &str) -> Option<TripRule> {
        self.tables.lock().rules.get(name).cloned()
    }

    pub fn update_bool(&self, path: &str, value: bool) {
        self.update_data_point(path, DataValue::Bool(value));
    }

    pub fn update_int(&self, path: &str, value: i64) {
        self.update_data_point(path, DataValue::Int(value));
    }

    pub fn update_float(&self, path: &str, value: f64) {
        self.update_data_point(path, DataValue::Float(value));
    }

    /// Upsert a data point. Last write wins; evaluation is not triggered.
    pub fn update_data_point(&self, path: &str, value: DataValue) {
        let point = DataPoint {
            path: path.to_owned(),
            value,
            updated_at: Utc::now(),
        };
        self.tables.lock().data.insert(path.to_owned(), point);
    }

    pub fn data_point(&self, path: &str) -> Option<DataPoint> {
        self.tables.lock().data.get(path).cloned()
    }

    /// Data points ordered by path.
    pub fn data_points(&self) -> Vec<DataPoint> {
        self.tables.lock().data.values().cloned().collect()
    }

    pub fn clear_data_points(&self) {
        self.tables.lock().data.clear();
    }

    /// Drop all rules and data points.
    pub fn reset(&self) {
        let mut tables = self.tables.lock();
        tables.rules.clear();
        tables.data.clear();
        self.last_error.clear();
        info!("trip evaluator reset");
    }

    /// First enabled rule that holds, or a not-triggered result.
    pub fn evaluate(&self) -> TripResult {
        let now = Utc::now();
        let result = {
            let tables = self.tables.lock();
            tables
                .rules
                .values()
                .filter(|rule| rule.enabled)
                .find(|rule| rule.ast.evaluate(&tables.data))
                .map(|rule| TripResult {
                    triggered: true,
                    rule_name: Some(rule.name.clone()),
                    timestamp: now,
                    message: format!("rule {} triggered: {}", rule.name, rule.expression),
                })
                .unwrap_or_else(|| TripResult::clear(now))
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_evaluation(result.rule_name.as_deref());
        }
        if let Some(rule) = &result.rule_name {
            debug!(rule = %rule, "trip rule matched");
        }
        result
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r_prt_metrics::new_registry;

    #[test]
    fn first_matching_rule_in_insertion_order_wins() {
        let evaluator = TripEvaluator::default();
        evaluator.add_rule("second", "x > 1").unwrap();
        evaluator.add_rule("first", "x > 0").unwrap();
        evaluator.update_int("x", 5);
        assert_eq!(evaluator.evaluate().rule_name.as_deref(), Some("second"));

        evaluator.set_enabled("second", false).unwrap();
        let result = evaluator.evaluate();
        assert!(result.triggered);
        assert_eq!(result.rule_name.as_deref(), Some("first"));
        assert!(result.message.contains("x > 0"));
    }

    #[test]
    fn replacing_rule_keeps_position_and_flag() {
        let evaluator = TripEvaluator::default();
        evaluator.add_rule("a", "p == 1").unwrap();
        evaluator.add_rule("b", "p == 2").unwrap();
        evaluator.set_enabled("a", false).unwrap();
        evaluator.add_rule("a", "p == 3").unwrap();
        let rules = evaluator.list_rules();
        assert_eq!(rules[0].name, "a");
        assert_eq!(rules[0].expression, "p == 3");
        assert!(!rules[0].enabled);
    }

    #[test]
    fn parse_failure_is_recorded_and_counted() {
        let metrics = TripMetrics::new(new_registry()).unwrap();
        let evaluator = TripEvaluator::new(Some(metrics));
        evaluator.add_rule("ok", "a == true").unwrap();
        let err = evaluator.add_rule("ok", "a == ").unwrap_err();
        assert!(matches!(err, RuleError::Parse { .. }));
        assert_eq!(evaluator.rule("ok").unwrap().expression, "a == true");
        assert!(evaluator.last_error().unwrap().contains("syntax error"));
        assert_eq!(evaluator.add_rule("  ", "a == 1"), Err(RuleError::EmptyName));
    }

    #[test]
    fn deeply_nested_rule_is_rejected_without_aborting() {
        let evaluator = TripEvaluator::default();
        let deep = format!("{}a == 1", "!".repeat(200_000));
        let err = evaluator.add_rule("deep", &deep).unwrap_err();
        assert!(matches!(err, RuleError::Parse { .. }));
        assert!(evaluator.rule("deep").is_none());
        assert!(evaluator.last_error().unwrap().contains("nested too deeply"));
    }

    #[test]
    fn unknown_rules_are_reported() {
        let evaluator = TripEvaluator::default();
        assert_eq!(
            evaluator.remove_rule("ghost"),
            Err(RuleError::UnknownRule("ghost".into()))
        );
        assert!(evaluator.set_enabled("ghost", true).is_err());
    }

    #[test]
    fn reset_clears_both_tables() {
        let evaluator = TripEvaluator::default();
        evaluator.add_rule("r", "v >= 1.5").unwrap();
        evaluator.update_float("v", 2.0);
        assert!(evaluator.evaluate().triggered);
        assert_eq!(evaluator.data_points()[0].value.type_name(), "float");
        evaluator.reset();
        assert!(evaluator.list_rules().is_empty());
        assert!(evaluator.data_points().is_empty());
        assert!(!evaluator.evaluate().triggered);
    }

    #[test]
    fn metrics_count_hits() {
        let metrics = TripMetrics::new(new_registry()).unwrap();
        let evaluator = TripEvaluator::new(Some(metrics.clone()));
        evaluator.add_rule("trip", "t == true").unwrap();
        evaluator.update_bool("t", true);
        evaluator.evaluate();
        evaluator.evaluate();
        assert_eq!(metrics.rule_hits("trip"), 2);
    }
}
