//! ---
//! prt_section: "03-trip-evaluation"
//! prt_subsection: "01-bootstrap"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Trip rule evaluator and GOOSE ingestion exports."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Boolean trip rules over GOOSE data points.
//!
//! Rules such as `IED1/PTRC1.Tr.general == true && IED1/XCBR1.Pos.stVal != 2` are
//! parsed once into an [`Expr`] tree and evaluated on demand by the
//! [`TripEvaluator`]. The [`GooseIngestor`] closes the loop by feeding received
//! frames into the evaluator and raising the shared trip signal.

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod goose;
mod lexer;
pub mod parser;

pub use ast::{compare, CompareOp, DataPoint, DataValue, Expr, Literal};
pub use error::{DecodeError, Result, RuleError};
pub use evaluator::{RuleInfo, TripEvaluator, TripResult, TripRule};
pub use goose::{GooseDecoder, GooseIngestor, GooseUpdate, JsonUpdateDecoder};
pub use parser::{classify_literal, parse_expression, SyntaxError};
