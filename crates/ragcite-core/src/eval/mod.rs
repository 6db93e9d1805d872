//! Offline retrieval evaluation
//!
//! Recall@k, MRR and latency percentiles over a labelled query set, and
//! comparison of two runs to detect regressions.

pub mod compare;
pub mod harness;
pub mod report;

pub use compare::{compare, CompareOptions, Regression, RegressionKind};
pub use harness::{evaluate, load_test_set, parse_test_set, validate_test_set, TestCase};
pub use report::{
    load_report, save_report, EvalSettings, EvaluationRecord, LatencySummary, MetricsReport,
};
