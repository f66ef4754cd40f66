//! Domain logic
//!
//! - `chart` - Chart queries over index sets (SQL synthesis and splicing)
//! - `iam` - Permission facade over the IAM policy service

pub mod chart;
pub mod iam;

pub use chart::{ChartError, ChartService};
pub use iam::{IamError, IamService, Permission};
