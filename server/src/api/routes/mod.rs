//! API route handlers

pub mod chart;
pub mod health;
pub mod iam;
