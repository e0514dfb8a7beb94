//! ordbin: ordinal outcome tables
//!
//! A library for normalizing per-individual arrival-order observations,
//! aggregating ordinal outcomes into fixed-denominator bins, and reshaping
//! model prediction matrices into long-form tables for stacked charts.

pub mod cli;
pub mod pipeline;
pub mod report;
pub mod utils;
