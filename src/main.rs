//! ordbin: Ordinal Outcome Tables CLI
//!
//! Normalizes arrival-order observations, aggregates ordinal outcomes into
//! fixed-denominator bins and reshapes model predictions into long form.

use anyhow::Result;
use clap::Parser;

use ordbin::cli::{run, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(&cli)
}
