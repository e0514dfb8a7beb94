//! Aggregation summary tables

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, CellAlignment, Color, Table};
use console::style;

use crate::pipeline::{Aggregation, BucketKey};

/// Console summary of one aggregation run
#[derive(Debug)]
pub struct AggregationSummary<'a> {
    aggregation: &'a Aggregation,
}

impl<'a> AggregationSummary<'a> {
    pub fn new(aggregation: &'a Aggregation) -> Self {
        Self { aggregation }
    }

    /// Levels of the target that no row falls into
    pub fn unobserved_levels(&self) -> Vec<String> {
        self.aggregation
            .levels
            .iter()
            .filter(|level| {
                !self
                    .aggregation
                    .bins
                    .iter()
                    .any(|b| b.level.rank == level.rank && b.count > 0)
            })
            .map(|level| level.label.clone())
            .collect()
    }

    /// One row per bucket: bucket labels, row count, share, then the proportion of each level
    pub fn build_table(&self) -> Table {
        let agg = self.aggregation;

        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);

        let mut header: Vec<Cell> = agg
            .dimensions
            .iter()
            .map(|d| Cell::new(d.field().name()).add_attribute(Attribute::Bold))
            .collect();
        header.push(Cell::new("Rows").add_attribute(Attribute::Bold));
        header.push(Cell::new("Share").add_attribute(Attribute::Bold));
        header.extend(
            agg.levels
                .iter()
                .map(|l| Cell::new(&l.label).add_attribute(Attribute::Bold)),
        );
        table.set_header(header);

        let shares = agg.bucket_shares();
        let per_bucket = agg.levels.len().max(1);
        for (share, chunk) in shares.iter().zip(agg.bins.chunks(per_bucket)) {
            let mut row: Vec<Cell> = share
                .buckets
                .iter()
                .map(|k| match k {
                    BucketKey::Category(label) => Cell::new(label),
                    BucketKey::Interval(_) => {
                        Cell::new(k.label()).set_alignment(CellAlignment::Right)
                    }
                })
                .collect();
            row.push(Cell::new(share.count).set_alignment(CellAlignment::Right));
            row.push(
                Cell::new(format!("{:.3}", share.share))
                    .fg(Color::Cyan)
                    .set_alignment(CellAlignment::Right),
            );
            row.extend(chunk.iter().map(|bin| {
                let cell = Cell::new(format!("{:.3}", bin.proportion))
                    .set_alignment(CellAlignment::Right);
                if bin.count == 0 {
                    cell.fg(Color::DarkGrey)
                } else {
                    cell
                }
            }));
            table.add_row(row);
        }

        table
    }

    pub fn display(&self) {
        let agg = self.aggregation;
        let by: Vec<String> = agg.dimensions.iter().map(|d| d.to_string()).collect();

        println!();
        println!(
            "    {} {}",
            style("📋").cyan(),
            style("AGGREGATION SUMMARY").white().bold()
        );
        println!("    {}", style("─".repeat(50)).dim());
        println!(
            "      {} by {}  ({} rows, {} levels)",
            style(agg.target.name()).yellow(),
            style(by.join(" × ")).yellow(),
            agg.total,
            agg.levels.len()
        );
        println!();

        // Indent the table
        for line in self.build_table().to_string().lines() {
            println!("    {}", line);
        }

        println!();
        println!(
            "      {} proportions share one denominator ({} rows); each bucket sums to its share",
            style("ℹ").cyan(),
            agg.total
        );
    }
}
