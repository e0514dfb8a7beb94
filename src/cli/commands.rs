//! Subcommand runners

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use console::style;
use polars::prelude::*;

use super::args::{Cli, Commands, TableOptions};
use crate::pipeline::{
    aggregate, load_table, normalize, prediction_grid, probabilities_from_frame,
    reshape_predictions, Dimension, EmpiricalModel, FittedModel, Field, ModelSpec,
    ObservationTable, OrdinalModel, CUMULATIVE_COLUMN,
};
use crate::report::{export_aggregation_json, save_table, AggregationSummary, ExportParams};
use crate::utils::{
    create_spinner, finish_with_success, finish_with_warning, print_banner, print_completion,
    print_config, print_count, print_info, print_step_header, print_success, print_warning,
};

/// Run the parsed command line
pub fn run(cli: &Cli) -> Result<()> {
    let output = cli.command.output_path();
    let start = Instant::now();

    print_banner(env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Normalize { input, .. } => run_normalize(input, &output, &cli.table)?,
        Commands::Aggregate {
            input,
            by,
            target,
            cumulative,
            export_json,
            ..
        } => run_aggregate(
            input,
            &output,
            &cli.table,
            &AggregateRequest {
                dimensions: by,
                target: *target,
                cumulative: *cumulative,
                export_json: export_json.as_deref(),
            },
        )?,
        Commands::Reshape {
            newdata,
            probabilities,
            levels,
            ..
        } => run_reshape(newdata, probabilities, levels, &output, &cli.table)?,
        Commands::Predict { input, formula, .. } => {
            run_predict(input, formula, &output, &cli.table)?
        }
    }

    print_completion(&format!(
        "Done in {:.2}s",
        start.elapsed().as_secs_f64()
    ));
    Ok(())
}

/// Load the input table and normalize it (steps 1 and 2 of every table command)
fn load_observations(input: &Path, table: &TableOptions) -> Result<ObservationTable> {
    print_step_header(1, "Load Observations");
    let spinner = create_spinner("Reading table...");
    let df = load_table(input, &table.load_options())?;
    finish_with_success(
        &spinner,
        &format!("Loaded {} rows × {} columns", df.height(), df.width()),
    );

    print_step_header(2, "Normalize Schema");
    let spinner = create_spinner("Validating arrival orders and group sizes...");
    let observations = match normalize(&df, &table.normalize_options()) {
        Ok(observations) => observations,
        Err(e) => {
            finish_with_warning(&spinner, "Validation failed");
            return Err(e).with_context(|| format!("Invalid observations in {}", input.display()));
        }
    };
    finish_with_success(&spinner, "Observations validated");

    print_count("observation(s)", observations.len());
    println!(
        "      Largest group: {} individuals, percentile buckets of {}",
        style(observations.max_group_size()).yellow().bold(),
        style(observations.percentile_buckets().width()).yellow()
    );

    Ok(observations)
}

fn save_step(step: u8, df: &mut DataFrame, output: &Path) -> Result<()> {
    print_step_header(step, "Save Results");
    let spinner = create_spinner("Writing output file...");
    save_table(df, output)?;
    finish_with_success(&spinner, &format!("Saved to {}", output.display()));
    Ok(())
}

fn run_normalize(input: &Path, output: &Path, table: &TableOptions) -> Result<()> {
    print_config(
        "Normalize",
        input,
        output,
        &[
            ("Width", table.percentile_width.to_string()),
            ("Incomplete", table.allow_incomplete.to_string()),
        ],
    );

    let observations = load_observations(input, table)?;
    let mut df = observations
        .to_dataframe()
        .context("Failed to build normalized table")?;

    save_step(3, &mut df, output)
}

struct AggregateRequest<'a> {
    dimensions: &'a [Dimension],
    target: Field,
    cumulative: bool,
    export_json: Option<&'a Path>,
}

fn run_aggregate(
    input: &Path,
    output: &Path,
    table: &TableOptions,
    request: &AggregateRequest,
) -> Result<()> {
    let by: Vec<String> = request.dimensions.iter().map(|d| d.to_string()).collect();
    print_config(
        "Aggregate",
        input,
        output,
        &[
            ("Target", request.target.to_string()),
            ("By", by.join(", ")),
            ("Width", table.percentile_width.to_string()),
        ],
    );

    let observations = load_observations(input, table)?;

    print_step_header(3, "Aggregate Levels");
    let spinner = create_spinner("Counting rows per bucket and level...");
    let aggregation = aggregate(&observations, request.dimensions, request.target)
        .context("Aggregation failed")?;
    finish_with_success(&spinner, "Aggregation complete");

    let summary = AggregationSummary::new(&aggregation);
    summary.display();
    let unobserved = summary.unobserved_levels();
    if !unobserved.is_empty() {
        print_info(&format!(
            "Level(s) with no rows: {}",
            unobserved.join(", ")
        ));
    }

    let mut df = aggregation
        .to_dataframe()
        .context("Failed to build aggregation table")?;
    if request.cumulative {
        let cumulative: Vec<f64> = aggregation
            .cumulative()
            .iter()
            .map(|b| b.cumulative_proportion)
            .collect();
        df.with_column(Column::new(CUMULATIVE_COLUMN.into(), cumulative))
            .context("Failed to add cumulative proportions")?;
    }

    save_step(4, &mut df, output)?;

    if let Some(json_path) = request.export_json {
        let spinner = create_spinner("Exporting aggregation to JSON...");
        let input_file = input.display().to_string();
        export_aggregation_json(
            &aggregation,
            json_path,
            &ExportParams {
                input_file: &input_file,
                percentile_width: table.percentile_width,
                include_cumulative: request.cumulative,
            },
        )?;
        finish_with_success(
            &spinner,
            &format!("Aggregation exported to {}", json_path.display()),
        );
    }

    Ok(())
}

fn run_reshape(
    newdata_path: &Path,
    probabilities_path: &Path,
    levels: &[String],
    output: &Path,
    table: &TableOptions,
) -> Result<()> {
    print_config(
        "Reshape",
        newdata_path,
        output,
        &[("Matrix", probabilities_path.display().to_string())],
    );

    print_step_header(1, "Load Predictions");
    let spinner = create_spinner("Reading combinations and probabilities...");
    let newdata = load_table(newdata_path, &table.load_options())?;
    let wide = load_table(probabilities_path, &table.load_options())?;
    let (header, matrix) = probabilities_from_frame(&wide)
        .with_context(|| format!("Invalid probability table {}", probabilities_path.display()))?;
    finish_with_success(
        &spinner,
        &format!(
            "Loaded {} combination(s) × {} level(s)",
            matrix.nrows(),
            matrix.ncols()
        ),
    );

    let labels = if levels.is_empty() {
        header
    } else {
        levels.to_vec()
    };

    print_step_header(2, "Reshape to Long Form");
    let long = reshape_predictions(&newdata, &matrix, &labels)
        .context("Failed to reshape prediction matrix")?;
    print_count("prediction row(s)", long.len());
    let mut df = long
        .to_dataframe()
        .context("Failed to build long-form table")?;
    print_success("Reshaped");

    save_step(3, &mut df, output)
}

fn run_predict(input: &Path, spec: &ModelSpec, output: &Path, table: &TableOptions) -> Result<()> {
    print_config(
        "Predict",
        input,
        output,
        &[
            ("Formula", spec.to_string()),
            ("Width", table.percentile_width.to_string()),
        ],
    );

    let observations = load_observations(input, table)?;

    print_step_header(3, "Fit Model");
    if !spec.random_effects.is_empty() {
        print_warning("Random effects are recorded but not modelled by the empirical backend");
    }
    let spinner = create_spinner("Fitting empirical level frequencies...");
    let model = EmpiricalModel;
    let fitted = model
        .fit(spec, &observations)
        .context("Model fitting failed")?;
    finish_with_success(
        &spinner,
        &format!(
            "Fitted {} combination(s) × {} level(s)",
            fitted.combinations().len(),
            fitted.level_labels().len()
        ),
    );

    print_step_header(4, "Predict and Reshape");
    let newdata = prediction_grid(&fitted).context("Failed to build prediction grid")?;
    let matrix = model
        .predict(&fitted, &newdata)
        .context("Prediction failed")?;
    let long = reshape_predictions(&newdata, &matrix, &fitted.level_labels())
        .context("Failed to reshape predictions")?;
    let mut df = long
        .to_dataframe()
        .context("Failed to build long-form table")?;
    print_count("prediction row(s)", long.len());

    save_step(5, &mut df, output)
}
