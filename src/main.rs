use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod load;
mod milestone;
mod models;
mod pipeline;
mod report;

use models::{CategoricalField, Selector, Selectors, SortField, SortOrder, SortSpec};

#[derive(Parser)]
#[command(name = "milestone-matrix")]
#[command(about = "Per-student milestone progress matrix over time", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DatasetArgs {
    /// Dataset to read (.json array of records or .csv export)
    #[arg(long, env = "MATRIX_DATA", default_value = "data/matrix_data.json")]
    data: PathBuf,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long, default_value = "All")]
    district: Selector,
    #[arg(long, default_value = "All")]
    mandal: Selector,
    #[arg(long, default_value = "All")]
    school: Selector,
}

impl FilterArgs {
    fn selectors(self) -> Selectors {
        Selectors {
            district: self.district,
            mandal: self.mandal,
            school: self.school,
        }
    }
}

#[derive(Args)]
struct SortArgs {
    #[arg(long, value_enum, default_value_t = SortField::Student)]
    sort_by: SortField,
    #[arg(long, value_enum, default_value_t = SortOrder::Ascending)]
    order: SortOrder,
}

impl SortArgs {
    fn spec(&self) -> SortSpec {
        SortSpec {
            field: self.sort_by,
            order: self.order,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Html,
    Markdown,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the progress matrix as HTML or markdown
    Render {
        #[command(flatten)]
        dataset: DatasetArgs,
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        sort: SortArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Html)]
        format: OutputFormat,
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List the selector options for district, mandal and school
    Filters {
        #[command(flatten)]
        dataset: DatasetArgs,
    },
    /// Count students, dates and cell categories for a selection
    Summary {
        #[command(flatten)]
        dataset: DatasetArgs,
        #[command(flatten)]
        filters: FilterArgs,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            dataset,
            filters,
            sort,
            format,
            out,
        } => {
            let data = load::load_dataset(&dataset.data)?;
            let selectors = filters.selectors();
            let spec = sort.spec();
            let view = pipeline::render(&data, &selectors, spec);

            let output = match format {
                OutputFormat::Html => report::build_html(&view, &selectors, spec),
                OutputFormat::Markdown => report::build_markdown(&view, &selectors, spec),
            };

            match out {
                Some(path) => {
                    std::fs::write(&path, output)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!(
                        students = view.rows.len(),
                        dates = view.dates.len(),
                        path = %path.display(),
                        "matrix written"
                    );
                    println!("Matrix written to {}.", path.display());
                }
                None => print!("{output}"),
            }
        }
        Commands::Filters { dataset } => {
            let data = load::load_dataset(&dataset.data)?;
            for field in CategoricalField::ALL {
                let options = pipeline::distinct_values(&data, field);
                println!("{}: {}", field.label(), options.join(", "));
            }
        }
        Commands::Summary { dataset, filters } => {
            let data = load::load_dataset(&dataset.data)?;
            let view = pipeline::render(&data, &filters.selectors(), SortSpec::default());
            let summary = pipeline::summarize(&view);

            if summary.students == 0 {
                println!("No students match these filters.");
                return Ok(());
            }

            println!(
                "{} students across {} dates",
                summary.students, summary.dates
            );
            println!("- transitions: {}", summary.transitions);
            println!("- no change: {}", summary.no_change);
            println!("- no observation: {}", summary.empty);
        }
    }

    Ok(())
}
