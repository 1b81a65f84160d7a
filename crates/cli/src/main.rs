mod inspect;
mod load;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use schemaform_core::{FormTree, TreeBuilder, TreeConfig, ValidationMode};
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Inspect JSON Schema form trees.
#[derive(Parser)]
#[command(name = "schemaform", version, about = "Inspect JSON Schema form trees")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a form tree, apply writes, and print its value, requiredness and errors
    Inspect {
        /// Path to the JSON Schema file
        schema: PathBuf,
        /// Path to a JSON file with the initial value
        #[arg(long)]
        value: Option<PathBuf>,
        /// Write a value before printing: `<pointer>=<json>` (repeatable)
        #[arg(long = "set", value_name = "POINTER=JSON")]
        sets: Vec<String>,
        /// Path to a TOML tree configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate a value against a schema through the form tree
    Validate {
        /// Path to the JSON Schema file
        schema: PathBuf,
        /// Path to the JSON value file
        value: PathBuf,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            schema,
            value,
            sets,
            config,
        } => {
            inspect::cmd_inspect(
                &schema,
                value.as_deref(),
                &sets,
                config.as_deref(),
                cli.output,
                cli.quiet,
            );
        }
        Commands::Validate { schema, value } => {
            cmd_validate(&schema, &value, cli.output, cli.quiet);
        }
    }
}

/// Log to stderr, filtered by `SCHEMAFORM_LOG` (default `warn`).
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("SCHEMAFORM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cmd_validate(schema_path: &Path, value_path: &Path, output: OutputFormat, quiet: bool) {
    let schema = load::read_json(schema_path).unwrap_or_else(|msg| exit_with(&msg, output, quiet));
    let value = load::read_json(value_path).unwrap_or_else(|msg| exit_with(&msg, output, quiet));

    let config = TreeConfig {
        validation_mode: ValidationMode::OnRequest,
        ..TreeConfig::default()
    };
    let mut tree = build_tree(schema, Some(value), config, output, quiet);
    let errors = tree.validate();

    match output {
        OutputFormat::Text => {
            if errors.is_empty() {
                if !quiet {
                    println!("valid");
                }
            } else {
                for error in &errors {
                    println!("{}", inspect::format_error(error));
                }
            }
        }
        OutputFormat::Json => {
            let result = serde_json::json!({
                "valid": errors.is_empty(),
                "errors": errors,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&result).unwrap_or_default()
            );
        }
    }
    if !errors.is_empty() {
        process::exit(1);
    }
}

pub(crate) fn build_tree(
    schema: serde_json::Value,
    value: Option<serde_json::Value>,
    config: TreeConfig,
    output: OutputFormat,
    quiet: bool,
) -> FormTree {
    let mut builder = TreeBuilder::new(schema).config(config);
    if let Some(value) = value {
        builder = builder.default_value(value);
    }
    match builder.build() {
        Ok(tree) => tree,
        Err(e) => {
            match output {
                OutputFormat::Text => {
                    report_error(&format!("error: {} [{}]", e, e.code()), output, quiet)
                }
                OutputFormat::Json => {
                    if !quiet {
                        eprintln!("{}", serde_json::json!({ "error": e.to_json_value() }));
                    }
                }
            }
            process::exit(1);
        }
    }
}

pub(crate) fn exit_with(msg: &str, output: OutputFormat, quiet: bool) -> ! {
    report_error(msg, output, quiet);
    process::exit(1);
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => eprintln!("{}", serde_json::json!({ "error": msg })),
    }
}
