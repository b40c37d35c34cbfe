// ABOUTME: Command line argument definitions and parsing using Clap
// ABOUTME: Defines the main CLI structure and subcommands for taskweave

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "taskweave")]
#[command(about = "Run and schedule trigger-driven task flows described in YAML")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a flow once and print its report
    Run {
        #[arg(help = "Path to flow YAML file")]
        flow: PathBuf,

        #[arg(
            short,
            long = "root",
            help = "Start from this task instead of the flow's root tasks (repeatable)"
        )]
        roots: Vec<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        #[arg(short, long, help = "Write the report to a file instead of stdout")]
        output: Option<PathBuf>,
    },

    /// Load a flow and check its trigger graph without running it
    Validate {
        #[arg(help = "Path to flow YAML file")]
        flow: PathBuf,
    },

    /// Register flows with the scheduler and run until interrupted
    Schedule {
        #[arg(required = true, help = "Paths to flow YAML files")]
        flows: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
