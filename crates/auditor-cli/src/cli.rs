//! Command-line arguments.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "auditor",
    version,
    about = "Audit contracts for legal risk with an extract, audit and critique LLM pipeline",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a risk audit on a contract
    Audit(AuditArgs),

    /// Risk playbook tools
    Playbook {
        #[command(subcommand)]
        command: PlaybookCommand,
    },

    /// List the configured provider chain and credential availability
    Providers {
        /// Runtime config file (YAML or JSON)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[derive(Parser, Debug)]
pub struct AuditArgs {
    /// Contract to audit (plain text, or PDF when built with the `pdf` feature)
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Runtime config file (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Risk playbook, overriding the configured path
    #[arg(long, value_name = "FILE")]
    pub playbook: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
    pub format: OutputFormat,

    /// Write the report here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum PlaybookCommand {
    /// Check whether a playbook loads cleanly or would degrade to empty
    Validate {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The rendered markdown report
    Markdown,
    /// The full audit result as JSON
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_args() {
        let cli = Cli::try_parse_from([
            "auditor",
            "audit",
            "contract.txt",
            "--format",
            "json",
            "--playbook",
            "pb.yaml",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Command::Audit(args) => {
                assert_eq!(args.path, PathBuf::from("contract.txt"));
                assert_eq!(args.format, OutputFormat::Json);
                assert_eq!(args.playbook, Some(PathBuf::from("pb.yaml")));
                assert!(args.output.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_default_format_is_markdown() {
        let cli = Cli::try_parse_from(["auditor", "audit", "c.txt"]).unwrap();
        match cli.command {
            Command::Audit(args) => assert_eq!(args.format, OutputFormat::Markdown),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_playbook_validate() {
        let cli = Cli::try_parse_from(["auditor", "playbook", "validate", "pb.json"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Playbook {
                command: PlaybookCommand::Validate { .. }
            }
        ));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["auditor"]).is_err());
    }
}
