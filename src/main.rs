use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use git_chunks::{Config, GitChunks, GitChunksError, format_status};
use std::io;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "git-chunks")]
#[command(about = "Hunk and line level git staging")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: Config,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List hunks and lines with the indices the other commands take
    Diff {
        /// Show staged changes instead of unstaged ones
        #[arg(long)]
        cached: bool,
        /// Files to list (all changed files when omitted)
        files: Vec<String>,
    },
    /// Show which changes of a file are staged
    Status {
        file: String,
    },
    /// Stage lines by reference (e.g., file.nix:10..15,-20 or file.nix:h0)
    Stage {
        /// File and line references
        #[arg(required = true)]
        file_refs: Vec<String>,
    },
    /// Remove lines from the index by reference, read against the staged diff
    Unstage {
        #[arg(required = true)]
        file_refs: Vec<String>,
    },
    /// Print shell completions
    Completions {
        shell: Shell,
    },
    /// Print the man page
    Man,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), GitChunksError> {
    let chunks = GitChunks::new(&cli.config);

    match cli.command {
        Commands::Diff { cached, files } => {
            print!("{}", chunks.diff(&files, cached)?);
        }
        Commands::Status { file } => {
            print!("{}", format_status(&chunks.status(&file)?));
        }
        Commands::Stage { file_refs } => {
            for file_ref in &file_refs {
                let snapshot = chunks.stage(file_ref)?;
                print!("{}", format_status(&snapshot));
            }
        }
        Commands::Unstage { file_refs } => {
            for file_ref in &file_refs {
                let snapshot = chunks.unstage(file_ref)?;
                print!("{}", format_status(&snapshot));
            }
        }
        Commands::Completions { .. } | Commands::Man => {}
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "git-chunks", &mut io::stdout());
            return ExitCode::SUCCESS;
        }
        Commands::Man => {
            let man = clap_mangen::Man::new(Cli::command());
            return match man.render(&mut io::stdout()) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("error: {err}");
                    ExitCode::FAILURE
                }
            };
        }
        _ => {}
    }

    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
