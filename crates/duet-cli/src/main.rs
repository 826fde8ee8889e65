mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use duet::Agent;

#[derive(Parser)]
#[command(
    name = "duet",
    version,
    about = "Turn-based collaboration between an author agent and a reviewer agent"
)]
struct Cli {
    /// Project directory holding the .duet session [env: DUET_PROJECT_DIR]
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new session (replaces an existing one)
    Init {
        /// Task description
        #[arg(required = true, num_args = 1..)]
        task: Vec<String>,
    },

    /// Print whose turn it is
    WhoseTurn,

    /// Submit work or feedback and pass the turn
    Submit {
        /// author or reviewer
        agent: Agent,

        /// Submission text, starting with a tag such as [PLAN] or [PASS]
        content: Vec<String>,

        /// Read the submission from a file
        #[arg(long, conflicts_with_all = ["stdin", "content"])]
        file: Option<PathBuf>,

        /// Read the submission from standard input
        #[arg(long, conflicts_with = "content")]
        stdin: bool,
    },

    /// Show task, step, round, turn and last action
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a session file, e.g. work.md or review.md
    Read {
        /// Bare file name inside .duet/
        file: String,
    },

    /// Print the collaboration history
    History,

    /// Enter a new step once both agents agree
    Step {
        /// Step name
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,

        /// Skip the consensus check
        #[arg(long)]
        force: bool,
    },

    /// Copy the session into .duet-archive/
    Archive {
        /// Archive name (default: timestamped)
        name: Option<String>,
    },

    /// Remove the session directory
    Clean,

    /// Run content and consensus checks without changing anything
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },

    /// Manage the delivery watcher
    Watcher {
        #[command(subcommand)]
        action: WatcherAction,
    },
}

#[derive(Subcommand)]
enum PolicyAction {
    /// Check an agent's latest submission against the content rules
    Check {
        /// author or reviewer
        agent: Agent,
    },
    /// Check that the latest tags agree
    CheckConsensus,
    /// Check consensus and both latest submissions
    CheckNextStep,
}

#[derive(Subcommand)]
enum WatcherAction {
    /// Run the watcher in the foreground
    Run {
        /// Config file (default: duet.toml in the project)
        #[arg(long)]
        config: Option<PathBuf>,

        /// tmux session name
        #[arg(long)]
        session: Option<String>,

        /// Poll interval in milliseconds
        #[arg(long)]
        poll_ms: Option<u64>,

        /// Poll only, without a filesystem listener
        #[arg(long)]
        no_listener: bool,
    },
    /// Stop the running watcher
    Stop,
    /// Report whether a watcher is running
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duet=info,duet_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let project = duet::paths::resolve_project_dir(cli.project)?;
    tracing::debug!(project = %project.display(), "resolved project dir");

    match cli.command {
        Commands::Init { task } => commands::init(&project, &task.join(" ")),
        Commands::WhoseTurn => commands::whose_turn(&project),
        Commands::Submit {
            agent,
            content,
            file,
            stdin,
        } => {
            let input = if let Some(path) = file {
                duet::SubmissionInput::File(path)
            } else if stdin {
                duet::SubmissionInput::Stdin
            } else if content.is_empty() {
                anyhow::bail!("provide content, --file PATH or --stdin");
            } else {
                duet::SubmissionInput::Inline(content.join(" "))
            };
            commands::submit(&project, agent, input)
        }
        Commands::Status { json } => commands::status(&project, json),
        Commands::Read { file } => commands::read(&project, &file),
        Commands::History => commands::history(&project),
        Commands::Step { name, force } => commands::step(&project, &name.join(" "), force),
        Commands::Archive { name } => commands::archive(&project, name.as_deref()),
        Commands::Clean => commands::clean(&project),
        Commands::Policy { action } => match action {
            PolicyAction::Check { agent } => commands::policy_check(&project, agent),
            PolicyAction::CheckConsensus => commands::check_consensus(&project),
            PolicyAction::CheckNextStep => commands::check_next_step(&project),
        },
        Commands::Watcher { action } => match action {
            WatcherAction::Run {
                config,
                session,
                poll_ms,
                no_listener,
            } => {
                let overrides = duet::ConfigOverrides {
                    config_path: config,
                    session,
                    poll_ms,
                    no_listener,
                };
                commands::watcher_run(&project, &overrides).await
            }
            WatcherAction::Stop => commands::watcher_stop(&project).await,
            WatcherAction::Status => commands::watcher_status(&project),
        },
    }
}
