use crate::commands::{
    run_badge_evaluate, run_engagement_evaluate, run_rules_lint, BadgeEvaluateArgs,
    EngagementEvaluateArgs, RulesLintArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use jrank_engine::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "JRank Criteria Engine",
    about = "Serve or exercise the JRank engagement scoring and badge engine from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Score engagement facts against a rule document
    Engagement {
        #[command(subcommand)]
        command: EngagementCommand,
    },
    /// Check metric snapshots for badge eligibility
    Badges {
        #[command(subcommand)]
        command: BadgeCommand,
    },
    /// Inspect rule documents
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum EngagementCommand {
    /// Evaluate a single engagement fact and print the score breakdown
    Evaluate(EngagementEvaluateArgs),
}

#[derive(Subcommand, Debug)]
enum BadgeCommand {
    /// Evaluate every snapshot in a metrics CSV
    Evaluate(BadgeEvaluateArgs),
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
    /// Validate a rule document and report rejected or disabled rules
    Lint(RulesLintArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override the configured rule document path
    #[arg(long)]
    pub(crate) rules: Option<std::path::PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Engagement {
            command: EngagementCommand::Evaluate(args),
        } => run_engagement_evaluate(args),
        Command::Badges {
            command: BadgeCommand::Evaluate(args),
        } => run_badge_evaluate(args),
        Command::Rules {
            command: RulesCommand::Lint(args),
        } => run_rules_lint(args),
    }
}
