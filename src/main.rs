use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use lab::App;
use lab::Config;
use lab::clients::git::GitClient;
use lab::clients::gitlab::GitlabClient;
use lab::commands::ci::CiCreateOptions;
use lab::commands::ci::CiTriggerOptions;
use lab::commands::mr_checkout::CheckoutOptions;
use lab::commands::todo::TodoListOptions;
use lab::error;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "lab")]
#[command(about = "Work with GitLab merge requests, pipelines and todos from a git checkout", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Work with merge requests
    #[command(subcommand)]
    Mr(MrCommands),
    /// Work with CI pipelines
    #[command(subcommand)]
    Ci(CiCommands),
    /// Work with your todos
    #[command(subcommand)]
    Todo(TodoCommands),
}

#[derive(Subcommand)]
pub enum MrCommands {
    /// Check out a merge request into a local branch
    Checkout {
        /// [remote] <id|branch>
        #[arg(required = true, num_args = 1..=2)]
        args: Vec<String>,
        /// Local branch name (defaults to the MR source branch)
        #[arg(short, long)]
        branch: Option<String>,
        /// Remote to track (defaults to the remote of the source project)
        #[arg(short, long)]
        remote: Option<String>,
        /// Track the MR source branch
        #[arg(short, long)]
        track: bool,
        /// Replace an existing local branch
        #[arg(short, long)]
        force: bool,
        /// Use HTTPS when adding a new remote
        #[arg(long, visible_alias = "http")]
        https: bool,
    },
}

#[derive(Subcommand)]
pub enum CiCommands {
    /// Create a pipeline for a branch or merge request
    #[command(visible_alias = "run")]
    Create {
        /// [remote] [branch], or [remote] [id|branch] with --merge-request
        #[arg(num_args = 0..=2)]
        args: Vec<String>,
        /// Create a merge request pipeline
        #[arg(long)]
        merge_request: bool,
        /// Project path to create the pipeline in
        #[arg(short, long)]
        project: Option<String>,
    },
    /// Run a pipeline trigger
    Trigger {
        /// [remote] [branch]
        #[arg(num_args = 0..=2)]
        args: Vec<String>,
        /// Pipeline trigger token
        #[arg(short, long, env = "CI_JOB_TOKEN", default_value = "", hide_env_values = true)]
        token: String,
        /// Pipeline variable as key=value (repeatable)
        #[arg(short, long = "variable")]
        variables: Vec<String>,
        /// Project path to trigger the pipeline in
        #[arg(short, long)]
        project: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TodoCommands {
    /// List your todos
    #[command(visible_alias = "ls")]
    List {
        /// Show state, title and action for each todo
        #[arg(short, long)]
        pretty: bool,
        /// Filter by target type: all, mr or issue
        #[arg(short = 't', long = "type", default_value = "all")]
        target_type: String,
        /// Number of todos to list; anything non-numeric lists all
        #[arg(short = 'n', long, default_value = "10")]
        number: String,
    },
}

fn setup_logging() {
    let timer = tracing_subscriber::fmt::time::ChronoLocal::new("%H:%M:%S%.3f".into());
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_timer(timer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli, stdout: &mut impl std::io::Write) -> Result<()> {
    let config = Config::load()?;
    let app = App::new(
        config.clone(),
        GitClient::new(std::env::current_dir()?),
        GitlabClient::new(&config),
    );

    match cli.command {
        Commands::Mr(MrCommands::Checkout {
            args,
            branch,
            remote,
            track,
            force,
            https,
        }) => {
            let options = CheckoutOptions {
                branch,
                remote,
                track,
                force,
                https,
            };
            app.cmd_mr_checkout(&args, &options, stdout).await
        }
        Commands::Ci(CiCommands::Create {
            args,
            merge_request,
            project,
        }) => {
            let options = CiCreateOptions {
                project,
                merge_request,
            };
            app.cmd_ci_create(&args, &options, stdout).await
        }
        Commands::Ci(CiCommands::Trigger {
            args,
            token,
            variables,
            project,
        }) => {
            let options = CiTriggerOptions {
                project,
                token,
                variables,
            };
            app.cmd_ci_trigger(&args, &options, stdout).await
        }
        Commands::Todo(TodoCommands::List {
            pretty,
            target_type,
            number,
        }) => {
            let options = TodoListOptions::from_flags(&target_type, &number, pretty);
            app.cmd_todo_list(&options, stdout).await
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    setup_logging();
    let cli = Cli::parse();

    match run(cli, &mut std::io::stdout()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => error::report(&err, &mut std::io::stdout(), &mut std::io::stderr()),
    }
}
