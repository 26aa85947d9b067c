use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use pastoralist::cli::update::UpdateArgs;
use pastoralist::Result;
use std::io;

#[derive(Parser)]
#[command(name = "pastoralist")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Track, explain and prune package.json overrides", long_about = None)]
#[command(propagate_version = true)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Show debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log errors
    #[arg(long, global = true)]
    silent: bool,

    #[command(flatten)]
    update: UpdateArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile overrides with the appendix (the default command)
    Update(UpdateArgs),

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_logging(cli: &Cli) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if cli.silent {
        builder.filter_level(log::LevelFilter::Error);
    } else if cli.debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}", format!("Error: failed to create tokio runtime: {}", e).red());
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run_async(cli)) {
        eprintln!("{}", format!("Error: {:#}", e).red());
        std::process::exit(1);
    }
}

async fn run_async(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Update(args)) => {
            pastoralist::cli::update::run(args).await?;
        }

        Some(Commands::Completions { shell }) => {
            generate(shell, &mut Cli::command(), "pastoralist", &mut io::stdout());
        }

        None => {
            pastoralist::cli::update::run(cli.update).await?;
        }
    }

    Ok(())
}
