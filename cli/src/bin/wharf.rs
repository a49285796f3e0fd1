use clap::{Parser, Subcommand};
use tracing::instrument;

#[derive(Parser, Debug)]
#[command(
    name = "wharf",
    version,
    about = "Declarative file deployment: diff a named profile against remote targets, review, and upload",
    long_about = "`wharf` reads a named profile from a YAML configuration file, computes the source file set \
(a git revision range or an explicit filesystem path list), diffs it against one or more remote targets over \
SFTP, SCP, rsync, or a local filesystem transport, and opens an interactive review UI before transferring \
anything.

EXAMPLES:
    # Review and deploy the 'production' profile
    wharf run production

    # Use a config file outside the working directory
    wharf run production --config ./deploy/wharf.yaml

    # List the profiles declared in a config file
    wharf list

    # Write a starter configuration
    wharf init"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to the YAML configuration file
    #[arg(short, long, global = true, default_value = "wharf.yaml", value_name = "PATH")]
    config: std::path::PathBuf,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: WARN)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode, suppress non-error output
    #[arg(short = 'q', long = "quiet", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Diff a profile against its targets, review, and upload on confirmation
    Run {
        /// Name of the profile to run, as declared in the configuration file
        profile: String,

        /// Skip the interactive review and confirm the upload immediately
        #[arg(long)]
        yes: bool,

        /// Override the profile's configured review server port
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,
    },
    /// List the profile names declared in the configuration file
    List,
    /// Write a starter configuration file (refuses to overwrite)
    Init {
        /// Where to write the configuration file (default: --config)
        path: Option<std::path::PathBuf>,
    },
}

#[instrument(skip(args))]
async fn run_command(args: &Args) -> anyhow::Result<i32> {
    match &args.command {
        Command::Run { profile, yes, port } => {
            let outcome = wharf_cli::run_profile(&args.config, profile, *yes, *port).await?;
            Ok(outcome.exit_code())
        }
        Command::List => {
            let names = wharf_cli::list_profiles(&args.config)?;
            for name in names {
                println!("{name}");
            }
            Ok(0)
        }
        Command::Init { path } => {
            let target = path.clone().unwrap_or_else(|| args.config.clone());
            if target.exists() {
                anyhow::bail!("{:?} already exists, refusing to overwrite", target);
            }
            std::fs::write(&target, wharf_cli::INIT_TEMPLATE)?;
            println!("wrote {:?}", target);
            Ok(0)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let output = common::logging::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        log_file: None,
    };
    common::logging::init_tracing(&output)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let exit_code = runtime.block_on(async {
        match run_command(&args).await {
            Ok(code) => code,
            Err(e) => {
                tracing::error!("{e:#}");
                1
            }
        }
    });
    std::process::exit(exit_code);
}
