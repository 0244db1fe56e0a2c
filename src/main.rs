use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use vipconnect::app::{App, AppError, Request, prepare};
use vipconnect::client::AnyConnect;
use vipconnect::config::CONFIG_FILE_NAME;
use vipconnect::notify::DesktopNotifier;
use vipconnect::vipcode::OathTool;
use vipconnect::Config;

#[derive(Parser)]
#[command(name = "vipconnect")]
#[command(about = "Connect to AnyConnect VPN with a Symantec VIP one-time code")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Username for VPN authentication
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Password for VPN authentication
    #[arg(short, long, global = true)]
    password: Option<String>,

    /// Config file (default: ./vipconnect.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to HOST, answering the second factor with a fresh VIP code
    Connect {
        /// VPN host to connect to
        host: Option<String>,
    },
    /// Disconnect from the VPN
    Disconnect,
    /// Show current VPN status
    Status,
    /// Print a VIP code generated from the secret file
    Vipcode,
    /// Generate default config file
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout and are not failures
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let request = match cli.command {
        Commands::Init => {
            let path = cli.config.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
            info!("Generating default config...");
            if let Err(e) = Config::init(&path) {
                error!("{}", e);
                std::process::exit(1);
            }
            println!("Created default config: {}", path.display());
            return Ok(());
        }
        Commands::Connect { host } => Request::Connect {
            username: cli.user,
            password: cli.password,
            host,
        },
        Commands::Disconnect => Request::Disconnect,
        Commands::Status => Request::Status,
        Commands::Vipcode => Request::VipCode,
    };

    let (operation, config) = match prepare(request, cli.config.as_deref()) {
        Ok(prepared) => prepared,
        Err(e) => fail(e),
    };

    let client = AnyConnect::new(
        config.client_path.clone(),
        Duration::from_secs(config.prompt_timeout_secs),
    );
    let totp = OathTool::new(PathBuf::from(&config.totp_tool), config.totp_args.clone());
    let notifier = DesktopNotifier::new(config.notifications);
    let app = App::new(config, client, totp, notifier);

    match app.run(operation).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => fail(e),
    }
}

fn fail(e: AppError) -> ! {
    error!("{}", e);
    if matches!(
        e,
        AppError::MissingUsername
            | AppError::MissingPassword
            | AppError::MissingHost
            | AppError::ControlCharacters(_)
    ) {
        eprintln!("Usage: vipconnect connect -u USER -p PASS HOST");
    }
    std::process::exit(1);
}
