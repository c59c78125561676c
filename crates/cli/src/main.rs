use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "safebot")]
#[command(about = "SafeBot: Messenger emergency relay for SafeTrek", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the Messenger webhook server (GET/POST /webhook, GET / health).
    Serve {
        /// Config file path (default: SAFEBOT_CONFIG_PATH or ~/.safebot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Listen port (default from PORT, config, or 1337)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Print the SafeTrek login URL for the configured client id.
    LoginUrl {
        /// Config file path (default: SAFEBOT_CONFIG_PATH or ~/.safebot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("safebot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::LoginUrl { config }) => {
            if let Err(e) = run_login_url(config) {
                log::error!("login-url failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = safebot::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting webhook on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    safebot::gateway::run_gateway(config).await
}

fn run_login_url(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, _path) = safebot::config::load_config(config_path)?;
    let http = safebot::gateway::build_http_client(&config)?;
    let client = safebot::safetrek::SafeTrekClient::from_config(http, &config);
    let url = client.authorization_url()?;
    println!("{}", url);
    Ok(())
}
