use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use iota::{bootstrap_admin, initialize_root, serve, RootConfig, RootError};
use iota_vault::ConfigKey;

/// iota: over-the-air update server for small devices
///
/// Serves firmware images, per-device config and an encrypted global
/// config to devices, and accepts deployments from token holders.
#[derive(Parser, Debug)]
#[command(name = "iota", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the instance directory, token database and default configuration
    Init {
        /// Instance directory for tokens and artifacts
        #[arg(long)]
        instance_path: Option<PathBuf>,
    },

    /// Start the HTTP server
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        bind: Option<String>,

        /// Port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Manage access tokens
    #[command(subcommand)]
    Token(TokenCommand),

    /// Print a fresh random global config key
    Keygen,
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// List tokens and their permissions
    List {
        #[arg(long)]
        name: Option<String>,
    },

    /// Create a token and print its secret
    Create {
        #[arg(long)]
        name: String,

        /// Any combination of a (admin), r (read), w (write)
        #[arg(long)]
        permissions: String,
    },

    /// Change permissions and/or regenerate the secret
    Update {
        #[arg(long)]
        name: String,

        #[arg(long)]
        permissions: Option<String>,

        #[arg(long)]
        regenerate: bool,
    },

    /// Delete a token
    Delete {
        #[arg(long)]
        name: String,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("iota=debug,iota_auth=debug,iota_vault=debug,iota_deploy=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("iota=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<RootConfig, RootError> {
    match path {
        Some(p) => RootConfig::load(p),
        None => {
            let default_path = RootConfig::default_config_path();
            RootConfig::load(&default_path)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli).await;
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), RootError> {
    match cli.command {
        Commands::Init { instance_path } => cmd_init(cli.config.as_ref(), instance_path),
        Commands::Serve { bind, port } => cmd_serve(cli.config.as_ref(), bind, port).await,
        Commands::Token(cmd) => cmd_token(cli.config.as_ref(), cmd),
        Commands::Keygen => {
            println!("{}", ConfigKey::generate().to_base64().as_str());
            Ok(())
        }
    }
}

fn cmd_init(config_path: Option<&PathBuf>, instance_path: Option<PathBuf>) -> Result<(), RootError> {
    let mut config = load_config(config_path)?;
    if let Some(ip) = instance_path {
        config.instance_path = ip;
    }

    let state = initialize_root(config.clone())?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(|| config.instance_path.join("config.toml"));
    config.save(&save_path)?;
    info!(path = %save_path.display(), "configuration saved");

    println!("iota initialized");
    println!("  instance: {}", config.instance_path.display());
    println!("  database: {}", config.database_path().display());
    println!("  config:   {}", save_path.display());

    match bootstrap_admin(&state)? {
        Some(issued) => {
            println!();
            println!("admin token (shown once, store it now):");
            println!("  name:        {}", issued.name);
            println!("  permissions: {}", issued.permissions);
            println!("  token:       {}", issued.token);
        }
        None => println!("  tokens already exist, no admin token created"),
    }

    println!();
    println!("global config key (not stored on the server):");
    println!("  {}", ConfigKey::generate().to_base64().as_str());
    Ok(())
}

async fn cmd_serve(
    config_path: Option<&PathBuf>,
    bind: Option<String>,
    port: Option<u16>,
) -> Result<(), RootError> {
    let mut config = load_config(config_path)?;
    if let Some(b) = bind {
        config.server.bind = b;
    }
    if let Some(p) = port {
        config.server.port = p;
    }

    let state = initialize_root(config)?;
    serve(state).await
}

fn cmd_token(config_path: Option<&PathBuf>, cmd: TokenCommand) -> Result<(), RootError> {
    let config = load_config(config_path)?;
    let state = initialize_root(config)?;
    let auth = state.authorizer();

    match cmd {
        TokenCommand::List { name } => {
            for token in auth.list(name.as_deref())? {
                println!("{:<24} {}", token.name, token.permissions);
            }
        }
        TokenCommand::Create { name, permissions } => {
            let issued = auth.create(&name, &permissions)?;
            println!("{}", serde_json::to_string_pretty(&issued)?);
        }
        TokenCommand::Update {
            name,
            permissions,
            regenerate,
        } => {
            let issued = auth.rotate_or_update(&name, permissions.as_deref(), regenerate)?;
            println!("{}", serde_json::to_string_pretty(&issued)?);
        }
        TokenCommand::Delete { name } => {
            auth.delete(&name)?;
            println!("deleted {}", name);
        }
    }
    Ok(())
}
