use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use partsbin::auth;
use partsbin::config::PartsbinToml;
use partsbin::db::InventoryDb;
use partsbin::server;

#[derive(Parser)]
#[command(
    name = "partsbin",
    version,
    about = "Inventory and project tracking server for maker workshops"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Path to the SQLite database
        #[arg(long)]
        db: Option<PathBuf>,
        /// Relax CORS for local frontend development
        #[arg(long)]
        dev: bool,
    },
    /// Create the database schema and exit
    Init {
        /// Path to the SQLite database
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Create a user account from the command line
    CreateUser {
        username: String,
        password: String,
        /// Grant super-admin rights
        #[arg(long)]
        super_admin: bool,
        /// Path to the SQLite database
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PartsbinToml::load_or_default(&std::env::current_dir()?)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.filter.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve { port, db, dev } => {
            let server_config = config.server_config(port, db, dev);
            server::start_server(server_config).await
        }
        Commands::Init { db } => {
            let path = db.unwrap_or_else(|| config.storage.db_path.clone());
            InventoryDb::new(&path)?;
            println!("Initialized database at {}", path.display());
            Ok(())
        }
        Commands::CreateUser {
            username,
            password,
            super_admin,
            db,
        } => {
            if password.len() < 6 {
                anyhow::bail!("password must be at least 6 characters");
            }
            let path = db.unwrap_or_else(|| config.storage.db_path.clone());
            let db = InventoryDb::new(&path)?;
            let salt = auth::new_salt();
            let hash = auth::hash_password(&password, &salt);
            let user = db.create_user(username.trim(), &hash, &salt, super_admin)?;
            println!(
                "Created user '{}' (id {}){}",
                user.username,
                user.id,
                if super_admin { " [super admin]" } else { "" }
            );
            Ok(())
        }
    }
}
