use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Biometric attendance reconciliation CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Pull a date range from a device and reconcile it (shift-driven)
    Download {
        /// Device id, name or address
        #[arg(long)]
        device: String,

        /// Range start, RFC 3339
        #[arg(long)]
        from: DateTime<Utc>,

        /// Range end, RFC 3339
        #[arg(long)]
        to: DateTime<Utc>,

        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Feed a saved webhook payload through the webhook path (label-driven)
    Replay {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// File holding the event JSON
        payload_file: String,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply embedded SQL migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = tally_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = tally_db::status(&pool).await?;
                    println!("db_ok={} has_sessions_table={}", s.ok, s.has_sessions_table);
                }
                DbCmd::Migrate => {
                    tally_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = tally_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Download {
            device,
            from,
            to,
            config_paths,
        } => {
            commands::download::run(&config_paths, &device, from, to).await?;
        }

        Commands::Replay {
            config_paths,
            payload_file,
        } => {
            commands::replay::run(&config_paths, &payload_file).await?;
        }
    }

    Ok(())
}
