use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use profileforge::{
    config::Config,
    database::{PgStore, init_postgres},
    models::Role,
    store::Store,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending migrations
    Migrate,

    /// Grant the admin role to the profile with this email
    Promote { email: String },

    /// Revoke the admin role from the profile with this email
    Demote { email: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config = Config::load();

    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is not configured")?;
    let pool = init_postgres(database_url, 1).await?;
    let store = PgStore::new(pool);

    store.migrate().await?;
    info!("Migrations applied");

    let (email, role) = match args.command {
        Command::Migrate => return Ok(()),
        Command::Promote { email } => (email, Role::Admin),
        Command::Demote { email } => (email, Role::Client),
    };

    let Some(account) = store.set_role(&email, role).await? else {
        bail!("No profile with email {email}");
    };

    println!("{} is now {:?}", account.email, account.role);

    Ok(())
}
