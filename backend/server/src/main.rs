use clap::Parser;
use profileforge::{ServerOptions, start_server};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Overrides RUST_PORT
    #[arg(long)]
    port: Option<u16>,

    /// Serve from an in-memory store with a seeded admin instead of Postgres and Supabase
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    start_server(ServerOptions {
        port: args.port,
        memory: args.memory,
    })
    .await
}
