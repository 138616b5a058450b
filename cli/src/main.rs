mod chat;
mod cli;
mod output;
mod review;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Args, Command};
use doc_session::Config;
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize environment variables and logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,doc_session=info,docchat=info"),
    )
    .init();

    let args = Args::parse();
    let interrupt = interrupt_on_ctrl_c().await;
    if let Err(err) = run(args, interrupt).await {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run(args: Args, interrupt: CancellationToken) -> Result<()> {
    let config = Config::from_env().context("loading configuration")?;

    match args.command {
        Command::Review(opts) => review::run(config, opts, interrupt).await,
        Command::Chat(opts) => chat::run(config, opts, interrupt).await,
    }
}

/// Turns Ctrl-C into a cancelled token so pending remote calls return an
/// error and the session still gets closed.
async fn interrupt_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cleaning up");
            trigger.cancel();
        }
    });
    // Let the listener register its handler before any remote work starts.
    tokio::task::yield_now().await;
    token
}
