mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::args::{Cli, Commands};
use lingua_recall::services::TutorRequest;
use lingua_recall::{AppConfig, AppContext};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::init(AppConfig::from_env()?)?;

    match &cli.command {
        Commands::Session { action } => {
            cli::commands::handle_session(&ctx, &cli.user, action).await
        }
        Commands::Send(args) => cli::commands::handle_send(&ctx, &cli.user, args).await,
        Commands::Context {
            limit,
            summary,
            query,
        } => cli::commands::handle_context(&ctx, &cli.user, query, *limit, *summary).await,
        Commands::Prompt {
            language,
            user_language,
            topic,
            level,
            message,
        } => {
            let request = TutorRequest {
                message: message.join(" "),
                language: language.clone(),
                user_language: user_language.clone(),
                topic: topic.clone(),
                level: level.clone(),
            };
            cli::commands::handle_prompt(&ctx, &cli.user, request).await
        }
    }
}
