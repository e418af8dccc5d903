use anyhow::{bail, Context, Result};
use serde::Serialize;

use lingua_recall::models::{MessageMetadata, NewMessage};
use lingua_recall::services::export::export_to_markdown;
use lingua_recall::services::{build_tutor_prompt, format_context_summary, TutorRequest};
use lingua_recall::AppContext;

use super::args::{SendArgs, SessionAction};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn require_user(user: &str) -> Result<&str> {
    if user.trim().is_empty() {
        bail!("--user is required");
    }
    Ok(user)
}

fn join_words(words: &[String], what: &str) -> Result<String> {
    let text = words.join(" ");
    if text.trim().is_empty() {
        bail!("{} is required", what);
    }
    Ok(text)
}

pub async fn handle_session(ctx: &AppContext, user: &str, action: &SessionAction) -> Result<()> {
    let user = require_user(user)?;
    let history = &ctx.history;
    match action {
        SessionAction::New { title } => {
            let session = history.create_session(user, title.as_deref()).await?;
            print_json(&session)
        }
        SessionAction::List => print_json(&history.list_sessions(user).await?),
        SessionAction::Show { id, markdown } => {
            let session = history
                .get_session(id, user)
                .await?
                .context("Session not found")?;
            let messages = history.session_messages(id, user).await?;
            if *markdown {
                print!("{}", export_to_markdown(&session, &messages));
                Ok(())
            } else {
                print_json(&serde_json::json!({ "session": session, "messages": messages }))
            }
        }
        SessionAction::Delete { id } => {
            history.delete_session(id, user).await?;
            print_json(&serde_json::json!({ "success": true }))
        }
    }
}

pub async fn handle_send(ctx: &AppContext, user: &str, args: &SendArgs) -> Result<()> {
    let user = require_user(user)?;
    let text = join_words(&args.text, "Message text")?;
    let metadata = MessageMetadata {
        language: args.language.clone(),
        topic: args.topic.clone(),
        level: args.level.clone(),
        translation: args.translation.clone(),
    };
    let message = ctx
        .history
        .store_message(
            NewMessage::new(user, &args.session, args.role.into(), text).with_metadata(metadata),
        )
        .await?;
    print_json(&message)
}

pub async fn handle_context(
    ctx: &AppContext,
    user: &str,
    query: &[String],
    limit: Option<usize>,
    summary: bool,
) -> Result<()> {
    let user = require_user(user)?;
    let selection = ctx
        .history
        .relevant_context(user, &query.join(" "), limit)
        .await;
    if summary {
        print!("{}", format_context_summary(&selection.into_messages()));
        Ok(())
    } else {
        print_json(&selection)
    }
}

pub async fn handle_prompt(ctx: &AppContext, user: &str, request: TutorRequest) -> Result<()> {
    let user = require_user(user)?;
    let history = ctx
        .history
        .relevant_context(user, &request.message, None)
        .await
        .into_messages();
    println!("{}", build_tutor_prompt(&request, &history)?);
    Ok(())
}
