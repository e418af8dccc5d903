use clap::{Args, Parser, Subcommand, ValueEnum};

use lingua_recall::models::Role;

#[derive(Parser, Debug)]
#[command(
    name = "lingua-recall",
    version,
    about = "Chat history and context retrieval for the language tutor",
    propagate_version = true
)]
pub struct Cli {
    /// Identifier of the signed-in user
    #[arg(short = 'u', long = "user", global = true, default_value = "")]
    pub user: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Session management
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Append a message to a session
    Send(SendArgs),

    /// Show the prior messages selected as context for a query
    Context {
        /// Maximum number of messages to select
        #[arg(long)]
        limit: Option<usize>,
        /// Print the prompt-ready transcript instead of JSON
        #[arg(long)]
        summary: bool,
        query: Vec<String>,
    },

    /// Render the tutor prompt for a new message, including retrieved context
    Prompt {
        #[arg(long, default_value = "spanish")]
        language: String,
        #[arg(long = "native")]
        user_language: Option<String>,
        #[arg(long, default_value = "introductions")]
        topic: String,
        #[arg(long, default_value = "beginner")]
        level: String,
        message: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    New {
        #[arg(long)]
        title: Option<String>,
    },
    List,
    Show {
        id: String,
        /// Export as Markdown
        #[arg(long)]
        markdown: bool,
    },
    Delete {
        id: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum RoleArg {
    User,
    Assistant,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::User => Role::User,
            RoleArg::Assistant => Role::Assistant,
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[arg(short = 's', long = "session")]
    pub session: String,

    #[arg(long, value_enum, default_value_t = RoleArg::User)]
    pub role: RoleArg,

    #[arg(long)]
    pub language: Option<String>,
    #[arg(long)]
    pub topic: Option<String>,
    #[arg(long)]
    pub level: Option<String>,
    #[arg(long)]
    pub translation: Option<String>,

    pub text: Vec<String>,
}
