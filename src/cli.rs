use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "slack-cli", version)]
#[command(about = "Command-line client for the Slack Web API", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, env = "SLACK_CLI_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "Slack token, overrides config and SLACK_TOKEN"
    )]
    pub token: Option<String>,

    #[arg(short, long, global = true, action = ArgAction::Count, help = "Increase log verbosity")]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(subcommand)]
    #[command(about = "Send and schedule messages")]
    Messages(MessagesCommand),

    #[command(subcommand)]
    #[command(about = "Browse channels, DMs and unread state")]
    Conversations(ConversationsCommand),

    #[command(subcommand)]
    #[command(about = "List and download files")]
    Files(FilesCommand),

    #[command(subcommand)]
    #[command(about = "Manage composer drafts")]
    Drafts(DraftsCommand),
}

#[derive(Subcommand, Debug)]
pub enum MessagesCommand {
    #[command(about = "Post a message to a channel, DM or user")]
    Send {
        target: String,
        text: String,

        #[arg(long, value_name = "TS", help = "Reply in the thread rooted at this timestamp")]
        thread: Option<String>,
    },

    #[command(about = "Schedule a message for later delivery")]
    Schedule {
        target: String,
        text: String,

        #[arg(
            long,
            value_name = "TIME",
            help = "Unix seconds, RFC 3339, \"YYYY-MM-DD HH:MM\" or \"+30m\""
        )]
        at: String,

        #[arg(long, value_name = "TS")]
        thread: Option<String>,
    },

    #[command(about = "List pending scheduled messages")]
    Scheduled {
        #[arg(long)]
        channel: Option<String>,

        #[arg(short, long, default_value = "100")]
        limit: u32,

        #[arg(long)]
        json: bool,
    },

    #[command(about = "Cancel a scheduled message")]
    Unschedule {
        channel: String,
        scheduled_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConversationsCommand {
    #[command(about = "List conversations")]
    List {
        #[arg(
            long,
            value_delimiter = ',',
            help = "public_channel, private_channel, mpim, im"
        )]
        types: Vec<String>,

        #[arg(short, long, default_value = "1000")]
        limit: usize,

        #[arg(long)]
        include_archived: bool,

        #[arg(long)]
        json: bool,
    },

    #[command(about = "Read conversation history or a single thread")]
    Read(ReadArgs),

    #[command(about = "Show unread conversations and messages")]
    Unread(UnreadArgs),

    #[command(about = "Mark a conversation read")]
    MarkRead {
        channel: String,

        #[arg(long, value_name = "TS", help = "Defaults to the newest message")]
        ts: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    pub channel: String,

    #[arg(short, long)]
    pub limit: Option<u32>,

    #[arg(long, value_name = "TS")]
    pub oldest: Option<String>,

    #[arg(long, value_name = "TS")]
    pub latest: Option<String>,

    #[arg(long, value_name = "TS", help = "Read only the thread rooted at this timestamp")]
    pub thread: Option<String>,

    #[arg(long, help = "Expand thread replies inline")]
    pub with_replies: bool,

    #[arg(long, help = "Attach video transcripts")]
    pub transcripts: bool,

    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct UnreadArgs {
    pub channel: Option<String>,

    #[arg(long, help = "Show the unread messages, not just counts")]
    pub messages: bool,

    #[arg(short, long, help = "Messages per conversation")]
    pub limit: Option<u32>,

    #[arg(long)]
    pub include_muted: bool,

    #[arg(long, requires = "messages", help = "Mark shown conversations read")]
    pub mark_read: bool,

    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum FilesCommand {
    #[command(about = "List files")]
    List {
        #[arg(long)]
        channel: Option<String>,

        #[arg(long)]
        user: Option<String>,

        #[arg(long, help = "Comma separated file types, e.g. images,pdfs")]
        types: Option<String>,

        #[arg(long)]
        count: Option<u32>,

        #[arg(long)]
        page: Option<u32>,

        #[arg(long)]
        json: bool,
    },

    #[command(about = "Download one file")]
    Download {
        file_id: String,

        #[arg(short, long, help = "Target file or directory")]
        output: Option<PathBuf>,
    },

    #[command(about = "Download every file shared in a conversation")]
    DownloadAll {
        #[arg(long)]
        channel: String,

        #[arg(long)]
        types: Option<String>,

        #[arg(long)]
        count: Option<u32>,

        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        #[arg(long, help = "Parallel transfers, default from config")]
        concurrency: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DraftsCommand {
    #[command(about = "List drafts")]
    List {
        #[arg(long)]
        json: bool,
    },

    #[command(about = "Save a draft")]
    Create {
        channel: String,
        text: String,

        #[arg(long, value_name = "TS")]
        thread: Option<String>,
    },

    #[command(about = "Delete a draft")]
    Delete { draft_id: String },
}
