//! socialcast-queue - Create, approve and inspect posts
//!
//! The trigger surface for Socialcast: everything the daemon later acts on
//! is put in place from here.

use clap::{Args, Parser, Subcommand};
use libsocialcast::platforms::{supported_platforms, PlatformKind};
use libsocialcast::scheduling::{format_timestamp, parse_schedule_from_now};
use libsocialcast::service::SocialcastService;
use libsocialcast::{
    Account, ApprovalOutcome, NewPost, Post, PostStatus, PublicationOutcome, Result,
    SocialcastError,
};
use secrecy::SecretString;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "socialcast-queue")]
#[command(version)]
#[command(about = "Create, approve and inspect scheduled posts")]
#[command(long_about = "\
socialcast-queue - Create, approve and inspect scheduled posts

DESCRIPTION:
    socialcast-queue creates posts, approves them for publication, and
    manages the platform connections and API keys of an account. Approved
    posts that are due are published immediately; later ones are picked up
    by socialcast-send.

USAGE EXAMPLES:
    # Create an account
    socialcast-queue account create brand

    # Connect a Facebook page (token read from SOCIALCAST_ACCESS_TOKEN)
    socialcast-queue --account brand connect facebook --target 1234567890

    # Create a post for tomorrow and approve it
    socialcast-queue --account brand create \"Launch day\" -p facebook -p instagram \\
        --media-url https://cdn.example/launch.jpg --schedule tomorrow
    socialcast-queue --account brand approve <POST_ID>

    # Create and publish a video right away
    socialcast-queue --account brand create \"New clip\" -p tiktok -p youtube \\
        --video-url https://cdn.example/clip.mp4 --tag rust --approve

    # Inspect
    socialcast-queue --account brand list --status approved
    socialcast-queue --format json show <POST_ID>

CONFIGURATION:
    Configuration file: ~/.config/socialcast/config.toml
    Database location: ~/.local/share/socialcast/socialcast.db

    Override with environment variables:
        SOCIALCAST_CONFIG    - Path to config file
        SOCIALCAST_DB_PATH   - Path to database file
        SOCIALCAST_ACCOUNT   - Default account name

EXIT CODES:
    0 - Success
    1 - Publication failed on every platform, or a platform error
    2 - Database or configuration error
    3 - Invalid input (unknown post, bad state, bad time format, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Account the command acts for
    #[arg(short, long, global = true, env = "SOCIALCAST_ACCOUNT")]
    account: Option<String>,

    /// Output format: text or json
    #[arg(short, long, global = true, default_value = "text")]
    format: String,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage accounts
    #[command(subcommand)]
    Account(AccountCommand),

    /// Create a post awaiting approval
    Create(CreateArgs),

    /// Approve a pending post
    Approve {
        /// Post ID to approve
        post_id: String,
    },

    /// List posts
    List {
        /// Only posts with this status
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of posts to show
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Show a post with its per-platform results
    Show {
        post_id: String,
    },

    /// Store credentials for a platform
    Connect {
        /// facebook, instagram, tiktok or youtube
        platform: String,

        /// OAuth access token
        #[arg(long, env = "SOCIALCAST_ACCESS_TOKEN", hide_env_values = true)]
        token: String,

        /// Page id (Facebook), business account id (Instagram) or channel id
        #[arg(long)]
        target: Option<String>,
    },

    /// Remove credentials for a platform
    Disconnect {
        platform: String,
    },

    /// List supported platforms and their connection status
    Platforms,

    /// Manage the account's API key
    #[command(subcommand)]
    Key(KeyCommand),

    /// Inspect scratch media storage
    #[command(subcommand)]
    Files(FilesCommand),
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// Create a new account
    Create { name: String },
}

#[derive(Args, Debug)]
struct CreateArgs {
    /// Post text
    content: String,

    /// Target platform (repeatable)
    #[arg(short, long = "platform", required = true)]
    platforms: Vec<String>,

    /// Image or link URL (repeatable)
    #[arg(long = "media-url")]
    media_urls: Vec<String>,

    /// Video source URL
    #[arg(long, conflicts_with = "media_urls")]
    video_url: Option<String>,

    #[arg(long, requires = "video_url")]
    video_title: Option<String>,

    #[arg(long, requires = "video_url")]
    video_description: Option<String>,

    /// Video tag (repeatable)
    #[arg(long = "tag", requires = "video_url")]
    tags: Vec<String>,

    /// When to publish (e.g. "2h", "tomorrow 9am", "2025-11-20T15:00:00Z")
    #[arg(short, long)]
    schedule: Option<String>,

    /// Approve right after creation
    #[arg(long)]
    approve: bool,
}

#[derive(Subcommand, Debug)]
enum KeyCommand {
    /// Issue a new key, replacing any existing one
    Generate {
        #[arg(long, default_value = "default")]
        name: String,
    },
    /// Revoke the current key
    Revoke,
    /// Show key usage statistics
    Stats,
}

#[derive(Subcommand, Debug)]
enum FilesCommand {
    /// Show scratch storage usage
    Stats,
    /// Remove media older than the retention window
    Sweep,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libsocialcast::logging::LoggingConfig::new(
        libsocialcast::logging::LogFormat::Text,
        "error".to_string(),
        cli.verbose,
    )
    .init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_format(format: &str) -> Result<OutputFormat> {
    match format {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        other => Err(SocialcastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            other
        ))),
    }
}

fn parse_platform(name: &str) -> Result<PlatformKind> {
    name.parse().map_err(|_| {
        SocialcastError::InvalidInput(format!(
            "Unsupported platform '{}'. Use facebook, instagram, tiktok or youtube",
            name
        ))
    })
}

/// Execute the command; the returned value is the process exit code
async fn run(cli: Cli) -> Result<i32> {
    let format = parse_format(&cli.format)?;
    let service = SocialcastService::new().await?;
    let ctx = Context {
        service,
        format,
        account: cli.account,
    };

    match cli.command {
        Commands::Account(AccountCommand::Create { name }) => ctx.cmd_account_create(&name).await,
        Commands::Create(args) => ctx.cmd_create(args).await,
        Commands::Approve { post_id } => ctx.cmd_approve(&post_id).await,
        Commands::List { status, limit } => ctx.cmd_list(status.as_deref(), limit).await,
        Commands::Show { post_id } => ctx.cmd_show(&post_id).await,
        Commands::Connect {
            platform,
            token,
            target,
        } => ctx.cmd_connect(&platform, token, target).await,
        Commands::Disconnect { platform } => ctx.cmd_disconnect(&platform).await,
        Commands::Platforms => ctx.cmd_platforms().await,
        Commands::Key(command) => ctx.cmd_key(command).await,
        Commands::Files(command) => ctx.cmd_files(command).await,
    }
}

struct Context {
    service: SocialcastService,
    format: OutputFormat,
    account: Option<String>,
}

impl Context {
    async fn account(&self) -> Result<Account> {
        let name = self.account.as_deref().ok_or_else(|| {
            SocialcastError::InvalidInput(
                "This command needs an account (--account or SOCIALCAST_ACCOUNT)".to_string(),
            )
        })?;

        self.service
            .database()
            .get_account_by_name(name)
            .await?
            .ok_or_else(|| SocialcastError::NotFound(format!("Account '{}'", name)))
    }

    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(value).map_err(|e| {
                    SocialcastError::InvalidInput(format!("Could not encode output: {}", e))
                })?;
                println!("{}", json);
            }
            OutputFormat::Text => {
                let text = text();
                if !text.is_empty() {
                    println!("{}", text);
                }
            }
        }
        Ok(())
    }

    async fn cmd_account_create(&self, name: &str) -> Result<i32> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SocialcastError::InvalidInput(
                "Account name cannot be empty".to_string(),
            ));
        }
        if self.service.database().get_account_by_name(name).await?.is_some() {
            return Err(SocialcastError::InvalidInput(format!(
                "Account '{}' already exists",
                name
            )));
        }

        let account = self.service.database().create_account(name).await?;
        self.emit(&account, || format!("{} | {}", account.id, account.name))?;
        Ok(0)
    }

    async fn cmd_create(&self, args: CreateArgs) -> Result<i32> {
        let account = self.account().await?;
        let scheduled_at = args
            .schedule
            .as_deref()
            .map(parse_schedule_from_now)
            .transpose()?;

        let request = NewPost {
            content: args.content,
            platforms: args.platforms,
            media_urls: (!args.media_urls.is_empty()).then_some(args.media_urls),
            video_url: args.video_url,
            video_title: args.video_title,
            video_description: args.video_description,
            video_tags: (!args.tags.is_empty()).then_some(args.tags),
            scheduled_at,
            auto_approve: args.approve,
        };

        let created = self.service.lifecycle().create(account.id, request).await?;

        #[derive(Serialize)]
        struct Created<'a> {
            post: &'a Post,
            #[serde(skip_serializing_if = "Option::is_none")]
            approval: Option<&'a ApprovalOutcome>,
        }

        let report = Created {
            post: &created.post,
            approval: created.approval.as_ref(),
        };
        self.emit(&report, || {
            let mut lines = vec![created.post.id.clone()];
            if let Some(approval) = &created.approval {
                lines.push(approval_text(approval));
            }
            lines.join("\n")
        })?;

        Ok(created.approval.as_ref().map_or(0, approval_exit_code))
    }

    async fn cmd_approve(&self, post_id: &str) -> Result<i32> {
        let account = self.account().await?;
        let approval = self.service.lifecycle().approve(account.id, post_id).await?;

        self.emit(&approval, || approval_text(&approval))?;
        Ok(approval_exit_code(&approval))
    }

    async fn cmd_list(&self, status: Option<&str>, limit: usize) -> Result<i32> {
        let account = match &self.account {
            Some(_) => Some(self.account().await?.id),
            None => None,
        };
        let status = status.map(str::parse::<PostStatus>).transpose()?;

        let posts = self.service.lifecycle().list(account, status, limit).await?;
        self.emit(&posts, || {
            let now = chrono::Utc::now().timestamp();
            posts
                .iter()
                .map(|post| {
                    format!(
                        "{} | {} | {} | {} | {}",
                        post.id,
                        post.status,
                        post.platforms.join(","),
                        truncate_content(&post.content, 50),
                        post.scheduled_at
                            .map(|at| format_time_until(now, at))
                            .unwrap_or_else(|| "unscheduled".to_string())
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        })?;
        Ok(0)
    }

    async fn cmd_show(&self, post_id: &str) -> Result<i32> {
        let found = self.service.lifecycle().get(post_id).await?;

        #[derive(Serialize)]
        struct Shown<'a> {
            post: &'a Post,
            results: &'a [libsocialcast::PostResult],
        }

        let report = Shown {
            post: &found.post,
            results: &found.results,
        };
        self.emit(&report, || {
            let post = &found.post;
            let mut lines = vec![
                format!("id:        {}", post.id),
                format!("status:    {}", post.status),
                format!("platforms: {}", post.platforms.join(", ")),
                format!("content:   {}", post.content),
                format!("created:   {}", format_timestamp(post.created_at)),
            ];
            if let Some(at) = post.scheduled_at {
                lines.push(format!("scheduled: {}", format_timestamp(at)));
            }
            if let Some(at) = post.published_at {
                lines.push(format!("finished:  {}", format_timestamp(at)));
            }
            for result in &found.results {
                lines.push(match (&result.platform_post_id, &result.error_message) {
                    (Some(id), _) if result.success => format!("  {}: ok ({})", result.platform, id),
                    (_, Some(error)) => format!("  {}: failed: {}", result.platform, error),
                    _ => format!("  {}: {}", result.platform, if result.success { "ok" } else { "failed" }),
                });
            }
            lines.join("\n")
        })?;
        Ok(0)
    }

    async fn cmd_connect(&self, platform: &str, token: String, target: Option<String>) -> Result<i32> {
        let account = self.account().await?;
        let kind = parse_platform(platform)?;

        self.service
            .connections()
            .connect(account.id, kind, SecretString::new(token.into()), target)
            .await?;

        let status = serde_json::json!({"platform": kind.as_str(), "connected": true});
        self.emit(&status, || format!("Connected {}", kind.display_name()))?;
        Ok(0)
    }

    async fn cmd_disconnect(&self, platform: &str) -> Result<i32> {
        let account = self.account().await?;
        let kind = parse_platform(platform)?;

        let removed = self.service.connections().disconnect(account.id, kind).await?;
        let status = serde_json::json!({"platform": kind.as_str(), "disconnected": removed});
        self.emit(&status, || {
            if removed {
                format!("Disconnected {}", kind.display_name())
            } else {
                format!("{} was not connected", kind.display_name())
            }
        })?;
        Ok(0)
    }

    async fn cmd_platforms(&self) -> Result<i32> {
        let connected = match &self.account {
            Some(_) => {
                let account = self.account().await?;
                Some(self.service.connections().connected_platforms(account.id).await?)
            }
            None => None,
        };

        #[derive(Serialize)]
        struct PlatformInfo {
            name: &'static str,
            display_name: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            connected: Option<bool>,
        }

        let platforms: Vec<PlatformInfo> = supported_platforms()
            .into_iter()
            .map(|(name, display_name)| PlatformInfo {
                name,
                display_name,
                connected: match (&connected, name.parse::<PlatformKind>()) {
                    (Some(status), Ok(kind)) => Some(status.is_connected(kind)),
                    _ => None,
                },
            })
            .collect();

        self.emit(&platforms, || {
            platforms
                .iter()
                .map(|p| match p.connected {
                    Some(true) => format!("{} | {} | connected", p.name, p.display_name),
                    Some(false) => format!("{} | {} | not connected", p.name, p.display_name),
                    None => format!("{} | {}", p.name, p.display_name),
                })
                .collect::<Vec<_>>()
                .join("\n")
        })?;
        Ok(0)
    }

    async fn cmd_key(&self, command: KeyCommand) -> Result<i32> {
        let account = self.account().await?;
        let keys = self.service.api_keys();

        match command {
            KeyCommand::Generate { name } => {
                let key = keys.generate(account.id, &name).await?;
                let report = serde_json::json!({"name": name.trim(), "key": key});
                self.emit(&report, || key.clone())?;
                eprintln!("Store this key now; it cannot be shown again.");
            }
            KeyCommand::Revoke => {
                let revoked = keys.revoke(account.id).await?;
                if !revoked {
                    return Err(SocialcastError::NotFound(format!(
                        "Active API key for account '{}'",
                        account.name
                    )));
                }
                let report = serde_json::json!({"revoked": true});
                self.emit(&report, || "API key revoked".to_string())?;
            }
            KeyCommand::Stats => {
                let stats = keys.stats(account.id).await?;
                self.emit(&stats, || {
                    let mut lines = vec![
                        format!("name:          {}", stats.name),
                        format!("active:        {}", stats.active),
                        format!("created:       {}", format_timestamp(stats.created_at)),
                        format!("total usage:   {}", stats.total_usage),
                        format!("last 30 days:  {}", stats.recent_usage_30_days),
                        format!("success rate:  {:.1}%", stats.success_rate),
                    ];
                    if let Some(at) = stats.last_used_at {
                        lines.push(format!("last used:     {}", format_timestamp(at)));
                    }
                    for endpoint in &stats.popular_endpoints {
                        lines.push(format!("  {} ({})", endpoint.endpoint, endpoint.count));
                    }
                    lines.join("\n")
                })?;
            }
        }
        Ok(0)
    }

    async fn cmd_files(&self, command: FilesCommand) -> Result<i32> {
        match command {
            FilesCommand::Stats => {
                let stats = self.service.files().stats().await;
                self.emit(&stats, || {
                    format!(
                        "{} file(s), {:.2} MB in {} (retention {}h)",
                        stats.count,
                        stats.total_size_mb(),
                        stats.directory.display(),
                        stats.retention_hours
                    )
                })?;
            }
            FilesCommand::Sweep => {
                let removed = self.service.scheduler().run_artifact_sweep().await;
                let report = serde_json::json!({"removed": removed});
                self.emit(&report, || format!("Removed {} file(s)", removed))?;
            }
        }
        Ok(0)
    }
}

fn approval_text(approval: &ApprovalOutcome) -> String {
    match approval {
        ApprovalOutcome::Published(outcome) => outcome_text(outcome),
        ApprovalOutcome::Deferred { scheduled_at } => {
            format!("Approved; scheduled for {}", format_timestamp(*scheduled_at))
        }
        ApprovalOutcome::InProgress => "Approved; publication already in progress".to_string(),
    }
}

fn outcome_text(outcome: &PublicationOutcome) -> String {
    outcome
        .results
        .iter()
        .map(|(platform, attempt)| match (&attempt.post_id, &attempt.error) {
            (Some(id), _) => format!("{}: ok ({})", platform, id),
            (None, Some(error)) => format!("{}: failed: {}", platform, error),
            (None, None) => format!("{}: failed", platform),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 1 when a publication ran and no platform accepted the post
fn approval_exit_code(approval: &ApprovalOutcome) -> i32 {
    match approval {
        ApprovalOutcome::Published(outcome) if !outcome.success => 1,
        _ => 0,
    }
}

/// Truncate content to max characters with ellipsis
fn truncate_content(content: &str, max_chars: usize) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        single_line
    } else {
        let truncated: String = single_line.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// Format time until scheduled time in human-readable format
fn format_time_until(now: i64, scheduled_at: i64) -> String {
    let diff = scheduled_at - now;

    if diff < 0 {
        return "due".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}
