use clap::{Args, Parser, Subcommand, ValueEnum};
use idbridge_core::models::ban::BanType;

/// Default control-plane database.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://idbridge.db?mode=rwc";

#[derive(Parser, Debug)]
#[command(name = "idbridge", version, about = "idbridge operator CLI")]
pub struct Cli {
    /// Control-plane connection URL (PostgreSQL or SQLite).
    #[arg(long, global = true, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,

    /// Passphrase used to encrypt tenant credentials at rest.
    #[arg(long, global = true, env = "CREDENTIAL_ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print version information
    Version,
    /// Apply control-plane migrations
    Migrate,
    /// Manage connected tenant databases
    Connect(ConnectArgs),
    /// Inspect a tenant database schema
    Schema(SchemaArgs),
    /// Ban an external user of a tenant
    Ban(BanArgs),
    /// Lift a user's active ban
    Unban(UserRef),
    /// Show whether a user is currently banned
    CheckBan(UserRef),
    /// Token housekeeping
    Tokens(TokensArgs),
    /// Show recent audit events, newest first
    Audit {
        /// Only events for this tenant
        #[arg(long)]
        database_id: Option<String>,

        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    #[command(subcommand)]
    pub command: ConnectCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConnectCommands {
    /// Register a tenant database and print its bearer key
    Add(AddArgs),
    /// List registered tenant databases
    List,
    /// Deactivate a tenant; its bearer key stops working
    Deactivate { database_id: String },
    /// Issue a new bearer key, revoking the old one
    RotateKey { database_id: String },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Operator-facing tenant name
    #[arg(long)]
    pub name: String,

    /// Application name used in notifications
    #[arg(long)]
    pub app_name: String,

    /// Tenant database URL (postgres:// or sqlite:)
    #[arg(long)]
    pub endpoint: String,

    /// Users table
    #[arg(long, default_value = "users")]
    pub table: String,

    /// Database password, stored encrypted
    #[arg(long)]
    pub credential: Option<String>,
}

#[derive(Args, Debug)]
pub struct SchemaArgs {
    #[command(subcommand)]
    pub command: SchemaCommands,
}

#[derive(Subcommand, Debug)]
pub enum SchemaCommands {
    /// Detect the users table mapping and store it
    Detect { database_id: String },
    /// Tables with row counts and sizes
    Overview { database_id: String },
}

#[derive(Args, Debug)]
pub struct UserRef {
    pub database_id: String,
    pub user_id: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum BanKind {
    Permanent,
    Temporary,
}

impl From<BanKind> for BanType {
    fn from(kind: BanKind) -> Self {
        match kind {
            BanKind::Permanent => BanType::Permanent,
            BanKind::Temporary => BanType::Temporary,
        }
    }
}

#[derive(Args, Debug)]
pub struct BanArgs {
    #[command(flatten)]
    pub user: UserRef,

    #[arg(long)]
    pub reason: String,

    #[arg(long = "type", value_enum, default_value = "permanent")]
    pub kind: BanKind,

    /// Duration of a temporary ban
    #[arg(long)]
    pub hours: Option<f64>,
}

#[derive(Args, Debug)]
pub struct TokensArgs {
    #[command(subcommand)]
    pub command: TokensCommands,
}

#[derive(Subcommand, Debug)]
pub enum TokensCommands {
    /// Delete tokens that expired more than the given age ago
    Purge {
        #[arg(long, default_value_t = 24)]
        older_than_hours: i64,
    },
}
