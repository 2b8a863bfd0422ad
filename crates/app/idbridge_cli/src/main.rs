// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use chrono::{Duration, Utc};
use clap::Parser;
use cli::{Cli, Commands, ConnectCommands, SchemaCommands, TokensCommands};
use idbridge_core::audit::{self, AuditSink, DbAuditSink};
use idbridge_core::bans::{self, BanRequest};
use idbridge_core::models::audit::AuditEvent;
use idbridge_core::models::tenant::NewConnection;
use idbridge_core::registry::PoolRegistry;
use idbridge_core::secrets::CredentialCipher;
use idbridge_core::{introspect, tenants, tokens};
use serde_json::json;
use sqlx::AnyPool;

mod cli;
mod logging;

/// Recorded as the actor on bans issued from the command line.
const CLI_ACTOR: &str = "cli";

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    logging::init()?;

    let args = Cli::parse();

    if let Commands::Version = args.command {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let cipher = args
        .encryption_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .map(CredentialCipher::new)
        .transpose()?;
    let pool = open(&args.database_url).await?;
    let audit_sink = DbAuditSink::new(pool.clone());
    let now = Utc::now();

    match args.command {
        Commands::Version => {}
        Commands::Migrate => {
            log::info!("control-plane schema is up to date");
        }
        Commands::Connect(connect) => match connect.command {
            ConnectCommands::Add(add) => {
                let input = NewConnection {
                    name: add.name,
                    app_name: add.app_name,
                    endpoint: add.endpoint,
                    credential: add.credential,
                    table_name: add.table,
                };
                let (tenant, api_key) =
                    tenants::register(&pool, cipher.as_ref(), &input, now).await?;
                log::info!("registered tenant {}", tenant.name);
                audit_sink
                    .record(
                        AuditEvent::new("tenant.register", CLI_ACTOR, Some(&tenant.id))
                            .with_details(json!({ "name": tenant.name })),
                    )
                    .await;
                print_json(&json!({ "id": tenant.id, "apiKey": api_key }))?;
            }
            ConnectCommands::List => {
                print_json(&tenants::list(&pool).await?)?;
            }
            ConnectCommands::Deactivate { database_id } => {
                if !tenants::deactivate(&pool, &database_id).await? {
                    return Err(Error::Custom(format!(
                        "no active tenant with id {database_id}"
                    )));
                }
                log::info!("deactivated tenant {database_id}");
                audit_sink
                    .record(AuditEvent::new("tenant.deactivate", CLI_ACTOR, Some(&database_id)))
                    .await;
            }
            ConnectCommands::RotateKey { database_id } => {
                let api_key = tenants::rotate_api_key(&pool, &database_id).await?;
                audit_sink
                    .record(AuditEvent::new("tenant.rotate_key", CLI_ACTOR, Some(&database_id)))
                    .await;
                print_json(&json!({ "id": database_id, "apiKey": api_key }))?;
            }
        },
        Commands::Schema(schema) => {
            let registry = PoolRegistry::new();
            let result = match schema.command {
                SchemaCommands::Detect { database_id } => {
                    let tenant = tenants::require_active(&pool, &database_id).await?;
                    let handle = tenants::connect(&registry, &tenant, cipher.as_ref()).await?;
                    tenants::redetect_mapping(&pool, &handle, &tenant, now)
                        .await
                        .map_err(Error::from)
                        .and_then(|mapping| print_json(&mapping))
                }
                SchemaCommands::Overview { database_id } => {
                    let tenant = tenants::require_active(&pool, &database_id).await?;
                    let handle = tenants::connect(&registry, &tenant, cipher.as_ref()).await?;
                    introspect::get_database_overview(&handle)
                        .await
                        .map_err(Error::from)
                        .and_then(|overview| print_json(&overview))
                }
            };
            registry.close_all().await;
            result?;
        }
        Commands::Ban(ban) => {
            let request = BanRequest {
                user_id: ban.user.user_id,
                reason: ban.reason,
                ban_type: ban.kind.into(),
                duration_hours: ban.hours,
                banned_by: Some(CLI_ACTOR.to_string()),
            };
            let created = bans::ban(&pool, &ban.user.database_id, &request, now).await?;
            audit_sink
                .record(
                    AuditEvent::new("ban.create", CLI_ACTOR, Some(&ban.user.database_id))
                        .with_details(json!({
                            "userId": created.external_user_id,
                            "type": created.ban_type,
                            "reason": created.reason,
                        })),
                )
                .await;
            print_json(&created)?;
        }
        Commands::Unban(user) => {
            let lifted =
                bans::unban(&pool, &user.database_id, &user.user_id, Some(CLI_ACTOR), now).await?;
            if lifted {
                audit_sink
                    .record(
                        AuditEvent::new("ban.lift", CLI_ACTOR, Some(&user.database_id))
                            .with_details(json!({ "userId": user.user_id })),
                    )
                    .await;
            }
            print_json(&json!({ "lifted": lifted }))?;
        }
        Commands::CheckBan(user) => {
            let status = bans::check_ban(&pool, &user.database_id, &user.user_id, now).await?;
            print_json(&status)?;
        }
        Commands::Tokens(tokens_args) => match tokens_args.command {
            TokensCommands::Purge { older_than_hours } => {
                let cutoff = Duration::try_hours(older_than_hours.max(0))
                    .and_then(|age| now.checked_sub_signed(age))
                    .ok_or_else(|| Error::Custom("--older-than-hours is out of range".into()))?;
                let purged = tokens::purge_expired(&pool, cutoff).await?;
                log::info!("purged {purged} expired tokens");
                print_json(&json!({ "purged": purged }))?;
            }
        },
        Commands::Audit { database_id, limit } => {
            let events = audit::recent_events(&pool, database_id.as_deref(), limit.max(1)).await?;
            print_json(&events)?;
        }
    }

    pool.close().await;
    Ok(())
}

/// Connect to the control plane and bring its schema up to date.
async fn open(database_url: &str) -> Result<AnyPool> {
    let pool = idbridge_core::db::connect(database_url, 2).await?;
    idbridge_core::migrate::migrate(&pool).await?;
    Ok(pool)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
