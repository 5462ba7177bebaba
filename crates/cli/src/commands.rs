//! CLI commands

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use portal_core::{FileStore, LoggingNavigator, PortalConfig, Role, StateDir};
use portal_http::{ApiRequest, LoginRequest, PortalSession, RegisterRequest};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config;

/// Everything a command needs: where state lives, the loaded config and the
/// session backed by the on-disk store
pub struct Context {
    state_dir: StateDir,
    config: PortalConfig,
    session: PortalSession,
}

impl Context {
    pub fn new(state_dir: StateDir, config_path: Option<PathBuf>) -> Result<Self> {
        let config = config::load_config(&state_dir, config_path.as_deref())?;
        let session_path = state_dir.session_path();
        debug!(path = %session_path.display(), "Using session store");

        let session = PortalSession::new(
            &config,
            Arc::new(FileStore::new(session_path)),
            Arc::new(LoggingNavigator),
        )?;

        Ok(Self {
            state_dir,
            config,
            session,
        })
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and store the session
    Login {
        /// Account email
        #[arg(long)]
        email: String,

        /// Account password
        #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account
    Register {
        #[arg(long)]
        full_name: String,

        #[arg(long)]
        email: String,

        #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        phone: Option<String>,

        /// Referral code of the user who invited you
        #[arg(long)]
        referral_code: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show whether a usable session is stored
    Status,

    /// Exchange the refresh token for a new access token now
    Refresh,

    /// Show your profile
    Profile,

    /// Show referred users, points and earnings
    Referrals,

    /// Show current subscription and history
    Subscriptions,

    /// GET an arbitrary API path with the stored session
    Get {
        /// Path relative to the API base URL, e.g. /posts
        path: String,
    },

    /// Admin back office
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Configuration file management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum AdminCommands {
    /// List all users
    Users,

    /// List users with an active subscription
    SubscriptionUsers,

    /// List uploaded PDFs
    Pdfs,

    /// Show dashboard counts
    Stats,

    /// Change a user's role
    SetRole {
        user_id: String,

        /// USER, ADMIN or SUPER_ADMIN
        role: Role,
    },

    /// Delete a user account
    DeleteUser { user_id: String },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Output file path (defaults to <state dir>/config/portal.json)
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

impl Commands {
    pub async fn execute(self, context: &Context) -> Result<()> {
        let session = &context.session;

        match self {
            Self::Login { email, password } => {
                session
                    .auth()
                    .login(&LoginRequest { email, password })
                    .await?;
                if session.tokens().access_token().is_none() {
                    bail!("Login succeeded but the server returned no access token");
                }
                println!("Logged in as {}", session.gate().role());
                Ok(())
            }
            Self::Register {
                full_name,
                email,
                password,
                phone,
                referral_code,
            } => {
                let response = session
                    .auth()
                    .register(&RegisterRequest {
                        full_name,
                        email,
                        password,
                        phone,
                        referral_code,
                    })
                    .await?;
                print_json(&response)
            }
            Self::Logout => {
                session.logout();
                println!("Logged out");
                Ok(())
            }
            Self::Status => {
                status(session);
                Ok(())
            }
            Self::Refresh => {
                session.refresh().await?;
                info!("Session refreshed");
                println!("Session refreshed");
                Ok(())
            }
            Self::Profile => print_json(&session.user().profile().await?),
            Self::Referrals => {
                let user = session.user();
                print_json(&serde_json::json!({
                    "referredUsers": user.referred_users().await?,
                    "points": user.referral_points().await?,
                    "earnings": user.referral_earnings().await?,
                }))
            }
            Self::Subscriptions => {
                let user = session.user();
                print_json(&serde_json::json!({
                    "current": user.current_subscription().await?,
                    "history": user.subscription_history().await?,
                }))
            }
            Self::Get { path } => {
                let path = if path.starts_with('/') {
                    path
                } else {
                    format!("/{path}")
                };
                let response: JsonValue = session.pipeline().execute(ApiRequest::get(path)).await?;
                print_json(&response)
            }
            Self::Admin { command } => command.execute(session).await,
            Self::Config { command } => command.execute(context),
        }
    }
}

impl AdminCommands {
    pub async fn execute(self, session: &PortalSession) -> Result<()> {
        let admin = session.admin();
        let response = match self {
            Self::Users => admin.users().await?,
            Self::SubscriptionUsers => admin.subscription_users().await?,
            Self::Pdfs => admin.pdfs().await?,
            Self::Stats => admin.dashboard_stats().await?,
            Self::SetRole { user_id, role } => admin.update_user_role(&user_id, role).await?,
            Self::DeleteUser { user_id } => admin.delete_user(&user_id).await?,
        };
        print_json(&response)
    }
}

impl ConfigCommands {
    pub fn execute(self, context: &Context) -> Result<()> {
        match self {
            Self::Init { output, force } => {
                let config_path = output.unwrap_or_else(|| context.state_dir.config_path());
                config::generate_default_config(&config_path, force)?;
                println!("Generated configuration at: {}", config_path.display());
                Ok(())
            }
            Self::Show => print_json(&serde_json::to_value(&context.config)?),
        }
    }
}

fn status(session: &PortalSession) {
    let gate = session.gate();
    if !gate.is_authenticated() {
        println!("Not logged in");
        return;
    }

    println!("Logged in");
    println!("  role: {}", gate.role());
    if let Some(claims) = gate.claims() {
        if let Some(email) = claims.email {
            println!("  email: {email}");
        }
        if let Some(expires) = claims.exp.and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0)) {
            if expires <= Utc::now() {
                println!("  access token expired {expires} (refreshed on next call)");
            } else {
                println!("  access token expires {expires}");
            }
        }
    }
}

fn print_json(value: &JsonValue) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
