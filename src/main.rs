use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::{path::PathBuf, sync::Arc};
use subtrack::{
    models::{BillingCycle, LoginCredentials, NewSubscription, NewUser, SubscriptionUpdate},
    stats, ApiClient, ClientConfig, SessionManager,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "subtrack")]
#[command(about = "Command-line client for the subscription tracker backend")]
#[command(version)]
struct Cli {
    /// Backend origin, overrides SUBTRACK_API_URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Session file, overrides SUBTRACK_SESSION_PATH
    #[arg(long, global = true)]
    session_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SUBTRACK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Print the signed-in user
    Whoami,
    /// Exchange the refresh token for a new access token
    Refresh,
    #[command(subcommand)]
    Subscriptions(SubscriptionCommand),
    #[command(subcommand)]
    Users(UserCommand),
    /// Subscriptions renewing within the next 7 days
    Renewals,
    /// Billing-cycle totals and average cost
    Summary {
        /// Also print spend per billing cycle and services ranked by cost
        #[arg(long)]
        breakdown: bool,
    },
    Insights,
    /// System-wide aggregates (admins only)
    Overview,
}

#[derive(Subcommand)]
enum SubscriptionCommand {
    List {
        /// Only admin-shared subscriptions
        #[arg(long)]
        shared: bool,
    },
    Show {
        id: i64,
    },
    Add(SubscriptionFields),
    Update {
        id: i64,
        #[command(flatten)]
        fields: SubscriptionFields,
        /// Share with every user (admins only)
        #[arg(long)]
        shared: Option<bool>,
    },
    Delete {
        id: i64,
    },
}

#[derive(Args)]
struct SubscriptionFields {
    #[arg(long)]
    service_name: String,
    #[arg(long)]
    cost: String,
    #[arg(long, default_value = "monthly")]
    billing_cycle: BillingCycle,
    /// YYYY-MM-DD
    #[arg(long)]
    renewal_date: NaiveDate,
    #[arg(long)]
    notes: Option<String>,
}

impl From<SubscriptionFields> for NewSubscription {
    fn from(fields: SubscriptionFields) -> Self {
        Self {
            service_name: fields.service_name,
            cost: fields.cost,
            billing_cycle: fields.billing_cycle,
            renewal_date: fields.renewal_date,
            notes: fields.notes,
        }
    }
}

#[derive(Subcommand)]
enum UserCommand {
    List,
    Add {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "SUBTRACK_NEW_USER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("subtrack=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.api_url.as_deref() {
        config = config.with_base_url(url)?;
    }
    if let Some(path) = cli.session_path {
        config = config.with_session_path(path);
    }

    let session = Arc::new(SessionManager::from_config(&config).await?);
    let api = ApiClient::new(Arc::clone(&session));

    match cli.command {
        Command::Login { email, password } => {
            let session = session.login(&LoginCredentials { email, password }).await?;
            print_json(&session.user)?;
        }
        Command::Logout => session.logout().await,
        Command::Whoami => match session.current_user() {
            Some(user) => print_json(&user)?,
            None => println!("not logged in"),
        },
        Command::Refresh => {
            if !session.refresh().await {
                return Err("token refresh failed; please log in again".into());
            }
            info!("session refreshed");
        }
        Command::Subscriptions(command) => run_subscriptions(&api, command).await?,
        Command::Users(UserCommand::List) => print_json(&api.users().await?)?,
        Command::Users(UserCommand::Add {
            username,
            email,
            password,
        }) => {
            let user = api
                .create_user(&NewUser {
                    username,
                    email,
                    password,
                })
                .await?;
            print_json(&user)?;
        }
        Command::Renewals => print_json(&api.upcoming_renewals().await?)?,
        Command::Summary { breakdown } => {
            print_json(&api.summary().await?)?;
            if breakdown {
                let subscriptions = api.subscriptions().await?;
                print_json(&stats::spending_by_cycle(&subscriptions))?;
                print_json(&stats::top_services(&subscriptions))?;
            }
        }
        Command::Insights => print_json(&api.insights().await)?,
        Command::Overview => print_json(&api.admin_overview().await?)?,
    }

    Ok(())
}

async fn run_subscriptions(
    api: &ApiClient,
    command: SubscriptionCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        SubscriptionCommand::List { shared } => {
            let subscriptions = api.subscriptions().await?;
            if shared {
                print_json(&stats::shared_subscriptions(&subscriptions))?;
            } else {
                print_json(&subscriptions)?;
            }
        }
        SubscriptionCommand::Show { id } => print_json(&api.subscription(id).await?)?,
        SubscriptionCommand::Add(fields) => {
            print_json(&api.create_subscription(&fields.into()).await?)?;
        }
        SubscriptionCommand::Update { id, fields, shared } => {
            let update = SubscriptionUpdate {
                fields: fields.into(),
                is_shared: shared,
            };
            print_json(&api.update_subscription(id, &update).await?)?;
        }
        SubscriptionCommand::Delete { id } => {
            api.delete_subscription(id).await?;
            info!(id, "subscription deleted");
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
