use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tournify::guard;
use tournify::page::{Searchable, filter_by_query};
use tournify::resources::{Game, Player, Resource, Team, Tournament};
use tournify::types::{ProfileUpdate, ResetPasswordRequest, SignupRequest};
use tournify::{
    ApiError, ConfigError, FileStore, GuardDecision, HttpAuthApi, Navigator, SessionConfig, SessionManager,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("could not read .env: {0}")]
    DotEnv(String),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("not signed in; run `tournify login` first")]
    NotSignedIn,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "tournify", about = "Tournify session and backend CLI")]
struct Cli {
    /// Where the session (token and user) is persisted between runs.
    #[arg(long, env = "TOURNIFY_SESSION_FILE", default_value = ".tournify-session.json")]
    session_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Health,
    Login {
        #[arg(long)]
        user: String,
        #[arg(long, env = "TOURNIFY_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout {
        /// Wait for the server and report its answer.
        #[arg(long, default_value_t = false)]
        server: bool,
    },
    Me,
    Signup(SignupArgs),
    UpdateProfile(ProfileArgs),
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    VerifyCode {
        #[arg(long)]
        email: String,
        #[arg(long)]
        code: String,
    },
    ResetPassword(ResetArgs),
    /// Show what the route guard does with a route in the current session.
    Guard { route: String },
    List(ListArgs),
}

#[derive(Args, Debug)]
struct SignupArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    email: String,
    #[arg(long, env = "TOURNIFY_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    address: Option<String>,
}

#[derive(Args, Debug)]
struct ProfileArgs {
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    address: Option<String>,
}

#[derive(Args, Debug)]
struct ResetArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    code: String,
    #[arg(long)]
    new_password: String,
    #[arg(long)]
    confirm_password: String,
}

#[derive(Args, Debug)]
struct ListArgs {
    resource: ResourceArg,
    #[arg(long)]
    search: Option<String>,
    #[arg(long, default_value_t = 0)]
    page: u32,
    #[arg(long, default_value_t = 10)]
    size: u32,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ResourceArg {
    Teams,
    Players,
    Games,
    Tournaments,
    ActiveTournaments,
}

impl From<ResourceArg> for Resource {
    fn from(arg: ResourceArg) -> Self {
        match arg {
            ResourceArg::Teams => Resource::Teams,
            ResourceArg::Players => Resource::Players,
            ResourceArg::Games => Resource::Games,
            ResourceArg::Tournaments => Resource::Tournaments,
            ResourceArg::ActiveTournaments => Resource::ActiveTournaments,
        }
    }
}

/// Navigation has no screen to drive here; it is reported on the log.
struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn replace(&self, route: &str) {
        tracing::info!(route, "navigate");
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(CliError::DotEnv(err.to_string()));
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SessionConfig::from_env()?;
    let api = Arc::new(HttpAuthApi::new(&config)?);
    let store = Arc::new(FileStore::new(cli.session_file));
    let manager = SessionManager::new(config, api, store, Arc::new(TracingNavigator));
    manager.hydrate().await;

    let output = run(&manager, cli.command).await?;
    print_json(&output)
}

async fn run(manager: &SessionManager, command: Command) -> Result<Value, CliError> {
    match command {
        Command::Health => Ok(serde_json::to_value(manager.health().await?)?),
        Command::Login { user, password } => Ok(serde_json::to_value(manager.login(&user, &password).await?)?),
        Command::Logout { server } => {
            if server {
                manager.server_logout().await?;
            } else {
                manager.logout().await;
            }
            Ok(json!({ "signedOut": true }))
        }
        Command::Me => {
            let user = manager.current_user().await.ok_or(CliError::NotSignedIn)?;
            Ok(serde_json::to_value(user)?)
        }
        Command::Signup(args) => {
            let request = SignupRequest {
                username: args.username,
                email: args.email,
                password: args.password,
                first_name: args.first_name,
                last_name: args.last_name,
                phone: args.phone,
                address: args.address,
            };
            Ok(serde_json::to_value(manager.register(request).await?)?)
        }
        Command::UpdateProfile(args) => {
            let update = ProfileUpdate {
                first_name: args.first_name,
                last_name: args.last_name,
                phone: args.phone,
                address: args.address,
            };
            Ok(serde_json::to_value(manager.update_profile(update).await?)?)
        }
        Command::ForgotPassword { email } => message(manager.forgot_password(&email).await?),
        Command::VerifyCode { email, code } => message(manager.verify_reset_code(&email, &code).await?),
        Command::ResetPassword(args) => {
            let request = ResetPasswordRequest {
                email: args.email,
                code: args.code,
                new_password: args.new_password,
                confirm_password: args.confirm_password,
            };
            message(manager.reset_password(request).await?)
        }
        Command::Guard { route } => {
            let decision = match guard::decide(manager.routes(), manager.auth_status().await, &route) {
                GuardDecision::Loading => json!({ "decision": "loading" }),
                GuardDecision::Render => json!({ "decision": "render" }),
                GuardDecision::Redirect(to) => json!({ "decision": "redirect", "to": to }),
            };
            Ok(decision)
        }
        Command::List(args) => {
            let resource = Resource::from(args.resource);
            let search = args.search.as_deref();
            match resource {
                Resource::Teams => list::<Team>(manager, resource, search, args.page, args.size).await,
                Resource::Players => list::<Player>(manager, resource, search, args.page, args.size).await,
                Resource::Games => list::<Game>(manager, resource, search, args.page, args.size).await,
                Resource::Tournaments | Resource::ActiveTournaments => {
                    list::<Tournament>(manager, resource, search, args.page, args.size).await
                }
            }
        }
    }
}

async fn list<T>(
    manager: &SessionManager,
    resource: Resource,
    search: Option<&str>,
    page: u32,
    size: u32,
) -> Result<Value, CliError>
where
    T: DeserializeOwned + Serialize + Searchable,
{
    if !manager.is_authenticated().await {
        return Err(CliError::NotSignedIn);
    }

    let page = match (search, resource.search_endpoint()) {
        (Some(query), Some((path, param))) => {
            let result = manager.fetch_page::<T>(path, &[(param.to_owned(), query.to_owned())]).await?;
            return render_page(&result.items.iter().collect::<Vec<_>>(), result.total_pages, result.total_elements);
        }
        _ => manager.fetch_page::<T>(resource.list_path(), &Resource::page_query(page, size)).await?,
    };

    match search {
        Some(query) => {
            let matched = filter_by_query(&page.items, query);
            let count = matched.len() as u64;
            render_page(&matched, u64::from(count > 0), count)
        }
        None => render_page(&page.items.iter().collect::<Vec<_>>(), page.total_pages, page.total_elements),
    }
}

fn render_page<T: Serialize>(items: &[&T], total_pages: u64, total_elements: u64) -> Result<Value, CliError> {
    Ok(json!({
        "items": serde_json::to_value(items)?,
        "totalPages": total_pages,
        "totalElements": total_elements,
    }))
}

fn message(text: String) -> Result<Value, CliError> {
    Ok(json!({ "message": text }))
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
