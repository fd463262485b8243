use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use client::guard::Decision;
use client::{build_context, ClientConfig, RegisterRequest, SessionBootstrapper};

mod telemetry;

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Moodboard session client")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Restore the session and stay connected for notifications (default)
    Run,
    /// Sign in and persist the session
    Login { username: String, password: String },
    /// Create an account and sign in
    Register {
        username: String,
        email: String,
        password: String,
    },
    /// Forget the persisted session
    Logout,
    /// Show the persisted session
    Whoami,
    /// Authenticated GET against the API, printed as JSON
    Get { path: String },
    /// Show what the navigation guard decides for a path
    Route { path: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init_tracing();
    let args = Args::parse();

    // Environment variables must be set by the runtime environment
    // (see ClientConfig::from_env for the MOODBOARD_* names).
    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let context = match build_context().with_config(config).build() {
        Ok(context) => context,
        Err(e) => {
            eprintln!("❌ Failed to build session context: {e}");
            return ExitCode::FAILURE;
        }
    };
    let bootstrapper = Arc::new(SessionBootstrapper::new(context));

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let state = bootstrapper.start().await;
            println!("🚀 Session started, notifications {state:?}");
            let watcher = bootstrapper.watch();
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("❌ Failed to listen for Ctrl-C: {e}");
            }
            watcher.abort();
            bootstrapper.context().channel.close();
            ExitCode::SUCCESS
        }
        Command::Login { username, password } => {
            bootstrapper.context().credentials.initialize().await;
            match bootstrapper.login(&username, &password).await {
                Ok(credential) => {
                    println!("✅ Logged in as {}", describe_user(&credential));
                    bootstrapper.context().channel.close();
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("❌ Login failed: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            bootstrapper.context().credentials.initialize().await;
            let request = RegisterRequest {
                username,
                email,
                password,
            };
            match bootstrapper.register(&request).await {
                Ok(credential) => {
                    println!("✅ Registered {}", describe_user(&credential));
                    bootstrapper.context().channel.close();
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("❌ Registration failed: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Logout => {
            bootstrapper.context().credentials.initialize().await;
            bootstrapper.logout().await;
            println!("✅ Logged out");
            ExitCode::SUCCESS
        }
        Command::Whoami => {
            let credential = bootstrapper.context().credentials.initialize().await;
            if credential.is_authenticated() {
                println!("{}", describe_user(&credential));
            } else {
                println!("not signed in");
            }
            ExitCode::SUCCESS
        }
        Command::Get { path } => {
            bootstrapper.context().credentials.initialize().await;
            match bootstrapper.fetch(&path).await {
                Ok(body) => {
                    println!("{body:#}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("❌ Request failed: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Route { path } => {
            let credential = bootstrapper.context().credentials.initialize().await;
            match bootstrapper.context().guard.check(&path, &credential) {
                Decision::Allow => println!("allow {path}"),
                Decision::Redirect(redirect) => println!("redirect {}", redirect.location()),
            }
            ExitCode::SUCCESS
        }
    }
}

fn describe_user(credential: &client::Credential) -> String {
    let user = credential.user.as_ref();
    let name = user.and_then(|u| u.username.clone());
    let id = user
        .map(|u| u.id.to_string())
        .or_else(|| credential.subject_id());
    match (name, id) {
        (Some(name), Some(id)) => format!("{name} (id {id})"),
        (None, Some(id)) => format!("user {id}"),
        (Some(name), None) => name,
        (None, None) => "unknown user".to_string(),
    }
}
