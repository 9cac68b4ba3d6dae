use clap::{Parser, Subcommand};
use workshop_auth::password::hash_password;
use workshop_contracts::Role;
use workshop_gateway::{config, http};
use workshop_store::{NewUser, PgStore, UserStore};

#[derive(Parser)]
#[command(name = "workshop-gateway")]
#[command(about = "Workshop admin backend HTTP service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (the default).
    Serve,
    /// Insert an admin user and exit.
    CreateAdmin {
        username: String,
        email: String,
        password: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match config::GatewayConfig::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("STARTUP_ERROR {}", err);
            std::process::exit(1);
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::CreateAdmin {
            username,
            email,
            password,
        } => create_admin(config, username, email, password).await,
    }
}

async fn serve(config: config::GatewayConfig) {
    let app = match http::router(config.clone()).await {
        Ok(app) => app,
        Err(err) => {
            eprintln!("STARTUP_ERROR {}", err);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(_) => {
            eprintln!("STARTUP_ERROR ERR_BIND_FAILED failed to bind gateway listener");
            std::process::exit(1);
        }
    };

    tracing::info!(bind_addr = %config.bind_addr, "workshop-gateway listening");

    if let Err(err) = axum::serve(listener, app).await {
        eprintln!("STARTUP_ERROR ERR_SERVER_FAILED {}", err);
        std::process::exit(1);
    }
}

async fn create_admin(
    config: config::GatewayConfig,
    username: String,
    email: String,
    password: String,
) {
    let username = username.trim().to_string();
    let email = email.trim().to_lowercase();
    if username.is_empty() || !email.contains('@') || password.len() < 8 {
        eprintln!(
            "STARTUP_ERROR ERR_INVALID_PARAMS create-admin needs a username, a valid email and a password of at least 8 characters"
        );
        std::process::exit(1);
    }

    let password_hash = match hash_password(&password) {
        Ok(hash) => hash,
        Err(err) => {
            eprintln!("STARTUP_ERROR {}", err);
            std::process::exit(1);
        }
    };

    let store = match PgStore::connect_and_migrate(&config.db_url, config.store_timeout()).await {
        Ok(store) => store,
        Err(err) => {
            eprintln!("STARTUP_ERROR ERR_DB_UNAVAILABLE {}", err);
            std::process::exit(1);
        }
    };

    let result = store
        .create_user(NewUser {
            username,
            email,
            password_hash,
            role: Role::Admin,
        })
        .await;
    store.close().await;

    match result {
        Ok(principal) => {
            tracing::info!(principal_id = principal.id, "admin user created");
            println!("created admin user {} ({})", principal.username, principal.email);
        }
        Err(err) => {
            eprintln!("STARTUP_ERROR ERR_CREATE_ADMIN {}", err);
            std::process::exit(1);
        }
    }
}
