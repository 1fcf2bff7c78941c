//! Jarls — an authoritative game server for the hex-board strategy game
//! Jarls.
//!
//! ## Features
//!
//! - A pure rules core ([`rules`]) and compound state machine ([`machine`])
//!   driving every game from lobby through setup, play, starvation, and
//!   elimination to a decided winner.
//! - A [`manager::GameManager`] serializing concurrent access to each game
//!   behind a per-game lock, backed by a durable Postgres snapshot + event
//!   log ([`storage`]).
//! - A REST API with Swagger documentation ([`api`]) and a mirrored
//!   WebSocket protocol ([`ws`]) for real-time event subscription.
//! - Pluggable AI seats ([`ai`]) scheduled automatically whenever it becomes
//!   an AI player's turn or starvation choice.
//!
//! ## Usage
//!
//! ```bash
//! jarls serve --port 8080 --database-url postgres://localhost/jarls
//! ```

pub mod ai;
pub mod api;
pub mod hex;
pub mod machine;
pub mod manager;
pub mod rules;
pub mod setup;
pub mod storage;
pub mod types;
pub mod ws;

use actix::Actor;
use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{ApiDoc, AppState};
use crate::manager::GameManager;
use crate::storage::PostgresStore;
use crate::ws::{BroadcastEvent, GameBroadcaster};

/// Jarls — an authoritative server for the hex-board strategy game.
#[derive(Parser, Debug)]
#[command(name = "jarls")]
#[command(about = "Authoritative game server for Jarls")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the REST + WebSocket API server with Swagger UI.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// Host address to bind to.
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Postgres connection string. Falls back to the `DATABASE_URL`
        /// environment variable when not given.
        #[arg(long)]
        database_url: Option<String>,
    },
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host, database_url } => {
            let database_url = database_url
                .or_else(|| std::env::var("DATABASE_URL").ok())
                .expect("a database URL must be given via --database-url or DATABASE_URL");
            run_server(&host, port, &database_url).await
        }
    }
}

async fn run_server(host: &str, port: u16, database_url: &str) -> std::io::Result<()> {
    let openapi = ApiDoc::openapi();

    let store = PostgresStore::connect(database_url)
        .await
        .map_err(|e| std::io::Error::other(format!("failed to connect to database: {e}")))?;
    let manager = GameManager::new(Arc::new(store));

    let broadcaster = GameBroadcaster::new().start();

    // Bridge AI-generated moves (which have no direct client request to
    // answer) into the same broadcast path human-triggered moves use.
    let broadcaster_for_ai = broadcaster.clone();
    manager
        .on_ai_move(move |game_id, events| {
            broadcaster_for_ai.do_send(BroadcastEvent { game_id, events });
        })
        .await;

    match manager.recover().await {
        Ok(count) => log::info!("recovered {count} active games from storage"),
        Err(e) => log::error!("failed to recover active games: {e}"),
    }

    let app_state = web::Data::new(AppState { manager: manager.clone() });
    let broadcaster_data = web::Data::new(broadcaster);

    log::info!("starting jarls server on {}:{}", host, port);
    log::info!("swagger UI available at http://{}:{}/swagger-ui/", host, port);
    log::info!("websocket endpoint: ws://{}:{}/ws", host, port);

    HttpServer::new(move || {
        let cors = Cors::default().allow_any_origin().allow_any_method().allow_any_header().max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(app_state.clone())
            .app_data(broadcaster_data.clone())
            .configure(api::configure_routes)
            .route("/ws", web::get().to(ws::ws_connect))
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()))
    })
    .bind((host, port))?
    .run()
    .await
}
