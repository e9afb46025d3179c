use actix_web::{middleware, App, HttpServer};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chirp::config::Settings;
use chirp::core::db::{seed_demo_data, Db, MemoryStore};
use chirp::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chirp=info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::parse();
    let addr = settings.bind_addr()?;

    let db = match &settings.data_file {
        Some(path) => {
            tracing::info!("Using snapshot file {}", path.display());
            Db::new(MemoryStore::open(path)?)
        }
        None => {
            tracing::warn!("No data file configured, state is kept in memory only");
            Db::in_memory()
        }
    };

    if settings.seed_demo {
        seed_demo_data(&db).map_err(|e| anyhow::anyhow!("Failed to seed demo data: {}", e))?;
    }

    let state = AppState::new(db, settings);

    tracing::info!("Server listening on http://{}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(chirp::configure)
    })
    .bind(addr)?
    .run()
    .await?;

    Ok(())
}
