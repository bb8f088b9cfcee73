use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use forumdb::config::AppConfig;
use forumdb::openapi::ApiDoc;
use forumdb::repo::Repo;
use forumdb::routes::{config, AppState};

#[cfg(feature = "postgres-store")]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use forumdb::repo::pg::PgRepo;
    use sqlx::postgres::PgPoolOptions;

    let db_url = cfg.database_url.as_deref().context("DATABASE_URL must be set for postgres-store")?;
    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_max_connections)
        .connect_lazy(db_url)
        .context("failed to create Pg pool")?;
    if cfg.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await.context("failed to run migrations")?;
        info!("Database migrations applied");
    }
    info!("Using Postgres repository backend");
    Ok(Arc::new(PgRepo::new(pool)))
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_repo(_cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    info!("Using in-memory repository backend");
    Ok(Arc::new(forumdb::repo::inmem::InMemRepo::new()))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = AppConfig::from_env()?;
    info!("Bootstrapping forum API");

    let repo = build_repo(&cfg).await?;
    let state = web::Data::new(AppState { repo });
    let openapi = ApiDoc::openapi();
    let origins = cfg.cors_origins.clone();

    let server = HttpServer::new(move || {
        let cors = origins.iter().fold(
            Cors::default()
                .allow_any_header()
                .allowed_methods(["GET", "POST", "OPTIONS"])
                .max_age(3600),
            |c, origin| c.allowed_origin(origin),
        );

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind((cfg.bind_addr.as_str(), cfg.port))
    .with_context(|| format!("failed to bind {}:{}", cfg.bind_addr, cfg.port))?;

    info!("Listening on http://{}:{}", cfg.bind_addr, cfg.port);

    server.run().await?;
    Ok(())
}
