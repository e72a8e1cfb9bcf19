use std::path::Path;
use std::time::Duration;

use actix_web::middleware::{Logger, NormalizePath};
use actix_web::web::{self, Data};
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use absensi::api::roster::mark_absent_days;
use absensi::config::Config;
use absensi::db::{init_db, run_migrations};
use absensi::docs::ApiDoc;
use absensi::error::ApiError;
use absensi::routes::{self, RateLimits};
use absensi::utils::{outlet_cache, tls::load_server_config, username_index};

const ABSENT_SWEEP_EVERY: Duration = Duration::from_secs(3600);

#[get("/")]
async fn index() -> impl Responder {
    "Absensi API"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "absensi.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .init();

    info!(addr = %config.server_addr, "Server starting...");

    let pool = init_db(&config.database_url).await?;
    if config.run_migrations {
        run_migrations(&pool).await?;
        info!("Migrations applied");
    }

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("cannot create upload dir {}", config.upload_dir))?;

    let limits = RateLimits::from_config(&config)?;

    let pool_for_filter_warmup = pool.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = username_index::warmup(&pool_for_filter_warmup, 500).await {
            warn!(error = %e, "Failed to warm up username filter");
        }
    });

    let pool_for_outlets = pool.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = outlet_cache::active_outlets(&pool_for_outlets).await {
            warn!(error = %e, "Failed to warm up outlet cache");
        }
    });

    let pool_for_sweep = pool.clone();
    let config_for_sweep = config.clone();
    actix_web::rt::spawn(async move {
        let mut tick = actix_web::rt::time::interval(ABSENT_SWEEP_EVERY);
        loop {
            tick.tick().await;
            match mark_absent_days(&pool_for_sweep, &config_for_sweep).await {
                Ok(0) => {}
                Ok(marked) => info!(marked, "Absent sweep marked days as mangkir"),
                Err(e) => error!(error = %e, "Absent sweep failed"),
            }
        }
    });

    // base64 photos are a third larger than their decoded size
    let json_limit = config.max_photo_bytes * 4 / 3 + 64 * 1024;

    let server_addr = config.server_addr.clone();
    let tls = match config.tls_paths()? {
        Some((cert, key)) => Some(load_server_config(Path::new(cert), Path::new(key))?),
        None => None,
    };

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                // wildcard so the JS/CSS assets resolve
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(web::JsonConfig::default().limit(json_limit).error_handler(|err, _| {
                ApiError::validation(format!("Invalid JSON body: {err}")).into()
            }))
            .service(index)
            .configure(|cfg| routes::configure(cfg, &config, &limits))
    });

    let server = match tls {
        Some(tls) => {
            info!(addr = %server_addr, "Serving HTTPS");
            server.bind_rustls_0_23(&server_addr, tls)
        }
        None => {
            warn!(addr = %server_addr, "TLS not configured, serving plain HTTP");
            server.bind(&server_addr)
        }
    }
    .with_context(|| format!("cannot bind {server_addr}"))?;

    server.run().await?;

    Ok(())
}
