//! MozTrap server entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_files::{Files, NamedFile};
use actix_web::{App, HttpRequest, HttpServer, Result as ActixResult, http::header, web};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use moztrap_lib::api::{self, ApiDoc};
use moztrap_lib::auth::AdminKey;
use moztrap_lib::auth::throttle::LoginThrottle;
use moztrap_lib::config::Config;
use moztrap_lib::db::DbPool;
use moztrap_lib::middleware::RequestLogger;
use moztrap_lib::services::browserid::RemoteVerifier;
use moztrap_lib::services::openid::JwksVerifier;
use moztrap_lib::services::{self, BrowserIdHandle, CleanupConfig, MailerHandle, OpenIdHandle};

/// SPA fallback handler - serves index.html for client-side routing.
async fn spa_fallback(req: HttpRequest) -> ActixResult<NamedFile> {
    let static_dir = req
        .app_data::<web::Data<PathBuf>>()
        .ok_or_else(|| actix_web::error::ErrorNotFound("Static files not configured"))?;
    Ok(NamedFile::open(static_dir.join("index.html"))?)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    if std::env::args().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        std::process::exit(if Config::from_env().is_ok() { 0 } else { 1 });
    }

    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL and MT_SESSION_SECRET must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  MozTrap");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    let pool = match DbPool::new(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    info!("Database connection established");

    if let Err(e) = pool.run_migrations().await {
        error!("{}", e);
        std::process::exit(1);
    }
    info!("Database migrations complete");

    services::start_cleanup_task(
        Arc::new(pool.clone()),
        CleanupConfig {
            activation_days: config.account_activation_days,
            interval_secs: config.registration_cleanup_secs,
        },
    );

    let mailer = MailerHandle::from_settings(&config.mail).map_err(std::io::Error::other)?;
    let browserid = BrowserIdHandle(Arc::new(
        RemoteVerifier::new(&config.browserid).map_err(std::io::Error::other)?,
    ));
    let openid = OpenIdHandle(Arc::new(
        JwksVerifier::new(&config.openid).map_err(std::io::Error::other)?,
    ));
    if config.browserid.enabled {
        info!("BrowserID login enabled (audience {})", config.browserid.audience);
    }
    if config.openid.enabled {
        info!("OpenID Connect login enabled (issuer {})", config.openid.issuer);
    }

    let bind_address = config.bind_address();
    let admin_key = web::Data::new(AdminKey::new(config.admin_key.clone()));
    let throttle = web::Data::new(LoginThrottle::new(config.login_attempts_per_minute));
    let mailer = web::Data::new(mailer);
    let browserid = web::Data::new(browserid);
    let openid = web::Data::new(openid);
    let pool = web::Data::new(pool);
    let static_dir = config.static_dir.clone();
    let is_development = config.is_development();
    let config = web::Data::new(config);

    if static_dir.is_some() {
        info!("Static file serving enabled from {:?}", static_dir);
    }

    let worker_count = if is_development { 4 } else { num_cpus::get() };
    info!(
        "Starting server at http://{} ({} workers)",
        bind_address, worker_count
    );

    let server = HttpServer::new(move || {
        let allowed_headers = vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
            header::HeaderName::from_static("x-admin-key"),
        ];

        let cors = if is_development {
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .allowed_headers(allowed_headers)
                .supports_credentials()
                .max_age(3600)
        } else {
            // Same-origin only
            Cors::default()
                .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .allowed_headers(allowed_headers)
                .max_age(3600)
        };

        let mut app = App::new()
            .wrap(cors)
            .wrap(RequestLogger)
            .app_data(pool.clone())
            .app_data(config.clone())
            .app_data(admin_key.clone())
            .app_data(throttle.clone())
            .app_data(mailer.clone())
            .app_data(browserid.clone())
            .app_data(openid.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            );

        if let Some(ref dir) = static_dir {
            app = app
                .app_data(web::Data::new(dir.clone()))
                .service(Files::new("/assets", dir.join("assets")).prefer_utf8(true))
                .default_service(web::route().to(spa_fallback));
        }

        app
    });

    server.workers(worker_count).bind(&bind_address)?.run().await
}
