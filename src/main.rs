use std::{process, sync::Arc};

use tiercache::{
    application::{admin::AdminCacheService, error::AppError},
    cache::CacheRegistry,
    config,
    infra::{
        error::InfraError,
        http::{self, AdminState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let registry = Arc::new(CacheRegistry::from_settings(&settings.cache).await?);
    info!(
        enabled = registry.is_enabled(),
        namespace = %registry.policy().namespace.prefix(),
        base_dir = %registry.base_dir().display(),
        instances = registry.instances().len(),
        "Cache registry ready"
    );
    let service = AdminCacheService::new(registry);

    match command {
        config::Command::Serve(_) => run_serve(&settings, service).await,
        config::Command::Purge(_) => service.purge().await,
        config::Command::Stats(_) => run_stats(&service).await,
    }
}

async fn run_serve(
    settings: &config::Settings,
    service: AdminCacheService,
) -> Result<(), AppError> {
    let admin_router = http::build_admin_router(AdminState {
        cache: Arc::new(service),
    });

    let listener = tokio::net::TcpListener::bind(settings.admin.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.admin.addr, "Admin listener bound");

    axum::serve(listener, admin_router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!("Admin listener stopped");
    Ok(())
}

async fn run_stats(service: &AdminCacheService) -> Result<(), AppError> {
    let view = service.stats().await?;
    let rendered = serde_json::to_string_pretty(&view)
        .map_err(|err| AppError::unexpected(format!("failed to render stats: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}
