//! # campsite-server
//!
//! Assembles stores, identity, and services into the HTTP router and serves
//! it until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use api_adapters::{router, AppState, Metrics};
use auth_adapters::JwtIdentityResolver;
use configs::{LogSettings, Settings};
use services::{OriginHasher, ReviewPolicy, ReviewService, SearchLimits, SearchService, SiteService};
use storage_adapters::{InMemoryDirectory, InMemoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    init_tracing(&settings.log);

    let store = Arc::new(InMemoryStore::new());
    let directory = Arc::new(InMemoryDirectory::new());

    let search = SearchService::new(
        store.clone(),
        SearchLimits {
            default_page_size: settings.search.default_page_size,
            max_page_size: settings.search.max_page_size,
        },
    );
    let sites = SiteService::new(store.clone());
    let reviews = ReviewService::new(
        store.clone(),
        store.clone(),
        directory,
        OriginHasher::new(settings.reviews.origin_salt),
        ReviewPolicy {
            flag_hide_threshold: settings.reviews.flag_hide_threshold,
            anonymous_window: chrono::Duration::hours(settings.reviews.anonymous_window_hours),
            max_comment_chars: settings.reviews.max_comment_chars,
            default_page_size: settings.reviews.default_page_size,
            max_page_size: settings.reviews.max_page_size,
        },
    );

    let state = AppState {
        search: Arc::new(search),
        sites: Arc::new(sites),
        reviews: Arc::new(reviews),
        identity: Arc::new(JwtIdentityResolver::new(&settings.auth.jwt_secret)),
        metrics: Arc::new(Metrics::new()),
        trusted_proxies: Arc::from(settings.server.trusted_proxies.clone()),
    };

    let addr = settings.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, trusted_proxies = ?settings.server.trusted_proxies, "campsite-server listening");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("campsite-server stopped");
    Ok(())
}

/// `RUST_LOG` wins over the configured filter when set.
fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
