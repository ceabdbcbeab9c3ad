use crate::{
    api::{
        self,
        admission::{BUCKET_EXPIRY, RateLimitConfig, RateLimiter, TokenBucketLimiter, spawn_sweeper},
        handlers::auth::{AuthConfig, AuthState},
    },
    server::{LifecycleState, Server},
    sso::WorkOsClient,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub environment: String,
    pub workos_api_key: SecretString,
    pub workos_client_id: String,
    pub workos_auth_callback: String,
    pub workos_provider: String,
    pub workos_api_url: String,
    pub rate_limit: RateLimitConfig,
    pub cors_allow_origin: String,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the configuration is invalid, the listener can not be
/// bound, the listener fails, or in-flight requests outlive the drain deadline.
pub async fn execute(args: Args) -> Result<()> {
    let provider = WorkOsClient::new(
        &args.workos_api_url,
        args.workos_client_id,
        args.workos_api_key,
    )
    .context("Invalid WorkOS configuration")?;

    let auth_config = AuthConfig::new(&args.workos_auth_callback)
        .context("Invalid WORKOS_AUTH_CALLBACK")?
        .with_provider(args.workos_provider)?;

    debug!(
        callback = %auth_config.redirect_uri(),
        provider = auth_config.provider(),
        api_url = %provider.base_url(),
        "Identity provider configured"
    );

    let auth_state = Arc::new(AuthState::new(auth_config, Arc::new(provider)));
    let limiter: Arc<dyn RateLimiter> = Arc::new(TokenBucketLimiter::new(args.rate_limit));
    let cors = api::cors_layer(&args.cors_allow_origin).context("Invalid CORS origin")?;
    let app = api::router(auth_state, Arc::clone(&limiter), cors);

    let addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, args.port));
    let server = Server::bind(addr, app).await?;

    let mut lifecycle = server.lifecycle();
    let sweeper = spawn_sweeper(limiter, BUCKET_EXPIRY, async move {
        let _ = lifecycle
            .wait_for(|state| *state >= LifecycleState::Draining)
            .await;
    });

    info!(
        port = args.port,
        environment = %args.environment,
        rate_per_second = args.rate_limit.per_second(),
        rate_burst = args.rate_limit.burst(),
        "Starting vitals"
    );

    let result = server.run(shutdown_signal()).await;
    join_sweeper(sweeper).await;

    result.context("Server shutdown failed")
}

/// Wait for the sweeper to stop, returning `false` if it panicked or was
/// cancelled.
async fn join_sweeper(sweeper: JoinHandle<()>) -> bool {
    match sweeper.await {
        Ok(()) => true,
        Err(err) => {
            error!("Rate limit sweeper failed: {err}");
            false
        }
    }
}

/// Resolve on an interrupt (or terminate on unix).
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for interrupt signal: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for terminate signal: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!("Received interrupt, shutting down"),
        () = terminate => info!("Received terminate, shutting down"),
    }
}
