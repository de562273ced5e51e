use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use warden_auth::{DownstreamClient, TokenChainResolver, TokenStore};
use warden_bot::{
    AuthenticationDialogEngine, CommandRouter, DialogSettings, HttpSettingsSource,
    InvokeMultiplexer, SettingsSource, StaticSettings, TrustPolicy, TurnProcessor,
};
use warden_core::{WardenConfig, WardenError};
use warden_sessions::StateStore;

use crate::commands::{self, ProfileCardExecutor, ProfileExtension, ProfileLookup, ProfileTask};

/// Central shared state, passed as `Arc<AppState>` to all handlers.
pub struct AppState {
    pub config: WardenConfig,
    pub processor: TurnProcessor,
    pub resolver: Arc<TokenChainResolver>,
    pub downstream: Arc<DownstreamClient>,
}

/// Wire every component from configuration and the two external stores.
pub fn build_state(
    config: WardenConfig,
    tokens: Arc<dyn TokenStore>,
    state: Arc<dyn StateStore>,
) -> warden_core::Result<AppState> {
    let timeout = Duration::from_millis(config.http.timeout_ms);

    let resolver = Arc::new(TokenChainResolver::from_config(&config, tokens)?);
    let downstream = Arc::new(DownstreamClient::new(
        config.identity.downstream_profile_url.clone(),
        timeout,
    )?);
    let engine = Arc::new(AuthenticationDialogEngine::new(
        resolver.clone(),
        DialogSettings::from_config(&config.bot),
    ));
    let profiles = Arc::new(ProfileLookup::new(resolver.clone(), downstream.clone()));

    let settings: Arc<dyn SettingsSource> = match &config.backend.settings_url {
        Some(url) => Arc::new(
            HttpSettingsSource::new(url.clone(), timeout)
                .map_err(|e| WardenError::Config(format!("cannot build settings client: {e}")))?,
        ),
        None => Arc::new(StaticSettings::new()),
    };
    let router = commands::register(CommandRouter::new(settings), profiles.clone())?.with_augmented(
        Arc::new(ProfileCardExecutor::new(profiles.clone())),
        config.features.augmented_dispatch,
        config.features.augmented_setting_key.clone(),
    );

    let invokes = InvokeMultiplexer::new(engine.clone())
        .extension(commands::PROFILE_COMMAND, Arc::new(ProfileExtension::new(profiles.clone())))
        .task(commands::PROFILE_COMMAND, Arc::new(ProfileTask::new(profiles)));

    let processor = TurnProcessor::new(
        engine,
        router,
        invokes,
        state,
        TrustPolicy::from_config(&config.bot),
    )
    .with_commit_attempts(config.state.commit_attempts);

    Ok(AppState {
        config,
        processor,
        resolver,
        downstream,
    })
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/api/messages", post(crate::http::messages::messages_handler))
        .route("/api/obo-profile", get(crate::http::obo::obo_profile_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
