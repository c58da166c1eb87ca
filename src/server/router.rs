use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::Router;

use super::{admin, download, public, publish, upload};
use crate::auth::TokenAuthenticator;
use crate::events::EventPublisher;
use crate::storage::{ArtifactManager, BlobStore};
use crate::store::Store;

/// Uploads stream through memory per multipart part; this bounds a single
/// file, not a version.
const MAX_UPLOAD_BYTES: usize = 4 * 1024 * 1024 * 1024;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub blobs: Arc<dyn BlobStore>,
    pub artifacts: ArtifactManager,
    pub authenticator: Arc<TokenAuthenticator>,
    pub events: Arc<EventPublisher>,
    pub strict_token_scope: bool,
    pub public_listing: bool,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        strict_token_scope: bool,
        public_listing: bool,
    ) -> Self {
        Self {
            artifacts: ArtifactManager::new(blobs.clone()),
            authenticator: Arc::new(TokenAuthenticator::new(store.clone())),
            events: Arc::new(EventPublisher::new(store.clone())),
            store,
            blobs,
            strict_token_scope,
            public_listing,
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let mut api = Router::new()
        .route("/health", get(health).head(health))
        .route("/upload/init", post(upload::init_upload))
        .route(
            "/file/{project}/{app}/{version}",
            post(upload::upload_file)
                .get(download::get_file)
                .head(download::head_file),
        )
        .route("/upload/finish", post(upload::finish_upload))
        .route(
            "/manifest/{project}/{app}/{version}",
            get(download::get_manifest),
        )
        .route(
            "/projects/{project}/apps/{app}/latest",
            get(publish::get_latest_version),
        )
        .route("/publish", post(publish::publish))
        .route("/unpublish", post(publish::unpublish))
        .route("/projects/{project}", delete(admin::delete_project))
        .route(
            "/projects/{project}/apps/{app}",
            delete(admin::delete_app),
        )
        .route(
            "/projects/{project}/apps/{app}/versions/{version}",
            delete(admin::delete_version),
        )
        .route("/sync-storage", post(admin::sync_storage));

    if state.public_listing {
        api = api
            .route("/public/projects", get(public::list_projects))
            .route(
                "/public/projects/{project}/apps",
                get(public::list_apps),
            )
            .route(
                "/public/projects/{project}/apps/{app}/versions",
                get(public::list_versions),
            );
    }

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health).head(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
