use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use chrono_tz::Tz;
use common::BucketStore;
use purger::{BackupSink, PurgeMetrics, PurgeService};
use querier::RetrievalService;
use writer::IngestService;

pub mod endpoints;
pub mod error;

pub use error::ApiError;

pub trait RouterState: std::fmt::Debug + Clone + Send + Sync + 'static {
    fn ingest(&self) -> &IngestService;
    fn retrieval(&self) -> &RetrievalService;
    fn purge(&self) -> &PurgeService;
}

/// Services shared by the route handlers
#[derive(Debug, Clone)]
pub struct ServiceState {
    ingest: IngestService,
    retrieval: RetrievalService,
    purge: PurgeService,
}

impl ServiceState {
    /// Wire every service to the same store; calendar boundaries use `tz`.
    pub fn new(store: Arc<dyn BucketStore>, backup: Arc<dyn BackupSink>, tz: Tz) -> Self {
        Self {
            ingest: IngestService::new(store.clone(), tz),
            retrieval: RetrievalService::new(store.clone(), tz),
            purge: PurgeService::new(store, backup, PurgeMetrics::new(), tz),
        }
    }
}

impl RouterState for ServiceState {
    fn ingest(&self) -> &IngestService {
        &self.ingest
    }

    fn retrieval(&self) -> &RetrievalService {
        &self.retrieval
    }

    fn purge(&self) -> &PurgeService {
        &self.purge
    }
}

/// Create a new router instance with all routes configured
pub fn create_router<S: RouterState>(state: S) -> Router {
    use endpoints::{admin, data};

    Router::new()
        .route("/health", get(admin::health_check))
        .route("/metrics", get(admin::metrics::<S>))
        .route("/insert-dummy", post(data::insert_calendar::<S>))
        .route("/insert-unix", post(data::insert_epoch::<S>))
        .route(
            "/data/:type/:value",
            get(data::get_calendar::<S>).delete(data::purge_calendar::<S>),
        )
        .route(
            "/data-unix/:type/:value",
            get(data::get_epoch::<S>).delete(data::purge_epoch::<S>),
        )
        .route("/data", delete(data::purge_calendar_range::<S>))
        .route("/data-unix", delete(data::purge_epoch_range::<S>))
        .with_state(state)
}
