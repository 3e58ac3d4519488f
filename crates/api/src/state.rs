use std::sync::Arc;

use pressroom_core::cache::private::PrivateRouteCache;
use pressroom_core::cache::BlobPort;
use pressroom_core::events::EventBus;
use pressroom_core::preview::PreviewService;
use pressroom_core::release::builder::ReleaseBuilder;
use pressroom_core::release::store::ReleaseStore;
use pressroom_core::store::DocumentStore;

use crate::config::AppConfig;

/// Shared application state, passed to all handlers via Axum's
/// `State` extractor. Wrapped in `Arc` so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    pub documents: Arc<dyn DocumentStore>,
    pub releases: Arc<dyn ReleaseStore>,
    pub blobs: Arc<dyn BlobPort>,
    pub builder: ReleaseBuilder,
    pub preview: PreviewService,
    pub private_cache: PrivateRouteCache,
    pub event_bus: EventBus,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        releases: Arc<dyn ReleaseStore>,
        blobs: Arc<dyn BlobPort>,
        builder: ReleaseBuilder,
        preview: PreviewService,
        private_cache: PrivateRouteCache,
        event_bus: EventBus,
        config: AppConfig,
    ) -> Self {
        Self {
            inner: Arc::new(InnerState {
                documents,
                releases,
                blobs,
                builder,
                preview,
                private_cache,
                event_bus,
                config,
            }),
        }
    }

    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.documents
    }

    pub fn releases(&self) -> &Arc<dyn ReleaseStore> {
        &self.inner.releases
    }

    pub fn blobs(&self) -> &Arc<dyn BlobPort> {
        &self.inner.blobs
    }

    pub fn builder(&self) -> &ReleaseBuilder {
        &self.inner.builder
    }

    pub fn preview(&self) -> &PreviewService {
        &self.inner.preview
    }

    pub fn private_cache(&self) -> &PrivateRouteCache {
        &self.inner.private_cache
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }
}
