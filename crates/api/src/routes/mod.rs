pub mod content;
pub mod documents;
pub mod health;
pub mod preview;
pub mod publish;

use axum::Router;

use crate::state::AppState;

/// Assemble the full router with all route groups.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(documents::routes())
        .merge(publish::routes())
        .merge(preview::routes())
        .merge(content::routes())
        .with_state(state)
}
