pub mod caller;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use crate::engine::Engine;
use crate::observability::track_http;

pub use caller::{Caller, Role};
pub use error::{ApiError, ApiResult};

/// Every HTTP route, sharing one engine.
pub fn create_router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/professionals/:id/available-slots",
            get(handlers::available_slots),
        )
        .route(
            "/professionals/:id/schedule",
            get(handlers::get_schedule).put(handlers::put_schedule),
        )
        .route(
            "/appointments",
            get(handlers::list_appointments).post(handlers::create_appointment),
        )
        .route(
            "/appointments/:id",
            get(handlers::get_appointment).delete(handlers::cancel_appointment),
        )
        .route(
            "/availability",
            get(handlers::list_availability)
                .post(handlers::create_availability)
                .delete(handlers::delete_availability),
        )
        .route_layer(middleware::from_fn(track_http))
        .with_state(engine)
}
