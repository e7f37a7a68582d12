//! Order API Module
//!
//! Every mutation goes through OrdersManager; reads are tenant-scoped so an
//! order of another restaurant looks exactly like a missing one.
//!
//! | Path | Method | Operation | Role |
//! |------|--------|-----------|------|
//! | /api/orders | POST | intake create | any |
//! | /api/orders/escalated | GET | manager dashboard | any |
//! | /api/orders/pending | GET | waiter list (`?responsible=`) | any |
//! | /api/orders/{id} | GET | read one | any |
//! | /api/orders/{id}/transitions | POST | lifecycle action | any |
//! | /api/orders/{id}/reassign | POST | reassignment | manager |
//! | /api/orders/{id}/payment | POST | payment flag | manager, system |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

/// Order router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(handler::create))
        .route("/escalated", get(handler::escalated))
        .route("/pending", get(handler::pending))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/transitions", post(handler::transition))
        .route("/{id}/reassign", post(handler::reassign))
        .route("/{id}/payment", post(handler::set_payment))
}
