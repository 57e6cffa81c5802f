use crate::handlers::{admin, investment, market, order};
use crate::state::AppState;
use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/orders", post(order::create_order).get(order::list_my_orders))
        .route("/orders/{id}", delete(order::cancel_order))
        .route("/assets/{id}/book", get(market::get_order_book))
        .route("/assets/{id}/depth", get(market::get_depth))
        .route("/assets/{id}/trades", get(market::get_recent_trades))
        .route("/investments", post(investment::create_investment));

    let admin_routes = Router::new()
        .route("/reconciliation", get(admin::reconciliation_cases))
        .route("/treasuries/{id}/reconcile", post(admin::reconcile_treasury))
        .route("/orders/expire", post(admin::expire_orders));

    Router::new()
        .nest("/v1", api_routes)
        .nest("/admin", admin_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
