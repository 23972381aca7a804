use axum::Router;

pub use ui::{JobsResponse, UiApi};
pub use vaas::{QueuedResponse, RelayedResponse, VaasApi};

mod ui;
mod vaas;

/// Relayer routes, served next to `/metrics`.
pub fn router(vaas: VaasApi, ui: UiApi) -> Router {
    Router::new().merge(vaas.router()).merge(ui.router())
}

#[cfg(test)]
async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
