//! The HTTP front end: assembles the middleware chain, then mounts the function gateway
//! behind a single dispatch route.

use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use runtime_syndication::Client as SyndicationClient;
use serde::Deserialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::gateway::FunctionGateway;
use crate::middleware::MiddlewareChain;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<FunctionGateway>,
    pub syndication: Arc<SyndicationClient>,
}

/// Builds the axum [`Router`]: CORS and the discovered/sorted middleware chain first,
/// then the gateway dispatch route, the functions-list introspection route, and the
/// syndication client/token-exchange routes.
pub fn build_router(gateway: Arc<FunctionGateway>, syndication: Arc<SyndicationClient>, middleware: MiddlewareChain) -> Router {
    let state = AppState { gateway, syndication };
    let router = Router::new()
        .route("/functions", axum::routing::get(list_functions))
        .route("/functions/:name", post(call_function))
        .route("/syndicate/clients", post(create_client))
        .route("/syndicate/token", post(exchange_token))
        .with_state(state)
        .layer(CorsLayer::permissive());
    middleware.assemble(router)
}

async fn list_functions(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.gateway.functions_list())
}

async fn call_function(State(state): State<AppState>, AxumPath(name): AxumPath<String>, Json(payload): Json<Value>) -> Json<Value> {
    match state.gateway.call(&name, payload).await {
        Ok(result) => Json(result),
        Err(err) => {
            warn!(function = %name, error = %err, "function call rejected");
            Json(serde_json::json!({ "error": err.to_string() }))
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateClientRequest {
    client_name: String,
    user: String,
}

async fn create_client(State(state): State<AppState>, Json(payload): Json<CreateClientRequest>) -> Json<Value> {
    match state.syndication.create(&payload.client_name, &payload.user).await {
        Ok(client) => Json(serde_json::json!({
            "objectId": client.object_id,
            "refreshToken": client.refresh_token,
        })),
        Err(err) => {
            warn!(client = %payload.client_name, error = %err, "syndication client registration rejected");
            Json(serde_json::json!({ "error": err.to_string() }))
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenExchangeRequest {
    refresh_token: String,
}

async fn exchange_token(State(state): State<AppState>, Json(payload): Json<TokenExchangeRequest>) -> Json<Value> {
    match state.syndication.token(&payload.refresh_token).await {
        Ok(access_token) => Json(serde_json::json!({ "accessToken": access_token })),
        Err(err) => {
            warn!(error = %err, "syndication token exchange rejected");
            Json(serde_json::json!({ "error": err.to_string() }))
        }
    }
}
