mod caller;
mod context;
mod docs;
mod errors;
mod lobbies;
mod race;
mod schemas;
mod serialized;
mod sse;

use std::{
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use axum::routing::get;
use log::{info, warn};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use typerace_collab::Collab;

pub use context::ServerContext;
pub use errors::{ServerError, ServerResult};
pub use sse::{ServerEvent, ServerSentEvents};

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

/// Starts the typerace server, and forwards collab events to its subscribers
pub async fn run_server(collab: Collab, port: u16) -> std::io::Result<()> {
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let sse = ServerSentEvents::new();
    match collab.take_events() {
        Some(events) => {
            tokio::spawn(sse::forward_events(events, sse.clone()));
        }
        None => warn!("Collab events were already taken, live views won't update"),
    }

    let context = ServerContext {
        collab: Arc::new(collab),
        sse,
    };

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, router().with_state(context)).await
}

/// Every route of the server, without state
pub fn router() -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .nest("/sessions", caller::router())
        .nest("/lobbies", lobbies::router());

    Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(cors)
}
