//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins(&state.config.client_origin))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// `*` allows any origin, otherwise a comma separated list
fn allowed_origins(origins: &str) -> AllowOrigin {
    if origins.trim() == "*" {
        return AllowOrigin::any();
    }

    let list: Vec<HeaderValue> = origins
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    AllowOrigin::list(list)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    connections: usize,
    lobby_games: usize,
    active_matches: usize,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let lobby_games = state.lobby.lock().len();

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        connections: state.hub.connection_count(),
        lobby_games,
        active_matches: state.scheduler.active_matches(),
        active_players: state.scheduler.active_players(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::game::GameRules;
    use uuid::Uuid;

    #[tokio::test]
    async fn health_reports_counts() {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "debug".to_string(),
            client_origin: "*".to_string(),
            tick_rate: 120,
            rules: GameRules::default(),
        };
        let (state, _scheduler) = AppState::new(config);
        let a = Uuid::new_v4();
        let _rx = state.hub.register(a);
        state.lobby.lock().create_game(a).unwrap();

        let Json(health) = health_handler(State(state)).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.connections, 1);
        assert_eq!(health.lobby_games, 1);
        assert_eq!(health.active_matches, 0);
    }
}
