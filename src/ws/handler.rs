//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::collision::Point;
use crate::game::MatchInput;
use crate::lobby::{LobbyError, LobbyOutcome};
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, PlayerId, ServerMsg, Welcome};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let player_id = Uuid::new_v4();
    info!(player_id = %player_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome(Welcome {
        player_id,
        server_time: unix_millis(),
    });

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(player_id = %player_id, error = %e, "Failed to send welcome");
        return;
    }

    let outbound = state.hub.register(player_id);

    run_session(player_id, &state, ws_sink, ws_stream, outbound).await;

    // Cleanup on disconnect
    state.hub.unregister(player_id);
    let outcome = state.lobby.lock().disconnect(player_id);
    state.apply(outcome);

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    player_id: PlayerId,
    state: &AppState,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound: mpsc::Receiver<ServerMsg>,
) {
    // Writer task: hub queue -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> lobby / scheduler
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(client_msg) => dispatch(state, player_id, client_msg),
                Err(e) => {
                    warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Route one client message to the lobby or the match scheduler
pub fn dispatch(state: &AppState, player_id: PlayerId, msg: ClientMsg) {
    if let Some(claimed) = msg.claimed_player() {
        if claimed != player_id {
            warn!(
                player_id = %player_id,
                claimed = %claimed,
                "Message claims another player, ignoring"
            );
            return;
        }
    }

    let lobby_result: Result<LobbyOutcome, LobbyError> = match msg {
        ClientMsg::CreateGame(_) => state.lobby.lock().create_game(player_id),
        ClientMsg::CurrentGames => Ok(state.lobby.lock().current_games(player_id)),
        ClientMsg::RemoveGame(req) => state.lobby.lock().remove_game(req),
        ClientMsg::JoinGame(req) => state.lobby.lock().join_game(req),
        ClientMsg::PlayerReady(req) => state.lobby.lock().player_ready(req),
        ClientMsg::PlayerUnready(req) => state.lobby.lock().player_unready(req),
        ClientMsg::LeaveReadyRoom(req) => state.lobby.lock().leave_ready_room(req),

        ClientMsg::PlayerMovement(m) => {
            state.scheduler.input(
                m.game_id,
                MatchInput::Move {
                    player_id,
                    movement: m.movement,
                },
            );
            return;
        }
        ClientMsg::ShootProjectile(s) => {
            state.scheduler.input(
                s.game_id,
                MatchInput::Shoot {
                    player_id,
                    path: s.path,
                },
            );
            return;
        }
        ClientMsg::ProjectileCollision(c) => {
            state.scheduler.input(
                c.game_id,
                MatchInput::ProjectileCollision {
                    projectile1_id: c.projectile1_id,
                    projectile2_id: c.projectile2_id,
                    at: Point::new(c.x, c.y),
                },
            );
            return;
        }
        ClientMsg::RequestGameState(game_id) => {
            state.scheduler.resync(game_id);
            return;
        }
    };

    match lobby_result {
        Ok(outcome) => state.apply(outcome),
        Err(e) => debug!(player_id = %player_id, error = %e, "Lobby request rejected"),
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::game::GameRules;
    use crate::ws::protocol::GameRef;

    fn state() -> AppState {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "debug".to_string(),
            client_origin: "*".to_string(),
            tick_rate: 120,
            rules: GameRules::default(),
        };
        AppState::new(config).0
    }

    fn parse(json: &str) -> ClientMsg {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn create_game_from_wire() {
        let state = state();
        let me = Uuid::new_v4();
        let mut rx = state.hub.register(me);

        dispatch(
            &state,
            me,
            parse(&format!(r#"{{"event":"createGame","data":"{}"}}"#, me)),
        );

        assert!(matches!(rx.try_recv(), Ok(ServerMsg::GameCreated(_))));
        assert!(matches!(rx.try_recv(), Ok(ServerMsg::EnterReadyRoom(_))));
        assert_eq!(state.lobby.lock().len(), 1);
    }

    #[test]
    fn impersonation_is_ignored() {
        let state = state();
        let me = Uuid::new_v4();
        let victim = Uuid::new_v4();
        let mut rx = state.hub.register(me);

        dispatch(&state, me, ClientMsg::CreateGame(victim));

        assert!(rx.try_recv().is_err());
        assert!(state.lobby.lock().is_empty());
    }

    #[test]
    fn rejected_request_sends_nothing() {
        let state = state();
        let me = Uuid::new_v4();
        let mut rx = state.hub.register(me);

        dispatch(
            &state,
            me,
            ClientMsg::JoinGame(GameRef {
                game_id: Uuid::new_v4(),
                player_id: me,
            }),
        );

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn current_games_replies_to_sender() {
        let state = state();
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut rx_me = state.hub.register(me);
        let mut rx_other = state.hub.register(other);

        dispatch(&state, me, parse(r#"{"event":"currentGames"}"#));

        assert!(matches!(rx_me.try_recv(), Ok(ServerMsg::CurrentGames(_))));
        assert!(rx_other.try_recv().is_err());
    }
}
