//! WebSocket protocol message definitions
//! These are the wire types for client-server communication.
//!
//! Every frame is a JSON object `{"event": "<name>", "data": <payload>}`.
//! Events without a payload omit `data`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::collision::Point;
use crate::game::maps::GameMap;

/// Connection identity; doubles as the player id in every payload
pub type PlayerId = Uuid;

/// Lobby record id; the promoted match keeps the same id
pub type GameId = Uuid;

/// Ready flag per player, present once the ready room is full
pub type ReadyMap = BTreeMap<PlayerId, bool>;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Open a new lobby game owned by the sender
    CreateGame(PlayerId),
    /// Ask for the current lobby listing
    CurrentGames,
    RemoveGame(GameRef),
    JoinGame(GameRef),
    PlayerReady(GameRef),
    PlayerUnready(GameRef),
    LeaveReadyRoom(GameRef),
    /// Movement intent for one input frame
    PlayerMovement(PlayerMovement),
    /// Ink path drawn by the client, already resampled
    ShootProjectile(ShootProjectile),
    /// Client-detected projectile vs projectile collision
    ProjectileCollision(ProjectileCollision),
    /// Explicit resync of map and state
    RequestGameState(GameId),
}

/// `{gameId, playerId}` payload shared by the lobby and ready-room events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRef {
    pub game_id: GameId,
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMovement {
    pub game_id: GameId,
    pub player_id: PlayerId,
    /// Direction with each axis in [-1, 1]
    pub movement: Point,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShootProjectile {
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub path: Vec<Point>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileCollision {
    pub game_id: GameId,
    pub projectile1_id: Uuid,
    pub projectile2_id: Uuid,
    pub x: f32,
    pub y: f32,
}

impl ClientMsg {
    /// Player id the message claims to act for, if any
    pub fn claimed_player(&self) -> Option<PlayerId> {
        match self {
            ClientMsg::CreateGame(player_id) => Some(*player_id),
            ClientMsg::RemoveGame(r)
            | ClientMsg::JoinGame(r)
            | ClientMsg::PlayerReady(r)
            | ClientMsg::PlayerUnready(r)
            | ClientMsg::LeaveReadyRoom(r) => Some(r.player_id),
            ClientMsg::PlayerMovement(m) => Some(m.player_id),
            ClientMsg::ShootProjectile(s) => Some(s.player_id),
            ClientMsg::CurrentGames
            | ClientMsg::ProjectileCollision(_)
            | ClientMsg::RequestGameState(_) => None,
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMsg {
    /// First frame on every connection
    Welcome(Welcome),

    // Lobby
    GameCreated(LobbyGame),
    CurrentGames(BTreeMap<GameId, LobbyGame>),
    GameRemoved(GameId),
    GameJoined(LobbyGame),
    EnterReadyRoom(LobbyGame),

    // Ready room
    ReadyStateUpdated(ReadyMap),
    StartGame(LobbyGame),
    ReadyRoomAborted,

    // Match
    GameState(GameSnapshot),
    NewProjectile(ProjectileView),
    PlayerHit(PlayerHit),
    InvincibilityEnded(Option<PlayerId>),
    PointScored,
    RoundEnded(RoundEnded),
    MapSelected(MapSelected),
    MatchEnded(MatchEnded),
    PlayerDisconnected(PlayerId),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub player_id: PlayerId,
    pub server_time: u64,
}

/// Pre-match lobby record, sent verbatim to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyGame {
    pub id: GameId,
    pub creator: PlayerId,
    /// Join order; index is the slot
    pub players: Vec<PlayerId>,
    pub started: bool,
    pub ready: ReadyMap,
}

/// Player state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub lives: u32,
    pub score: u32,
    pub is_second_player: bool,
    pub is_invincible: bool,
}

/// Projectile state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileView {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
    #[serde(rename = "shooter_id")]
    pub shooter_id: PlayerId,
    pub is_second_player: bool,
}

/// Full match state, broadcast every tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameSnapshot {
    pub players: Vec<PlayerView>,
    pub projectiles: Vec<ProjectileView>,
    pub explosions: Vec<Point>,
    pub round: u32,
    pub map: GameMap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerHit {
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundEnded {
    pub round: u32,
    pub next_round: u32,
    pub map: GameMap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapSelected {
    pub round: u32,
    pub map: GameMap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEnded {
    pub total_rounds: u32,
    pub winner_id: Option<PlayerId>,
    pub scores: Vec<ScoreEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreEntry {
    pub id: PlayerId,
    pub score: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_bare_payload_event() {
        let id = Uuid::new_v4();
        let raw = json!({ "event": "createGame", "data": id }).to_string();
        let msg: ClientMsg = serde_json::from_str(&raw).unwrap();
        assert!(matches!(msg, ClientMsg::CreateGame(p) if p == id));
    }

    #[test]
    fn decodes_event_without_payload() {
        let msg: ClientMsg = serde_json::from_str(r#"{"event":"currentGames"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::CurrentGames));
    }

    #[test]
    fn decodes_camel_case_fields() {
        let game_id = Uuid::new_v4();
        let raw = json!({
            "event": "projectileCollision",
            "data": {
                "gameId": game_id,
                "projectile1Id": Uuid::new_v4(),
                "projectile2Id": Uuid::new_v4(),
                "x": 10.0,
                "y": 20.0
            }
        })
        .to_string();
        let msg: ClientMsg = serde_json::from_str(&raw).unwrap();
        match msg {
            ClientMsg::ProjectileCollision(c) => {
                assert_eq!(c.game_id, game_id);
                assert_eq!(c.x, 10.0);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_event() {
        let result = serde_json::from_str::<ClientMsg>(r#"{"event":"launchNukes","data":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn claimed_player_reads_payload() {
        let player_id = Uuid::new_v4();
        let msg = ClientMsg::PlayerReady(GameRef {
            game_id: Uuid::new_v4(),
            player_id,
        });
        assert_eq!(msg.claimed_player(), Some(player_id));
        assert_eq!(ClientMsg::CurrentGames.claimed_player(), None);
    }

    #[test]
    fn encodes_server_events() {
        let value = serde_json::to_value(ServerMsg::ReadyRoomAborted).unwrap();
        assert_eq!(value, json!({ "event": "readyRoomAborted" }));

        let player_id = Uuid::new_v4();
        let value = serde_json::to_value(ServerMsg::PlayerHit(PlayerHit { player_id })).unwrap();
        assert_eq!(
            value,
            json!({ "event": "playerHit", "data": { "playerId": player_id } })
        );
    }

    #[test]
    fn projectile_view_keeps_shooter_field_name() {
        let view = ProjectileView {
            id: Uuid::nil(),
            x: 1.0,
            y: 2.0,
            shooter_id: Uuid::nil(),
            is_second_player: true,
        };
        let value = serde_json::to_value(view).unwrap();
        assert!(value.get("shooter_id").is_some());
        assert_eq!(value["isSecondPlayer"], json!(true));
    }
}
