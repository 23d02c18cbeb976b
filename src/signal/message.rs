use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::identity::{Identity, Role};
use super::workflow::{RoomAssignment, SessionRequest};

/// Relay payload tags. Routing never inspects the body; the tag exists so
/// clients can demultiplex chat, viewer sync, annotations and peer-connection
/// negotiation without the server caring which is which.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayTag {
    Chat,
    SyncState,
    Annotation,
    Offer,
    Answer,
    IceCandidate,
    ReportReady,
}

/// Everything a client may send over its socket.
#[derive(Debug, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    Register {
        id: String,
        name: String,
        role: Role,
    },
    SetAvailability {
        available: bool,
    },
    CreateSessionRequest {
        requester_id: String,
        requester_name: String,
    },
    AssignExpert {
        request_id: Uuid,
        expert_id: String,
        expert_name: String,
    },
    RespondToAssignment {
        assignment_id: Uuid,
        accept: bool,
        #[serde(default)]
        comment: Option<String>,
    },
    EndSession {
        request_id: Uuid,
    },
    JoinRoom {
        room_id: Uuid,
    },
    Relay {
        tag: RelayTag,
        body: Value,
    },
}

/// A room member as seen by other members. Falls back to the raw connection
/// id when the peer joined without registering.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub available: bool,
}

impl From<&Identity> for UserInfo {
    fn from(user: &Identity) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            available: user.available,
        }
    }
}

/// Everything the server may push to a client. Entities cross this boundary
/// as cloned snapshots only.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerSignal {
    SessionRequestCreated {
        request: SessionRequest,
    },
    SessionRequestUpdated {
        request: SessionRequest,
    },
    AssignmentInvite {
        assignment: RoomAssignment,
    },
    /// To the requester once the expert accepted: the room is ready.
    SessionReady {
        request_id: Uuid,
        room_id: Uuid,
        expert_name: String,
    },
    /// To the expert once they accepted: join this room.
    JoinRoom {
        room_id: Uuid,
    },
    /// To dispatchers, so they can re-assign.
    AssignmentRejected {
        request_id: Uuid,
        expert_name: String,
        comment: Option<String>,
    },
    SessionEnded {
        request_id: Uuid,
        reason: String,
    },
    PeerJoined {
        room_id: Uuid,
        peer: PeerInfo,
    },
    PeerLeft {
        room_id: Uuid,
        peer_id: String,
    },
    /// One-time courtesy to a joiner: who was already in the room.
    RoomSnapshot {
        room_id: Uuid,
        members: Vec<PeerInfo>,
    },
    Relay {
        tag: RelayTag,
        sender_id: String,
        body: Value,
    },
    UserListUpdate {
        requesters: Vec<UserInfo>,
        experts: Vec<UserInfo>,
    },
    SessionRequestsUpdate {
        list: Vec<SessionRequest>,
    },
}
