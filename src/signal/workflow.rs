use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Assigned,
    Active,
    /// Present in the wire vocabulary; a rejected invitation reverts the
    /// request to `Pending`, so only assignments are ever observed rejected.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Pending,
    Accepted,
    Rejected,
}

/// One requester's need for an expert-paired session. Lives from
/// `create-session-request` until the session ends or a party disconnects;
/// terminal requests are removed from the table, never parked.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub id: Uuid,
    pub requester_id: String,
    pub requester_name: String,
    pub status: RequestStatus,
    pub assigned_expert_id: Option<String>,
    pub assigned_expert_name: Option<String>,
    /// Allocated at creation, unique for the process lifetime, never reused.
    pub room_id: Uuid,
    pub created_at: u64,
    pub rejection_comment: Option<String>,
}

impl SessionRequest {
    pub fn new(requester_id: String, requester_name: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            requester_id,
            requester_name,
            status: RequestStatus::Pending,
            assigned_expert_id: None,
            assigned_expert_name: None,
            room_id: Uuid::now_v7(),
            created_at: unix_millis(),
            rejection_comment: None,
        }
    }

    /// Revert to an unassigned pending request after a rejected invitation.
    pub fn clear_assignment(&mut self) {
        self.status = RequestStatus::Pending;
        self.assigned_expert_id = None;
        self.assigned_expert_name = None;
    }
}

/// One invitation pairing an expert with a session request's room.
/// Rejected assignments are terminal and removed; a re-assign of the same
/// request creates a fresh one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomAssignment {
    pub id: Uuid,
    pub room_id: Uuid,
    pub requester_id: String,
    pub requester_name: String,
    pub expert_id: String,
    pub status: AssignmentStatus,
    pub rejection_comment: Option<String>,
}

impl RoomAssignment {
    pub fn new(request: &SessionRequest, expert_id: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            room_id: request.room_id,
            requester_id: request.requester_id.clone(),
            requester_name: request.requester_name.clone(),
            expert_id,
            status: AssignmentStatus::Pending,
            rejection_comment: None,
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
