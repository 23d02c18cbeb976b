use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::identity::{Registry, Role};
use super::message::{ClientMessage, PeerInfo, RelayTag, ServerSignal, UserInfo};
use super::workflow::{AssignmentStatus, RequestStatus, RoomAssignment, SessionRequest};

/// Single owner of all coordination state. The socket layer decodes frames
/// and hands them in one at a time; every mutation happens under the one
/// lock, so workflow transitions are serialized and never observe each other
/// half-applied.
pub struct SignalHub {
    state: Mutex<CoreState>,
}

#[derive(Default)]
struct CoreState {
    registry: Registry,
    conns: HashMap<Uuid, mpsc::UnboundedSender<ServerSignal>>,
    requests: HashMap<Uuid, SessionRequest>,
    assignments: HashMap<Uuid, RoomAssignment>,
    rooms: HashMap<Uuid, HashSet<Uuid>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub rooms: usize,
    pub requests: usize,
}

impl SignalHub {
    pub fn new() -> Self {
        Self { state: Mutex::new(CoreState::default()) }
    }

    fn core(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap()
    }

    /// Attach a new connection; `tx` is drained by that connection's socket
    /// writer task.
    pub fn connect(&self, tx: mpsc::UnboundedSender<ServerSignal>) -> Uuid {
        let conn_id = Uuid::now_v7();
        self.core().conns.insert(conn_id, tx);
        conn_id
    }

    pub fn handle_message(&self, conn_id: Uuid, msg: ClientMessage) {
        let mut core = self.core();
        match msg {
            ClientMessage::Register { id, name, role } => {
                core.register(conn_id, id, name, role);
            }
            ClientMessage::SetAvailability { available } => {
                core.set_availability(conn_id, available);
            }
            ClientMessage::CreateSessionRequest { requester_id, requester_name } => {
                core.create_request(conn_id, requester_id, requester_name);
            }
            ClientMessage::AssignExpert { request_id, expert_id, expert_name } => {
                core.assign_expert(request_id, expert_id, expert_name);
            }
            ClientMessage::RespondToAssignment { assignment_id, accept, comment } => {
                core.respond_to_assignment(assignment_id, accept, comment);
            }
            ClientMessage::EndSession { request_id } => {
                core.end_session(request_id, "session ended");
            }
            ClientMessage::JoinRoom { room_id } => {
                core.join_room(conn_id, room_id);
            }
            ClientMessage::Relay { tag, body } => {
                core.relay(conn_id, tag, body);
            }
        }
    }

    /// Full cleanup for a lost connection; safe to call for connections that
    /// never registered or participated in anything.
    pub fn disconnect(&self, conn_id: Uuid) {
        self.core().disconnect(conn_id);
    }

    pub fn stats(&self) -> HubStats {
        let core = self.core();
        HubStats {
            connections: core.conns.len(),
            rooms: core.rooms.len(),
            requests: core.requests.len(),
        }
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreState {
    fn register(&mut self, conn_id: Uuid, id: String, name: String, role: Role) {
        debug!(%id, ?role, "participant registered");
        self.registry.register(id, name, role, conn_id);
        self.push_presence();
        self.push_requests();
    }

    fn set_availability(&mut self, conn_id: Uuid, available: bool) {
        // A toggle can race a disconnect; stale ones are dropped, not fatal.
        let Some(user) = self.registry.find_by_conn_mut(conn_id) else {
            debug!(%conn_id, "availability toggle from unregistered connection, ignoring");
            return;
        };
        if user.role != Role::Expert {
            debug!(id = %user.id, "availability is only meaningful for experts, ignoring");
            return;
        }
        user.available = available;
        self.push_presence();
    }

    fn create_request(&mut self, conn_id: Uuid, requester_id: String, requester_name: String) {
        // The table only holds live requests, so any hit means a duplicate.
        if self.requests.values().any(|r| r.requester_id == requester_id) {
            debug!(%requester_id, "requester already has a live session request, ignoring");
            return;
        }
        let request = SessionRequest::new(requester_id, requester_name);
        self.send_to_conn(conn_id, &ServerSignal::SessionRequestCreated { request: request.clone() });
        self.requests.insert(request.id, request);
        self.push_requests();
    }

    fn assign_expert(&mut self, request_id: Uuid, expert_id: String, expert_name: String) {
        // Availability is not rechecked: the dispatcher's view may be stale
        // and the expert can still decline.
        let Some(expert_conn) = self.registry.find(&expert_id).map(|e| e.conn_id) else {
            debug!(%expert_id, "assign-expert targets an unknown expert, ignoring");
            return;
        };
        let (assignment, requester_id, snapshot) = {
            let Some(request) = self.requests.get_mut(&request_id) else {
                debug!(%request_id, "assign-expert targets an unknown request, ignoring");
                return;
            };
            if request.status == RequestStatus::Active {
                debug!(%request_id, "request already active, ignoring assign");
                return;
            }
            request.status = RequestStatus::Assigned;
            request.assigned_expert_id = Some(expert_id.clone());
            request.assigned_expert_name = Some(expert_name);
            (
                RoomAssignment::new(request, expert_id),
                request.requester_id.clone(),
                request.clone(),
            )
        };
        // A re-assign before the first invite is answered supersedes it; the
        // superseded expert gets no retraction notice.
        self.assignments
            .retain(|_, a| !(a.room_id == assignment.room_id && a.status == AssignmentStatus::Pending));
        self.send_to_conn(expert_conn, &ServerSignal::AssignmentInvite { assignment: assignment.clone() });
        self.send_to_identity(&requester_id, &ServerSignal::SessionRequestUpdated { request: snapshot });
        self.assignments.insert(assignment.id, assignment);
        self.push_requests();
    }

    fn respond_to_assignment(&mut self, assignment_id: Uuid, accept: bool, comment: Option<String>) {
        let (room_id, expert_id) = {
            let Some(assignment) = self.assignments.get_mut(&assignment_id) else {
                debug!(%assignment_id, "response to an unknown assignment, ignoring");
                return;
            };
            if assignment.status != AssignmentStatus::Pending {
                debug!(%assignment_id, "assignment already resolved, ignoring response");
                return;
            }
            assignment.status = if accept { AssignmentStatus::Accepted } else { AssignmentStatus::Rejected };
            assignment.rejection_comment = if accept { None } else { comment.clone() };
            (assignment.room_id, assignment.expert_id.clone())
        };
        if accept {
            self.accept_assignment(room_id, &expert_id);
        } else {
            self.reject_assignment(room_id, comment);
        }
        self.push_presence();
        self.push_requests();
    }

    fn accept_assignment(&mut self, room_id: Uuid, expert_id: &str) {
        let Some((request_id, requester_id, expert_name)) = self
            .requests
            .values_mut()
            .find(|r| r.room_id == room_id)
            .map(|request| {
                request.status = RequestStatus::Active;
                (
                    request.id,
                    request.requester_id.clone(),
                    request.assigned_expert_name.clone().unwrap_or_default(),
                )
            })
        else {
            debug!(%room_id, "accepted assignment has no owning request, ignoring");
            return;
        };
        if let Some(expert) = self.registry.find_mut(expert_id) {
            expert.available = false;
        }
        self.send_to_identity(
            &requester_id,
            &ServerSignal::SessionReady { request_id, room_id, expert_name },
        );
        self.send_to_identity(expert_id, &ServerSignal::JoinRoom { room_id });
    }

    fn reject_assignment(&mut self, room_id: Uuid, comment: Option<String>) {
        let Some((request_id, requester_id, expert_name, snapshot)) = self
            .requests
            .values_mut()
            .find(|r| r.room_id == room_id)
            .map(|request| {
                let expert_name = request.assigned_expert_name.clone().unwrap_or_default();
                request.clear_assignment();
                request.rejection_comment = comment.clone();
                (request.id, request.requester_id.clone(), expert_name, request.clone())
            })
        else {
            debug!(%room_id, "rejected assignment has no owning request, ignoring");
            return;
        };
        self.push_to_dispatchers(&ServerSignal::AssignmentRejected { request_id, expert_name, comment });
        self.send_to_identity(&requester_id, &ServerSignal::SessionRequestUpdated { request: snapshot });
    }

    /// Idempotent: ending an already-gone request is a silent no-op, so an
    /// explicit end racing disconnect cleanup cannot double-notify.
    fn end_session(&mut self, request_id: Uuid, reason: &str) {
        let Some(request) = self.requests.remove(&request_id) else {
            debug!(%request_id, "end-session for unknown request, ignoring");
            return;
        };
        self.assignments.retain(|_, a| a.room_id != request.room_id);
        self.rooms.remove(&request.room_id);
        if let Some(expert_id) = &request.assigned_expert_id {
            if let Some(expert) = self.registry.find_mut(expert_id) {
                expert.available = true;
            }
        }
        let signal = ServerSignal::SessionEnded { request_id, reason: reason.to_owned() };
        self.send_to_identity(&request.requester_id, &signal);
        if let Some(expert_id) = &request.assigned_expert_id {
            self.send_to_identity(expert_id, &signal);
        }
        self.push_presence();
        self.push_requests();
    }

    /// Membership is claimed, not authorized; the relay only tracks who is
    /// in the room.
    fn join_room(&mut self, conn_id: Uuid, room_id: Uuid) {
        let members = self.rooms.entry(room_id).or_default();
        if !members.insert(conn_id) {
            debug!(%conn_id, %room_id, "connection already joined this room, ignoring");
            return;
        }
        let others: Vec<Uuid> = members.iter().copied().filter(|&c| c != conn_id).collect();
        let joiner = self.peer_info(conn_id);
        for &other in &others {
            self.send_to_conn(other, &ServerSignal::PeerJoined { room_id, peer: joiner.clone() });
        }
        let snapshot = others.iter().map(|&c| self.peer_info(c)).collect();
        self.send_to_conn(conn_id, &ServerSignal::RoomSnapshot { room_id, members: snapshot });
    }

    /// Verbatim fan-out to the other members of the sender's room. Never
    /// echoes to the sender, never leaves the room.
    fn relay(&self, conn_id: Uuid, tag: RelayTag, body: Value) {
        let Some((room_id, members)) = self
            .rooms
            .iter()
            .find(|(_, members)| members.contains(&conn_id))
            .map(|(id, members)| (*id, members.clone()))
        else {
            debug!(%conn_id, "relay from a connection outside any room, ignoring");
            return;
        };
        let signal = ServerSignal::Relay { tag, sender_id: self.peer_info(conn_id).id, body };
        debug!(%room_id, ?tag, recipients = members.len() - 1, "relaying payload");
        for member in members {
            if member != conn_id {
                self.send_to_conn(member, &signal);
            }
        }
    }

    fn disconnect(&mut self, conn_id: Uuid) {
        self.conns.remove(&conn_id);
        let identity = self.registry.find_by_conn(conn_id).map(|u| u.id.clone());
        if let Some(id) = &identity {
            debug!(%id, "participant disconnected");
            self.registry.remove(id);
            let as_requester: Vec<Uuid> = self
                .requests
                .values()
                .filter(|r| r.requester_id == *id)
                .map(|r| r.id)
                .collect();
            for request_id in as_requester {
                self.end_session(request_id, "requester disconnected");
            }
            let as_expert: Vec<Uuid> = self
                .requests
                .values()
                .filter(|r| r.assigned_expert_id.as_deref() == Some(id))
                .map(|r| r.id)
                .collect();
            for request_id in as_expert {
                self.end_session(request_id, "expert disconnected");
            }
        }
        let peer_id = identity.clone().unwrap_or_else(|| conn_id.to_string());
        let mut notify = Vec::new();
        self.rooms.retain(|&room_id, members| {
            if members.remove(&conn_id) && !members.is_empty() {
                notify.extend(members.iter().map(|&m| (m, room_id)));
            }
            !members.is_empty()
        });
        for (member, room_id) in notify {
            self.send_to_conn(member, &ServerSignal::PeerLeft { room_id, peer_id: peer_id.clone() });
        }
        if identity.is_some() {
            self.push_presence();
            self.push_requests();
        }
    }

    fn peer_info(&self, conn_id: Uuid) -> PeerInfo {
        match self.registry.find_by_conn(conn_id) {
            Some(user) => PeerInfo { id: user.id.clone(), name: user.name.clone() },
            None => PeerInfo { id: conn_id.to_string(), name: String::new() },
        }
    }

    fn send_to_conn(&self, conn_id: Uuid, signal: &ServerSignal) {
        let Some(tx) = self.conns.get(&conn_id) else {
            return;
        };
        if tx.send(signal.clone()).is_err() {
            warn!(%conn_id, "outbound channel closed, dropping signal");
        }
    }

    fn send_to_identity(&self, id: &str, signal: &ServerSignal) {
        match self.registry.find(id) {
            Some(user) => self.send_to_conn(user.conn_id, signal),
            None => debug!(%id, "no live connection for identity, dropping signal"),
        }
    }

    fn push_to_dispatchers(&self, signal: &ServerSignal) {
        for dispatcher in self.registry.find_by_role(Role::Dispatcher) {
            self.send_to_conn(dispatcher.conn_id, signal);
        }
    }

    fn push_presence(&self) {
        let (requesters, experts) = presence_projection(&self.registry);
        self.push_to_dispatchers(&ServerSignal::UserListUpdate { requesters, experts });
    }

    fn push_requests(&self) {
        let list = request_projection(&self.requests);
        self.push_to_dispatchers(&ServerSignal::SessionRequestsUpdate { list });
    }
}

/// Pure projection of the registry into the dispatcher presence lists;
/// recomputed on demand rather than incrementally maintained.
fn presence_projection(registry: &Registry) -> (Vec<UserInfo>, Vec<UserInfo>) {
    let mut requesters: Vec<UserInfo> =
        registry.find_by_role(Role::Requester).map(UserInfo::from).collect();
    let mut experts: Vec<UserInfo> =
        registry.find_by_role(Role::Expert).map(UserInfo::from).collect();
    requesters.sort_by(|a, b| a.id.cmp(&b.id));
    experts.sort_by(|a, b| a.id.cmp(&b.id));
    (requesters, experts)
}

/// Pure projection of the live session-request table, oldest first.
fn request_projection(requests: &HashMap<Uuid, SessionRequest>) -> Vec<SessionRequest> {
    let mut list: Vec<SessionRequest> = requests.values().cloned().collect();
    list.sort_by_key(|r| (r.created_at, r.id));
    list
}
