use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Requester,
    Expert,
    Dispatcher,
}

/// One registered participant, bound to the connection it registered on.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub role: Role,
    /// Only meaningful for experts; toggled explicitly and by the
    /// assignment workflow (false while serving an active session).
    pub available: bool,
    pub conn_id: Uuid,
}

#[derive(Default)]
pub struct Registry {
    users: HashMap<String, Identity>,
}

impl Registry {
    /// Registering an already-known id rebinds it to the new connection.
    pub fn register(&mut self, id: String, name: String, role: Role, conn_id: Uuid) {
        let available = role == Role::Expert;
        self.users.insert(
            id.clone(),
            Identity { id, name, role, available, conn_id },
        );
    }

    pub fn find(&self, id: &str) -> Option<&Identity> {
        self.users.get(id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Identity> {
        self.users.get_mut(id)
    }

    pub fn find_by_conn(&self, conn_id: Uuid) -> Option<&Identity> {
        self.users.values().find(|u| u.conn_id == conn_id)
    }

    pub fn find_by_conn_mut(&mut self, conn_id: Uuid) -> Option<&mut Identity> {
        self.users.values_mut().find(|u| u.conn_id == conn_id)
    }

    pub fn find_by_role(&self, role: Role) -> impl Iterator<Item = &Identity> {
        self.users.values().filter(move |u| u.role == role)
    }

    pub fn remove(&mut self, id: &str) -> Option<Identity> {
        self.users.remove(id)
    }
}
