//! Room roles and the write gate.
//!
//! The server is authoritative: it rejects viewer edits on its own. The gate
//! only stops the client from sending frames that would be refused.

use serde::{Deserialize, Serialize};

/// A user's role in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomRole {
    Owner,
    Editor,
    Viewer,
}

/// What a role is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Permission {
    ReadOnly,
    Write,
    Admin,
}

impl RoomRole {
    pub fn permission(self) -> Permission {
        match self {
            RoomRole::Owner => Permission::Admin,
            RoomRole::Editor => Permission::Write,
            RoomRole::Viewer => Permission::ReadOnly,
        }
    }

    pub fn can_write(self) -> bool {
        self.permission() >= Permission::Write
    }

    pub fn can_invite(self) -> bool {
        self.can_write()
    }

    pub fn can_administer(self) -> bool {
        self.permission() == Permission::Admin
    }
}

/// Caches the last role the channel reported.
///
/// Every check reads the cached value, so a role change applies from the next
/// check on. With no role yet, writes are denied.
#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    role: Option<RoomRole>,
}

impl AccessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(&self) -> Option<RoomRole> {
        self.role
    }

    pub fn set_role(&mut self, role: RoomRole) {
        if self.role != Some(role) {
            log::info!("room role now {:?}", role);
        }
        self.role = Some(role);
    }

    pub fn reset(&mut self) {
        self.role = None;
    }

    pub fn can_write(&self) -> bool {
        self.role.is_some_and(RoomRole::can_write)
    }

    pub fn can_invite(&self) -> bool {
        self.role.is_some_and(RoomRole::can_invite)
    }

    pub fn can_administer(&self) -> bool {
        self.role.is_some_and(RoomRole::can_administer)
    }
}
