//! Delivery scopes and the channel names they resolve to.

use std::fmt;

use crate::id::{ProjectId, UserId};

/// Where a notification is delivered: every connection joined to a project,
/// or every connection belonging to one user.
///
/// Always passed explicitly by the publisher; never inferred from whichever
/// connection happens to be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Project(ProjectId),
    User(UserId),
}

impl Scope {
    /// The channel name this scope is delivered through
    /// (`project:<id>` or `user:<id>`).
    pub fn channel(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Project(id) => write!(f, "project:{id}"),
            Scope::User(id) => write!(f, "user:{id}"),
        }
    }
}
