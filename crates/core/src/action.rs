use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Action name checked against the fact store (e.g. "read", "manage_members").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(Cow<'static, str>);

impl Action {
    pub const READ: Action = Action(Cow::Borrowed("read"));
    pub const DELETE: Action = Action(Cow::Borrowed("delete"));
    pub const VIEW_MEMBERS: Action = Action(Cow::Borrowed("view_members"));
    pub const MANAGE_MEMBERS: Action = Action(Cow::Borrowed("manage_members"));
    pub const CREATE_REPOSITORIES: Action = Action(Cow::Borrowed("create_repositories"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
