//! Entity kinds and the record shapes carried in `ReceiveEntityUpdate`.
//!
//! The kind tag is the only thing that identifies a record type on the wire.
//! Each tag maps to exactly one DTO below; adding a kind means adding a
//! variant, a struct and a `LiveEntity` impl, and the exhaustive matches on
//! both sides of the wire will point at every place that needs a new arm.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::id::{EntityId, ProjectId, UserId};

// ---------------------------------------------------------------------------
// Kind tags
// ---------------------------------------------------------------------------

/// Stable, language-independent tag for a category of live record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Project,
    Sprint,
    Story,
    Task,
    AcceptanceCriterion,
    Form,
    Answer,
    Worklog,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Project,
        EntityKind::Sprint,
        EntityKind::Story,
        EntityKind::Task,
        EntityKind::AcceptanceCriterion,
        EntityKind::Form,
        EntityKind::Answer,
        EntityKind::Worklog,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Project => "Project",
            EntityKind::Sprint => "Sprint",
            EntityKind::Story => "Story",
            EntityKind::Task => "Task",
            EntityKind::AcceptanceCriterion => "AcceptanceCriterion",
            EntityKind::Form => "Form",
            EntityKind::Answer => "Answer",
            EntityKind::Worklog => "Worklog",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record type that can travel in live-update envelopes.
///
/// `KIND` is the wire tag; it must be unique per type.
pub trait LiveEntity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;
}

// ---------------------------------------------------------------------------
// Record shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sprint {
    pub id: EntityId,
    pub project_id: ProjectId,
    pub goal: String,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: EntityId,
    pub project_id: ProjectId,
    #[serde(default)]
    pub sprint_id: Option<EntityId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub story_points: Option<i32>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: EntityId,
    pub story_id: EntityId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assignee_id: Option<UserId>,
    #[serde(default)]
    pub estimate_minutes: Option<i32>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub id: EntityId,
    pub story_id: EntityId,
    pub content: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub id: EntityId,
    pub project_id: ProjectId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: EntityId,
    pub form_id: EntityId,
    pub question_id: EntityId,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worklog {
    pub id: EntityId,
    pub task_id: EntityId,
    pub user_id: UserId,
    pub minutes: i32,
    #[serde(default)]
    pub comment: String,
}

impl LiveEntity for Project {
    const KIND: EntityKind = EntityKind::Project;
}

impl LiveEntity for Sprint {
    const KIND: EntityKind = EntityKind::Sprint;
}

impl LiveEntity for Story {
    const KIND: EntityKind = EntityKind::Story;
}

impl LiveEntity for Task {
    const KIND: EntityKind = EntityKind::Task;
}

impl LiveEntity for AcceptanceCriterion {
    const KIND: EntityKind = EntityKind::AcceptanceCriterion;
}

impl LiveEntity for Form {
    const KIND: EntityKind = EntityKind::Form;
}

impl LiveEntity for Answer {
    const KIND: EntityKind = EntityKind::Answer;
}

impl LiveEntity for Worklog {
    const KIND: EntityKind = EntityKind::Worklog;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_as_its_tag() {
        for kind in EntityKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(serde_json::from_str::<EntityKind>("\"Bug\"").is_err());
        assert!(serde_json::from_str::<EntityKind>("\"tasks\"").is_err());
    }

    #[test]
    fn kind_constants_are_unique() {
        let kinds = [
            Project::KIND,
            Sprint::KIND,
            Story::KIND,
            Task::KIND,
            AcceptanceCriterion::KIND,
            Form::KIND,
            Answer::KIND,
            Worklog::KIND,
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), EntityKind::ALL.len());
    }
}
