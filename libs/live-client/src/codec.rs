//! Entity-kind → decoder table.
//!
//! The match below is exhaustive over `EntityKind`, so every kind the wire
//! can carry has exactly one decoder, fixed at compile time.

use std::any::Any;
use std::sync::Arc;

use live_common::entity::{
    AcceptanceCriterion, Answer, Form, Project, Sprint, Story, Task, Worklog,
};
use live_common::{EntityKind, LiveEntity};

/// A decoded entity value, shared by every callback of one dispatch.
pub type DecodedValue = Arc<dyn Any + Send + Sync>;

pub type DecodeFn = fn(&str) -> Result<DecodedValue, serde_json::Error>;

fn decode<T: LiveEntity>(raw: &str) -> Result<DecodedValue, serde_json::Error> {
    Ok(Arc::new(serde_json::from_str::<T>(raw)?))
}

pub fn decoder_for(kind: EntityKind) -> DecodeFn {
    match kind {
        EntityKind::Project => decode::<Project>,
        EntityKind::Sprint => decode::<Sprint>,
        EntityKind::Story => decode::<Story>,
        EntityKind::Task => decode::<Task>,
        EntityKind::AcceptanceCriterion => decode::<AcceptanceCriterion>,
        EntityKind::Form => decode::<Form>,
        EntityKind::Answer => decode::<Answer>,
        EntityKind::Worklog => decode::<Worklog>,
    }
}
