//! Client-side apply patches
//!
//! Reproduces the `kubectl apply` contract: the last applied configuration is
//! stored in an annotation and every update is a three-way patch between that
//! annotation, the new desired document and the live object.

pub mod last_applied;
pub mod strategy;
mod three_way;

use serde_json::Value;

pub use last_applied::{modified_configuration, original_configuration, LAST_APPLIED_ANNOTATION};
pub use strategy::{strategy_for, PatchStrategy};
pub use three_way::three_way_patch;

/// Patch body tagged with the content type the server must receive
#[derive(Clone, Debug, PartialEq)]
pub enum PatchDocument {
    /// `application/strategic-merge-patch+json`
    Strategic(Value),
    /// `application/merge-patch+json`
    Merge(Value),
}

impl PatchDocument {
    pub fn body(&self) -> &Value {
        match self {
            PatchDocument::Strategic(body) | PatchDocument::Merge(body) => body,
        }
    }

    pub fn into_body(self) -> Value {
        match self {
            PatchDocument::Strategic(body) | PatchDocument::Merge(body) => body,
        }
    }

    /// True when sending the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.body().as_object().is_some_and(|m| m.is_empty())
    }
}
