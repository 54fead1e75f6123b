// ABOUTME: Identifiers tagged with what they identify, so a run id never stands in for a container id.
// ABOUTME: Serialized as plain strings in run records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// What an [`Id`] refers to.
pub trait IdKind {
    const NAME: &'static str;
}

/// A container on the remote host, as the container runtime reports it.
pub enum Container {}

/// One pipeline run on this machine.
pub enum Run {}

impl IdKind for Container {
    const NAME: &'static str = "ContainerId";
}

impl IdKind for Run {
    const NAME: &'static str = "RunId";
}

/// ```compile_fail
/// use hoist::types::{ContainerId, RunId};
///
/// fn stop(_id: &ContainerId) {}
///
/// let run = RunId::new("20261017T120000Z-abc123");
/// stop(&run);
/// ```
#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct Id<K> {
    value: String,
    #[serde(skip)]
    kind: PhantomData<K>,
}

pub type ContainerId = Id<Container>;
pub type RunId = Id<Run>;

impl<K> Id<K> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

impl ContainerId {
    /// The 12-character prefix container CLIs print.
    pub fn short(&self) -> &str {
        self.value.get(..12).unwrap_or(&self.value)
    }
}

// The derives would demand the same traits of `K`, which is never instantiated.

impl<K> Clone for Id<K> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<K> PartialEq for Id<K> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<K> Eq for Id<K> {}

impl<K> Hash for Id<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<K: IdKind> fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", K::NAME, self.value)
    }
}

impl<K> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}
