// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Ids, revisions, digests, image references and service names.

mod digest;
mod id;
mod image_ref;
mod revision;
mod service_name;

pub use digest::{Digest, DigestError};
pub use id::{ContainerId, Id, IdKind, RunId};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use revision::{Revision, RevisionError};
pub use service_name::{ServiceName, ServiceNameError};
