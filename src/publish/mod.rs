// ABOUTME: Registry publishing: push a built artifact so the remote host can pull it.
// ABOUTME: Idempotent per digest, lazily authenticated, retried by the sequencer.

mod cli;
mod publisher;
mod registry;

pub use cli::CliRegistry;
pub use publisher::{PublishedRef, Publisher};
pub use registry::{Credentials, PublishError, Registry};
