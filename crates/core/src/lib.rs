//! Pressroom core: the publish/release subsystem of a headless CMS.
//!
//! Editors write documents and revisions; a publish snapshots every
//! document into an immutable, content-addressed release, and a single
//! active-release pointer decides what readers see. All storage goes
//! through backend-agnostic ports so the same semantics hold on the
//! in-memory, key-value and PostgreSQL backends.

pub mod blocks;
pub mod cache;
pub mod document;
pub mod error;
pub mod events;
pub mod preview;
pub mod release;
pub mod store;

pub use error::CoreError;
