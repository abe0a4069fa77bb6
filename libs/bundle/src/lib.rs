//! # stepchain-bundle
//!
//! Turns a deployment definition into a bundle: an ordered, hash-identified
//! sequence of raw ledger operations.
//!
//! ```text
//! DeploymentDefinition --resolve--> Vec<RawOperation> --Bundle::new--> Bundle
//!                                                                     ├── hash (approval / display)
//!                                                                     └── chain fingerprints (execution)
//! ```
//!
//! # Invariants
//!
//! - Resolution is a pure function of (definition, coordinator address, artifacts)
//! - Identical operation sequences always produce identical bundle hashes and
//!   fingerprint chains
//! - `fingerprint(i)` commits to every operation in `[0..=i]`

mod artifact;
mod chain;
mod definition;
mod error;
mod operation;
mod resolver;

pub use artifact::{Artifact, ArtifactDir, ArtifactSource};
pub use chain::{bundle_hash, fingerprint, Bundle, Position, NO_ACTIVE_BUNDLE};
pub use definition::{definition_hash, Action, CallAction, DeployAction, DeploymentDefinition};
pub use error::{ArtifactError, DefinitionError, MalformedDefinition, MalformedKind};
pub use operation::RawOperation;
pub use resolver::{alias_address, resolve};
