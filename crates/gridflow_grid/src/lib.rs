//! Grid adapters for GridFlow.
//!
//! Everything that leaves the controller process goes through this crate:
//! spawning external grid tools with captured output ([`CommandRunner`]),
//! keeping the delegated credential fresh ([`CredentialManager`]), and the
//! opaque CE/storage surfaces ([`ComputeElement`], [`Storage`]) behind which
//! the protocol-specific command lines live.

pub mod ce;
pub mod command;
pub mod credential;
pub mod error;
pub mod storage;

pub use ce::{CeFlavor, CeJobInfo, ComputeElement, GridCe};
pub use command::{CommandError, CommandOutput, CommandRunner};
pub use credential::{CredentialError, CredentialManager};
pub use error::AdapterError;
pub use storage::{GfalStorage, Storage};
