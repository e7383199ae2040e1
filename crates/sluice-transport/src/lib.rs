//! Transport abstractions for sluice.
//!
//! The routing and pull-consumer layers only depend on the publish/request
//! collaborator trait and the inbound sink defined in this crate. Socket
//! transports live outside this workspace.

pub mod adapter;
