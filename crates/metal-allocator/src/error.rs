//! Allocation error types.

use std::net::IpAddr;

use metal_state::StateError;
use thiserror::Error;

/// Coarse classification callers map to transport-level responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// No live, free machine matches. Recoverable by retry or scale-out.
    NoCapacity,
    /// Lost an optimistic claim race. Retry with a fresh candidate.
    Conflict,
    /// The request itself is unacceptable. Safe to surface verbatim.
    InvalidRequest,
    /// Store failure.
    Internal,
}

/// Errors that can occur during allocation.
#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("no machine available in partition {partition} with size {size}")]
    NoMachineAvailable { partition: String, size: String },

    #[error("machine {machine_id} was modified concurrently")]
    ConcurrentModification { machine_id: String },

    #[error("machine not found: {0}")]
    MachineNotFound(String),

    #[error("the machine \"{0}\" is already allocated")]
    MachineAlreadyAllocated(String),

    #[error("the machine \"{0}\" is not claimed or already allocated")]
    MachineNotClaimed(String),

    #[error("{0}")]
    InvalidSpec(String),

    #[error("{kind} networks are not allowed to be set explicitly")]
    ForbiddenNetworkKind {
        network_id: String,
        kind: &'static str,
    },

    #[error("given network ids are not unique")]
    DuplicateNetworkId,

    #[error("network not found: {0}")]
    NetworkNotFound(String),

    #[error("ip not found: {0}")]
    IpNotFound(IpAddr),

    #[error("given ip {0} is not in any of the given networks")]
    IpNotInAnyRequestedNetwork(IpAddr),

    #[error(
        "given ip {ip} with project id {ip_project} does not belong to the project of this allocation: {project}"
    )]
    IpProjectMismatch {
        ip: IpAddr,
        ip_project: String,
        project: String,
    },

    #[error("partition {0} has no private super network")]
    NoPrivateSuperNetwork(String),

    #[error("no private network given")]
    NoPrivateNetwork,

    #[error(
        "multiple private networks are specified but there must be only one primary private network that must not be shared"
    )]
    MultiplePrimaryPrivateNetworks,

    #[error("machines are not allowed to be placed into multiple private networks")]
    MultiplePrivateNetworksForMachine,

    #[error("firewalls are not allowed to be placed into multiple private, shared networks")]
    FirewallMultipleSharedNetworks,

    #[error("the given private network does not belong to the project, which is not allowed")]
    PrivateNetworkForeignProject { network_id: String },

    #[error(
        "private network {network_id} must be located in the partition where the machine is going to be placed"
    )]
    PrivateNetworkWrongPartition { network_id: String },

    #[error("the {kind} network {network_id} has no auto ip acquisition, but no suitable IPs were provided")]
    MissingIpForNetwork {
        network_id: String,
        kind: &'static str,
    },

    #[error("state store error: {0}")]
    State(#[source] StateError),
}

impl AllocationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AllocationError::NoMachineAvailable { .. } => ErrorCategory::NoCapacity,
            AllocationError::ConcurrentModification { .. } => ErrorCategory::Conflict,
            AllocationError::State(_) => ErrorCategory::Internal,
            _ => ErrorCategory::InvalidRequest,
        }
    }

    /// Whether re-running selection may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::NoCapacity | ErrorCategory::Conflict
        )
    }
}

impl From<StateError> for AllocationError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::Conflict { key, .. } => {
                AllocationError::ConcurrentModification { machine_id: key }
            }
            other => AllocationError::State(other),
        }
    }
}

pub type AllocationResult<T> = Result<T, AllocationError>;
