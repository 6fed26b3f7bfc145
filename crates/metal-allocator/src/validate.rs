//! Structural validation of allocation requests.
//!
//! Runs before any lookup. Checks are applied in a fixed order and the
//! first failure is reported.

use std::collections::HashSet;
use std::net::IpAddr;

use metal_core::Role;

use crate::error::{AllocationError, AllocationResult};
use crate::request::AllocationSpec;
use crate::ssh::parse_authorized_key;

fn invalid(msg: impl Into<String>) -> AllocationError {
    AllocationError::InvalidSpec(msg.into())
}

pub fn validate_allocation_spec(spec: &AllocationSpec) -> AllocationResult<()> {
    if spec.project_id.is_empty() {
        return Err(invalid("project id must be specified"));
    }

    if spec.creator.is_empty() {
        return Err(invalid("creator should be specified"));
    }

    if !spec.has_machine_id() {
        if !spec.has_size_id() {
            return Err(invalid(
                "when no machine id is given, a size id must be specified",
            ));
        }
        if !spec.has_partition_id() {
            return Err(invalid(
                "when no machine id is given, a partition id must be specified",
            ));
        }
    }

    let mut seen = HashSet::new();
    for ip in &spec.ips {
        let Ok(address) = ip.parse::<IpAddr>() else {
            return Err(invalid(format!("{ip:?} is not a valid IP address")));
        };
        if !seen.insert(address) {
            return Err(invalid(format!("ip {address} is given more than once")));
        }
    }

    for key in &spec.ssh_pub_keys {
        if parse_authorized_key(key).is_err() {
            return Err(invalid(format!("invalid public SSH key: {key}")));
        }
    }

    if spec.role == Role::Firewall
        && spec.ips.is_empty()
        && !spec.networks.iter().any(|n| n.wants_auto())
    {
        return Err(invalid(
            "when no ip is given at least one auto acquire network must be specified",
        ));
    }

    let without_auto = spec
        .networks
        .iter()
        .filter(|n| n.auto_acquire_ip == Some(false))
        .count();
    if without_auto > spec.ips.len() {
        return Err(invalid(
            "missing ip(s) for network(s) without automatic ip allocation",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::AllocationNetworkRequest;

    fn valid_spec() -> AllocationSpec {
        AllocationSpec {
            name: "worker-0".to_string(),
            creator: "ops@example.com".to_string(),
            project_id: "p1".to_string(),
            role: Role::Machine,
            machine_id: None,
            partition_id: Some("fra-equ01".to_string()),
            size_id: Some("c1-xlarge-x86".to_string()),
            networks: vec![AllocationNetworkRequest::new("private-1")],
            ips: vec![],
            ssh_pub_keys: vec![],
            tags: vec![],
        }
    }

    fn message(spec: &AllocationSpec) -> String {
        match validate_allocation_spec(spec) {
            Err(AllocationError::InvalidSpec(msg)) => msg,
            other => panic!("expected InvalidSpec, got {other:?}"),
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(validate_allocation_spec(&valid_spec()).is_ok());
    }

    #[test]
    fn auto_network_with_additional_ip_passes() {
        let mut spec = valid_spec();
        spec.networks.push(AllocationNetworkRequest::with_auto("internet", true));
        spec.ips = vec!["185.1.2.3".to_string()];
        assert!(validate_allocation_spec(&spec).is_ok());
    }

    #[test]
    fn explicit_machine_needs_no_partition_or_size() {
        let mut spec = valid_spec();
        spec.machine_id = Some("m1".to_string());
        spec.partition_id = None;
        spec.size_id = None;
        assert!(validate_allocation_spec(&spec).is_ok());
    }

    #[test]
    fn project_and_creator_required() {
        let mut spec = valid_spec();
        spec.project_id.clear();
        spec.creator.clear();
        assert_eq!(message(&spec), "project id must be specified");

        spec.project_id = "p1".to_string();
        assert_eq!(message(&spec), "creator should be specified");
    }

    #[test]
    fn size_checked_before_partition() {
        let mut spec = valid_spec();
        spec.size_id = None;
        spec.partition_id = None;
        assert_eq!(
            message(&spec),
            "when no machine id is given, a size id must be specified"
        );

        spec.size_id = Some("c1-xlarge-x86".to_string());
        assert_eq!(
            message(&spec),
            "when no machine id is given, a partition id must be specified"
        );
    }

    #[test]
    fn illegal_ip() {
        let mut spec = valid_spec();
        spec.ips = vec!["42".to_string()];
        assert_eq!(message(&spec), r#""42" is not a valid IP address"#);
    }

    #[test]
    fn repeated_ip() {
        let mut spec = valid_spec();
        spec.networks = vec![AllocationNetworkRequest::with_auto("internet", false)];
        spec.ips = vec!["185.1.2.3".to_string(), "185.1.2.3".to_string()];
        assert_eq!(message(&spec), "ip 185.1.2.3 is given more than once");

        spec.ips = vec!["2001:db8::1".to_string(), "2001:0db8:0::1".to_string()];
        assert_eq!(message(&spec), "ip 2001:db8::1 is given more than once");
    }

    #[test]
    fn invalid_ssh_key() {
        let mut spec = valid_spec();
        spec.ssh_pub_keys = vec!["42".to_string()];
        assert_eq!(message(&spec), "invalid public SSH key: 42");
    }

    #[test]
    fn firewall_needs_ip_or_auto_network() {
        let mut spec = valid_spec();
        spec.role = Role::Firewall;
        spec.networks = vec![AllocationNetworkRequest::with_auto("private-1", false)];
        assert_eq!(
            message(&spec),
            "when no ip is given at least one auto acquire network must be specified"
        );

        spec.networks = vec![AllocationNetworkRequest::new("private-1")];
        assert!(validate_allocation_spec(&spec).is_ok());
    }

    #[test]
    fn no_auto_network_needs_ip() {
        let mut spec = valid_spec();
        spec.networks = vec![AllocationNetworkRequest::with_auto("private-1", false)];
        assert_eq!(
            message(&spec),
            "missing ip(s) for network(s) without automatic ip allocation"
        );

        spec.ips = vec!["10.0.0.5".to_string()];
        assert!(validate_allocation_spec(&spec).is_ok());
    }
}
