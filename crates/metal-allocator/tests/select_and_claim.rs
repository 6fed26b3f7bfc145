//! Selection and claim integration tests.
//!
//! Runs the allocator against in-memory stores: liveliness filtering, rack
//! spreading over consecutive allocations, claim races and the full
//! allocate/release cycle.

use std::collections::HashMap;
use std::sync::{Arc, Barrier};

use metal_allocator::*;
use metal_core::*;
use metal_state::StateStore;
use rand::SeedableRng;
use rand::rngs::StdRng;

const PARTITION: &str = "fra-equ01";
const SIZE: &str = "c1-xlarge-x86";

fn test_store() -> StateStore {
    StateStore::open_in_memory().unwrap()
}

fn rng() -> StdRng {
    StdRng::seed_from_u64(1)
}

fn make_machine(store: &StateStore, id: &str, rack: &str, liveliness: Liveliness) -> Machine {
    let machine = Machine {
        id: id.to_string(),
        name: String::new(),
        partition_id: PARTITION.to_string(),
        size_id: SIZE.to_string(),
        rack_id: rack.to_string(),
        state: MachineState::default(),
        waiting: true,
        preallocated: false,
        allocation: None,
        tags: vec![],
        changed: 0,
    };
    let stored = store.create_machine(&machine).unwrap();
    store.put_liveliness(id, liveliness).unwrap();
    stored
}

fn seed_networks(store: &StateStore) {
    store
        .put_network(&Network {
            id: "super-1".to_string(),
            name: "tenant super".to_string(),
            project_id: None,
            partition_id: Some(PARTITION.to_string()),
            prefixes: vec!["10.0.0.0/16".to_string()],
            kind: NetworkKind::PrivateSuper,
        })
        .unwrap();
    store
        .put_network(&Network {
            id: "private-1".to_string(),
            name: "p1 private".to_string(),
            project_id: Some("p1".to_string()),
            partition_id: Some(PARTITION.to_string()),
            prefixes: vec!["10.0.1.0/22".to_string()],
            kind: NetworkKind::Private {
                parent_network_id: "super-1".to_string(),
                shared: false,
            },
        })
        .unwrap();
    store
        .put_network(&Network {
            id: "internet".to_string(),
            name: "internet".to_string(),
            project_id: None,
            partition_id: None,
            prefixes: vec!["185.1.0.0/16".to_string()],
            kind: NetworkKind::External,
        })
        .unwrap();
}

fn allocation_spec() -> AllocationSpec {
    AllocationSpec {
        name: "worker".to_string(),
        creator: "ops@example.com".to_string(),
        project_id: "p1".to_string(),
        role: Role::Machine,
        partition_id: Some(PARTITION.to_string()),
        size_id: Some(SIZE.to_string()),
        networks: vec![
            AllocationNetworkRequest::new("private-1"),
            AllocationNetworkRequest::new("internet"),
        ],
        ..Default::default()
    }
}

// ── Liveliness ─────────────────────────────────────────────────────

#[test]
fn no_alive_machine_means_no_capacity() {
    let store = test_store();
    make_machine(&store, "m1", "rack-1", Liveliness::Dead);
    make_machine(&store, "m2", "rack-2", Liveliness::Unknown);

    let allocator = Allocator::new(store);
    let err = allocator
        .select_and_claim("p1", PARTITION, SIZE, &[], &mut rng())
        .unwrap_err();

    assert!(matches!(err, AllocationError::NoMachineAvailable { .. }));
    assert_eq!(err.category(), ErrorCategory::NoCapacity);
    for id in ["m1", "m2"] {
        assert!(!allocator.store().get_machine(id).unwrap().unwrap().preallocated);
    }
}

#[test]
fn only_the_alive_machine_is_claimed() {
    let store = test_store();
    make_machine(&store, "m1", "rack-1", Liveliness::Dead);
    make_machine(&store, "m2", "rack-2", Liveliness::Alive);

    let allocator = Allocator::new(store);
    let claimed = allocator
        .select_and_claim("p1", PARTITION, SIZE, &[], &mut rng())
        .unwrap();

    assert_eq!(claimed.id, "m2");
    assert!(claimed.preallocated);
}

// ── Rack spread ────────────────────────────────────────────────────

#[test]
fn consecutive_allocations_spread_over_racks() {
    let store = test_store();
    seed_networks(&store);
    for rack in 1..=3 {
        for slot in 0..2 {
            make_machine(
                &store,
                &format!("r{rack}-m{slot}"),
                &format!("rack-{rack}"),
                Liveliness::Alive,
            );
        }
    }

    let allocator = Allocator::new(store);
    let mut rng = rng();
    let mut per_rack: HashMap<String, usize> = HashMap::new();
    for _ in 0..3 {
        let m = allocator.allocate(&allocation_spec(), &mut rng).unwrap();
        *per_rack.entry(m.rack_id).or_default() += 1;
    }

    assert_eq!(per_rack.len(), 3);
    assert!(per_rack.values().all(|&n| n == 1));
}

// ── Claim atomicity ────────────────────────────────────────────────

#[test]
fn racing_claims_have_one_winner() {
    let store = test_store();
    let machine = make_machine(&store, "m1", "rack-1", Liveliness::Alive);

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let store = store.clone();
            let machine = machine.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                metal_allocator::claim::claim(&store, &machine)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(AllocationError::ConcurrentModification { .. })))
        .count();

    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, 1);
    assert_eq!(winners[0].changed, machine.changed + 1);
}

#[test]
fn stale_candidate_conflicts_and_retry_succeeds() {
    let store = test_store();
    let stale = make_machine(&store, "m1", "rack-1", Liveliness::Alive);
    make_machine(&store, "m2", "rack-1", Liveliness::Alive);

    // Another scheduler claims m1 first.
    metal_allocator::claim::claim(&store, &stale).unwrap();
    let err = metal_allocator::claim::claim(&store, &stale).unwrap_err();
    assert!(err.is_retryable());

    let allocator = Allocator::new(store);
    let retried = allocator
        .select_and_claim("p1", PARTITION, SIZE, &[], &mut rng())
        .unwrap();
    assert_eq!(retried.id, "m2");
}

#[test]
fn placement_tags_steer_later_allocations() {
    let store = test_store();
    seed_networks(&store);
    make_machine(&store, "a0", "rack-1", Liveliness::Alive);
    make_machine(&store, "a1", "rack-1", Liveliness::Alive);
    for id in ["b0", "b1", "b2"] {
        make_machine(&store, id, "rack-2", Liveliness::Alive);
    }

    let allocator = Allocator::new(store);
    let mut rng = rng();
    for id in ["b0", "b1"] {
        let mut spec = allocation_spec();
        spec.machine_id = Some(id.to_string());
        allocator.allocate(&spec, &mut rng).unwrap();
    }

    let mut tagged = allocation_spec();
    tagged.tags = vec!["db".to_string()];
    let first = allocator.allocate(&tagged, &mut rng).unwrap();
    assert_eq!(first.rack_id, "rack-1");
    assert_eq!(first.tags, vec!["db"]);

    // Project spread prefers rack-1 (1 vs 2), tag spread prefers rack-2
    // (0 vs 1); the tags win.
    let second = allocator.allocate(&tagged, &mut rng).unwrap();
    assert_eq!(second.id, "b2");
}

// ── Allocate / release ─────────────────────────────────────────────

#[test]
fn allocate_attaches_classified_networks() {
    let store = test_store();
    seed_networks(&store);
    make_machine(&store, "m1", "rack-1", Liveliness::Alive);

    let allocator = Allocator::new(store);
    let machine = allocator.allocate(&allocation_spec(), &mut rng()).unwrap();

    let allocation = machine.allocation.as_ref().unwrap();
    assert_eq!(allocation.project, "p1");
    assert!(machine.preallocated);
    assert!(!machine.waiting);

    let types: Vec<_> = allocation
        .networks
        .iter()
        .map(|n| (n.network_id.as_str(), n.network_type))
        .collect();
    assert_eq!(
        types,
        vec![
            ("internet", NetworkType::External),
            ("private-1", NetworkType::PrivatePrimaryUnshared),
        ]
    );
}

#[test]
fn invalid_request_claims_nothing() {
    let store = test_store();
    seed_networks(&store);
    make_machine(&store, "m1", "rack-1", Liveliness::Alive);

    let mut spec = allocation_spec();
    spec.networks.push(AllocationNetworkRequest::new("super-1"));

    let allocator = Allocator::new(store);
    let err = allocator.allocate(&spec, &mut rng()).unwrap_err();
    assert!(matches!(err, AllocationError::ForbiddenNetworkKind { .. }));

    let m1 = allocator.store().get_machine("m1").unwrap().unwrap();
    assert!(!m1.preallocated);
    assert_eq!(m1.changed, 1);
}

#[test]
fn explicit_machine_allocation() {
    let store = test_store();
    seed_networks(&store);
    make_machine(&store, "m1", "rack-1", Liveliness::Alive);
    make_machine(&store, "m2", "rack-2", Liveliness::Alive);

    let mut spec = allocation_spec();
    spec.machine_id = Some("m2".to_string());
    spec.partition_id = None;
    spec.size_id = None;

    let allocator = Allocator::new(store);
    let machine = allocator.allocate(&spec, &mut rng()).unwrap();
    assert_eq!(machine.id, "m2");

    let err = allocator.allocate(&spec, &mut rng()).unwrap_err();
    assert!(matches!(err, AllocationError::MachineAlreadyAllocated(_)));
}

#[test]
fn released_machine_can_be_claimed_again() {
    let store = test_store();
    seed_networks(&store);
    make_machine(&store, "m1", "rack-1", Liveliness::Alive);

    let allocator = Allocator::new(store);
    let mut spec = allocation_spec();
    spec.tags = vec!["db".to_string()];
    allocator.allocate(&spec, &mut rng()).unwrap();

    let released = allocator.release("m1").unwrap();
    assert!(released.is_free());
    assert!(!released.preallocated);
    assert!(released.tags.is_empty());

    // The machine reports itself as waiting again after reprovisioning.
    let mut waiting = released.clone();
    waiting.waiting = true;
    allocator.store().update_machine(&released, &waiting).unwrap();

    let claimed = allocator
        .select_and_claim("p1", PARTITION, SIZE, &[], &mut rng())
        .unwrap();
    assert_eq!(claimed.id, "m1");
}

#[test]
fn releasing_a_waiting_machine_keeps_it_in_the_pool() {
    let store = test_store();
    make_machine(&store, "m1", "rack-1", Liveliness::Alive);

    let allocator = Allocator::new(store);
    let err = allocator.release("m1").unwrap_err();
    assert!(matches!(err, AllocationError::MachineNotClaimed(_)));

    let claimed = allocator
        .select_and_claim("p1", PARTITION, SIZE, &[], &mut rng())
        .unwrap();
    assert_eq!(claimed.id, "m1");
}
