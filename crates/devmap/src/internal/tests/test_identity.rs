use std::path::PathBuf;

use crate::internal::access::decision::{AccessAction, AccessScope, DeviceTarget};
use crate::internal::device::identity::DeviceIdentityResolver;
use crate::internal::device::mapping::DeviceMappingTable;
use crate::internal::device::number::{DeviceKind, DeviceNumber, ResolvedDevice};
use crate::internal::device::slot::DeviceSlot;
use crate::internal::tests::utils::{
    FakeBusResolver, FakeInspector, NVIDIA_MAJOR, bus, gpu_slots, init_test_logging,
};

fn table(buses: &[&str]) -> DeviceMappingTable {
    let slots = gpu_slots(&vec![true; buses.len()]);
    DeviceMappingTable::build(&slots, buses.iter().map(|b| bus(b)).collect()).unwrap()
}

#[test]
fn test_resolve_renumbered_device() {
    init_test_logging();
    let table = table(&["0000:3b:00.0", "0000:86:00.0"]);
    // The driver swapped the numbering after a reboot
    let buses = FakeBusResolver::new(&[("0000:3b:00.0", Some(1)), ("0000:86:00.0", Some(0))]);
    let inspector = FakeInspector::nvidia(2);
    let resolver = DeviceIdentityResolver::new(&table, &buses, &inspector);

    assert_eq!(
        resolver.resolve(&DeviceSlot::new("/dev/nvidia0", 0, true)).unwrap(),
        ResolvedDevice::Present {
            real_path: PathBuf::from("/dev/nvidia1"),
            device: DeviceNumber::char(NVIDIA_MAJOR, 1),
        }
    );
    let decision = resolver
        .decide(&DeviceSlot::new("/dev/nvidia1", 1, false), AccessScope::Job)
        .unwrap()
        .unwrap();
    assert_eq!(decision.action, AccessAction::Deny);
    assert_eq!(
        decision.target,
        DeviceTarget::Device(DeviceNumber::char(NVIDIA_MAJOR, 0))
    );
    assert_eq!(decision.scope, AccessScope::Job);
}

#[test]
fn test_mismatched_slot_path_uses_mapping() {
    let table = table(&["0000:3b:00.0"]);
    let buses = FakeBusResolver::new(&[("0000:3b:00.0", Some(0))]);
    let inspector = FakeInspector::nvidia(1);
    let resolver = DeviceIdentityResolver::new(&table, &buses, &inspector);

    let resolved = resolver
        .resolve(&DeviceSlot::new("/dev/nvidia7", 0, true))
        .unwrap();
    assert_eq!(resolved.major(), Some(NVIDIA_MAJOR));
}

#[test]
fn test_unresolved_device_is_never_allowed() {
    let table = table(&["0000:3b:00.0", "0000:af:00.0"]);
    // Stale mapping, 0000:af:00.0 is gone
    let buses = FakeBusResolver::new(&[("0000:3b:00.0", Some(0))]);
    let inspector = FakeInspector::nvidia(2);
    let resolver = DeviceIdentityResolver::new(&table, &buses, &inspector);

    let slot = DeviceSlot::new("/dev/nvidia1", 1, true);
    assert!(!resolver.resolve(&slot).unwrap().is_resolved());
    for allocated in [true, false] {
        let slot = DeviceSlot::new("/dev/nvidia1", 1, allocated);
        let decision = resolver.decide(&slot, AccessScope::Step).unwrap().unwrap();
        assert_eq!(decision.action, AccessAction::Deny);
        assert_eq!(
            decision.target,
            DeviceTarget::Class {
                kind: DeviceKind::Char,
                major: NVIDIA_MAJOR
            }
        );
    }
}

#[test]
fn test_unresolved_device_without_any_node() {
    let table = table(&["0000:3b:00.0"]);
    // The bus is listed but no device of the class exists on the host
    let buses = FakeBusResolver::new(&[("0000:3b:00.0", Some(4))]);
    let inspector = FakeInspector::default();
    let resolver = DeviceIdentityResolver::new(&table, &buses, &inspector);

    let slot = DeviceSlot::new("/dev/nvidia0", 0, true);
    assert_eq!(resolver.resolve(&slot).unwrap(), ResolvedDevice::Unresolved);
    assert!(resolver.decide(&slot, AccessScope::Job).unwrap().is_none());
}

fn fake_slots(allocated: &[bool]) -> Vec<DeviceSlot> {
    allocated
        .iter()
        .enumerate()
        .map(|(index, allocated)| DeviceSlot::new(format!("/fake/gpu{index}"), index, *allocated))
        .collect()
}

fn class_deny() -> DeviceTarget {
    DeviceTarget::Class {
        kind: DeviceKind::Char,
        major: NVIDIA_MAJOR,
    }
}

#[test]
fn test_unresolved_slot_path_is_not_a_device() {
    init_test_logging();
    let slots = fake_slots(&[true, true]);
    let table =
        DeviceMappingTable::build(&slots, vec![bus("0000:01:00.0"), bus("0000:02:00.0")]).unwrap();
    // 0000:02:00.0 disappeared from the driver
    let buses = FakeBusResolver::new(&[("0000:01:00.0", Some(0))]);
    let inspector = FakeInspector::nvidia(1);
    let resolver = DeviceIdentityResolver::new(&table, &buses, &inspector);

    let decision = resolver.decide(&slots[1], AccessScope::Job).unwrap().unwrap();
    assert_eq!(decision.action, AccessAction::Deny);
    assert_eq!(decision.target, class_deny());

    let decision = resolver.decide(&slots[0], AccessScope::Job).unwrap().unwrap();
    assert_eq!(decision.action, AccessAction::Allow);
    assert_eq!(
        decision.target,
        DeviceTarget::Device(DeviceNumber::char(NVIDIA_MAJOR, 0))
    );
}

#[test]
fn test_unresolved_slot_class_from_sibling() {
    let slots = fake_slots(&[false, true]);
    let table =
        DeviceMappingTable::build(&slots, vec![bus("0000:01:00.0"), bus("0000:02:00.0")]).unwrap();
    let buses = FakeBusResolver::new(&[("0000:01:00.0", Some(0))]);
    let inspector = FakeInspector::nvidia(1).without("/dev/nvidiactl");
    let resolver = DeviceIdentityResolver::new(&table, &buses, &inspector);

    let decision = resolver.decide(&slots[1], AccessScope::Step).unwrap().unwrap();
    assert_eq!(decision.action, AccessAction::Deny);
    assert_eq!(decision.target, class_deny());
    assert_eq!(decision.scope, AccessScope::Step);
}

#[test]
fn test_slot_outside_of_mapping() {
    let table = table(&["0000:3b:00.0"]);
    let buses = FakeBusResolver::new(&[("0000:3b:00.0", Some(0))]);
    let inspector = FakeInspector::nvidia(1);
    let resolver = DeviceIdentityResolver::new(&table, &buses, &inspector);

    let error = resolver
        .decide(&DeviceSlot::new("/dev/nvidia1", 1, true), AccessScope::Job)
        .unwrap_err();
    assert!(error.is_fatal());
}
