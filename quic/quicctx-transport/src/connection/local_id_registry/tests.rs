// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use quicctx_core::random::testing::{Constant, Generator};

fn tables() -> IdTables {
    IdTables::new([5; 16], 8)
}

fn at(millis: u64) -> Timestamp {
    Timestamp::from_micros(millis * 1_000)
}

#[test]
fn create_registers_test() {
    let mut id_tables = tables();
    let mut random = Generator(1);
    let connection = InternalConnectionId::from(4);
    let mut registry = Registry::new(connection, 8);

    let first = registry
        .create(0, None, at(0), &mut random, &mut id_tables)
        .unwrap();
    let second = registry
        .create(0, None, at(1), &mut random, &mut id_tables)
        .unwrap();

    assert_eq!((first.sequence, second.sequence), (0, 1));
    assert_ne!(first.id, second.id);
    assert_eq!(first.id.len(), 8);
    assert_eq!(
        id_tables.lookup_local_id(&second.id),
        Some(Route {
            connection,
            path_id: 0
        })
    );
    assert_eq!(registry.find(0, &first.id), Some(&first));
    assert_eq!(registry.next_path_id(), 1);
}

#[test]
fn suggested_id_is_tried_first_test() {
    let mut id_tables = tables();
    let mut random = Generator(1);
    let mut registry = Registry::new(InternalConnectionId::from(1), 8);
    let suggested = LocalId::try_from_bytes(&[9; 8]).unwrap();

    let entry = registry
        .create(0, Some(suggested), at(0), &mut random, &mut id_tables)
        .unwrap();
    assert_eq!(entry.id, suggested);

    // the suggestion is now taken by this connection, so a random ID is used
    let mut other = Registry::new(InternalConnectionId::from(2), 8);
    let entry = other
        .create(0, Some(suggested), at(0), &mut random, &mut id_tables)
        .unwrap();
    assert_ne!(entry.id, suggested);
}

#[test]
fn collision_gives_up_test() {
    let mut id_tables = tables();
    let mut random = Constant(7);
    let mut first = Registry::new(InternalConnectionId::from(1), 4);
    let mut second = Registry::new(InternalConnectionId::from(2), 4);

    first
        .create(0, None, at(0), &mut random, &mut id_tables)
        .unwrap();
    assert_eq!(
        second.create(0, None, at(0), &mut random, &mut id_tables),
        Err(Error::ConnectionIdCollision)
    );
    assert!(second.list(0).is_none());
}

#[test]
fn zero_length_is_not_registered_test() {
    let mut id_tables = tables();
    let mut random = Generator(1);
    let mut registry = Registry::new(InternalConnectionId::from(1), 0);

    let entry = registry
        .create(0, None, at(0), &mut random, &mut id_tables)
        .unwrap();
    assert!(entry.id.is_empty());
    assert!(id_tables.is_empty());
}

#[test]
fn ttl_sweep_test() {
    let mut id_tables = tables();
    let mut random = Generator(1);
    let mut registry = Registry::new(InternalConnectionId::from(1), 8);
    let ttl = Duration::from_millis(100);

    registry
        .create(0, None, at(0), &mut random, &mut id_tables)
        .unwrap();
    registry
        .create(0, None, at(60), &mut random, &mut id_tables)
        .unwrap();

    // nothing expired yet, come back when the oldest ID does
    assert_eq!(registry.check_ttl(at(50), ttl), Some(at(100)));

    assert_eq!(registry.check_ttl(at(120), ttl), Some(at(120)));
    let list = registry.list(0).unwrap();
    assert_eq!(list.expired(), 1);
    assert_eq!(list.retire_before(), 1);

    // the next sweep waits for the remaining ID
    assert_eq!(registry.check_ttl(at(130), ttl), Some(at(160)));

    registry.delete(0, 0, &mut id_tables).unwrap();
    assert_eq!(registry.list(0).unwrap().expired(), 0);
    assert_eq!(id_tables.len()[0], 1);
}

#[test]
fn delete_list_unregisters_test() {
    let mut id_tables = tables();
    let mut random = Generator(1);
    let mut registry = Registry::new(InternalConnectionId::from(1), 8);

    for path_id in [0, 2] {
        registry
            .create(path_id, None, at(0), &mut random, &mut id_tables)
            .unwrap();
    }
    assert_eq!(registry.next_path_id(), 3);
    assert_eq!(id_tables.len()[0], 2);

    registry.delete_list(2, &mut id_tables).unwrap();
    assert_eq!(id_tables.len()[0], 1);
    registry.delete_all(&mut id_tables);
    assert!(id_tables.is_empty());
}

#[test]
fn largest_path_id_test() {
    let mut id_tables = tables();
    let mut random = Generator(3);
    let mut registry = Registry::new(InternalConnectionId::from(6), 8);

    registry
        .create(u64::MAX, None, at(0), &mut random, &mut id_tables)
        .unwrap();
    assert_eq!(registry.next_path_id(), u64::MAX);
    assert_eq!(registry.list(u64::MAX).map(List::len), Some(1));
}
