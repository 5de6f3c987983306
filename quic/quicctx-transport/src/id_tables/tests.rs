// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use quicctx_core::stateless_reset::testing::*;

fn conn(id: u64) -> InternalConnectionId {
    InternalConnectionId::from(id)
}

fn route(id: u64, path_id: u64) -> Route {
    Route {
        connection: conn(id),
        path_id,
    }
}

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

#[test]
fn local_id_uniqueness_test() {
    bolero::check!()
        .with_type::<(LocalId, u8)>()
        .cloned()
        .for_each(|(id, owner)| {
            let mut tables = IdTables::new([7; 16], 4);
            let owner = owner as u64;
            assert!(tables.register_local_id(id, route(owner, 0)).is_ok());
            assert_eq!(
                tables.register_local_id(id, route(owner + 1, 0)),
                Err(RegistrationError::LocalIdInUse)
            );
            assert_eq!(tables.lookup_local_id(&id), Some(route(owner, 0)));
        });
}

#[test]
fn unregister_requires_owner_test() {
    let mut tables = IdTables::new([1; 16], 4);
    let id = LocalId::TEST_ID;
    tables.register_local_id(id, route(1, 0)).unwrap();

    assert_eq!(tables.unregister_local_id(&id, conn(2)), None);
    assert_eq!(tables.lookup_local_id(&id), Some(route(1, 0)));
    assert_eq!(tables.unregister_local_id(&id, conn(1)), Some(route(1, 0)));
    assert_eq!(tables.unregister_local_id(&id, conn(1)), None);
    assert!(tables.is_empty());
}

#[test]
fn address_ignores_flow_info_test() {
    let mut tables = IdTables::new([2; 16], 4);
    let registered = addr("[2001:db8::1]:4433");
    tables.register_address(&registered, route(3, 1)).unwrap();

    let scoped = SocketAddr::V6(quicctx_core::inet::SocketAddrV6::new(
        "2001:db8::1".parse().unwrap(),
        4433,
        9,
        2,
    ));
    assert_eq!(tables.lookup_address(&scoped), Some(route(3, 1)));
    assert_eq!(tables.lookup_address(&addr("[2001:db8::1]:4434")), None);

    // another path of the same connection does not own the entry
    assert_eq!(tables.unregister_address(&registered, route(3, 2)), None);
    assert!(tables.unregister_address(&registered, route(3, 1)).is_some());
}

#[test]
fn initial_id_is_scoped_by_address_test() {
    let mut tables = IdTables::new([3; 16], 4);
    let id = InitialId::TEST_ID;
    let a = addr("192.0.2.1:1000");
    let b = addr("192.0.2.2:1000");

    tables.register_initial_id(id, &a, conn(1)).unwrap();
    tables.register_initial_id(id, &b, conn(2)).unwrap();
    assert_eq!(
        tables.register_initial_id(id, &a, conn(3)),
        Err(RegistrationError::InitialIdInUse)
    );

    assert_eq!(tables.lookup_initial_id(id, &a), Some(conn(1)));
    assert_eq!(tables.lookup_initial_id(id, &b), Some(conn(2)));
    assert_eq!(tables.len(), [0, 0, 2, 0]);
}

#[test]
fn secret_lookup_test() {
    let mut tables = IdTables::new([4; 16], 4);
    let peer = addr("198.51.100.7:443");
    tables.register_secret(TEST_SECRET_1, &peer, conn(9)).unwrap();

    assert_eq!(tables.lookup_secret(&TEST_SECRET_1, &peer), Some(conn(9)));
    assert_eq!(tables.lookup_secret(&TEST_SECRET_2, &peer), None);
    assert_eq!(
        tables.register_secret(TEST_SECRET_1, &peer, conn(10)),
        Err(RegistrationError::SecretInUse)
    );
    assert_eq!(tables.unregister_secret(TEST_SECRET_1, &peer, conn(10)), None);
    assert_eq!(
        tables.unregister_secret(TEST_SECRET_1, &peer, conn(9)),
        Some(conn(9))
    );
}

#[test]
fn seeds_change_hashes_test() {
    use core::hash::BuildHasher;

    let a = SeededState::new([0; 16]);
    let b = SeededState::new([1; 16]);
    assert_ne!(a.hash_one(LocalId::TEST_ID), b.hash_one(LocalId::TEST_ID));
    assert_eq!(a.hash_one(LocalId::TEST_ID), a.hash_one(LocalId::TEST_ID));
}

#[test]
fn error_display_test() {
    insta::assert_snapshot!(RegistrationError::AddressInUse, @"The peer address is registered by another owner");
}

#[test]
fn reset_token_test() {
    let id = LocalId::try_from_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    let other = LocalId::try_from_bytes(&[8, 7, 6, 5, 4, 3, 2, 1]).unwrap();

    let token = stateless_reset_token(&[3; 16], &id);
    assert_eq!(token, stateless_reset_token(&[3; 16], &id));
    assert_ne!(token, stateless_reset_token(&[3; 16], &other));
    assert_ne!(token, stateless_reset_token(&[4; 16], &id));
}
