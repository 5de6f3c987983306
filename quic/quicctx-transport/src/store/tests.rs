// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use bytes::Bytes;
use core::time::Duration;
use quicctx_core::{
    inet::{IpAddr, Ipv4Addr, Ipv6Addr},
    time::Timestamp,
};

fn now() -> Timestamp {
    Timestamp::from_micros(10_000_000)
}

fn ticket_key(server_name: &str) -> TicketKey {
    TicketKey {
        server_name: server_name.into(),
        alpn: "hq-interop".into(),
        version: 1,
    }
}

fn ticket(lifetime: Duration, contents: &'static [u8]) -> Ticket {
    Ticket {
        valid_until: now() + lifetime,
        ticket: Bytes::from_static(contents),
    }
}

#[test]
fn ticket_store_round_trip_test() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tickets.bin");

    let mut store = TicketStore::new();
    store
        .insert(ticket_key("a.example"), ticket(Duration::from_secs(60), b"first"))
        .unwrap();
    store
        .insert(ticket_key("b.example"), ticket(Duration::from_secs(5), b"second"))
        .unwrap();
    store.save(&path).unwrap();

    // the second ticket expires before the file is read back
    let later = now() + Duration::from_secs(10);
    let mut loaded = TicketStore::new();
    assert_eq!(loaded.load(&path, later).unwrap(), 1);
    assert_eq!(
        loaded.get(&ticket_key("a.example"), later),
        Some(&ticket(Duration::from_secs(60), b"first"))
    );
    assert_eq!(loaded.get(&ticket_key("b.example"), later), None);

    let mut other_version = ticket_key("a.example");
    other_version.version = 2;
    assert_eq!(loaded.get(&other_version, later), None);
}

#[test]
fn ticket_store_expiry_test() {
    let mut store = TicketStore::new();
    store
        .insert(ticket_key("a.example"), ticket(Duration::from_secs(1), b"t"))
        .unwrap();

    assert!(store.get(&ticket_key("a.example"), now()).is_some());
    let expiry = now() + Duration::from_secs(1);
    assert!(store.get(&ticket_key("a.example"), expiry).is_none());

    store.remove_expired(expiry);
    assert!(store.is_empty());
}

#[test]
fn missing_file_test() {
    let dir = tempfile::tempdir().unwrap();

    let mut tickets = TicketStore::new();
    assert_eq!(tickets.load(dir.path().join("missing"), now()).unwrap(), 0);

    let mut tokens = TokenStore::new();
    assert_eq!(tokens.load(dir.path().join("missing"), now()).unwrap(), 0);
}

#[test]
fn unexpected_tag_test() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.bin");

    TokenStore::new().save(&path).unwrap();
    let mut tickets = TicketStore::new();
    assert!(matches!(
        tickets.load(&path, now()),
        Err(Error::UnexpectedTag)
    ));
}

#[test]
fn truncated_file_test() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tickets.bin");

    let mut store = TicketStore::new();
    store
        .insert(ticket_key("a.example"), ticket(Duration::from_secs(60), b"ticket"))
        .unwrap();
    store.save(&path).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes.truncate(bytes.len() - 2);
    std::fs::write(&path, bytes).unwrap();

    let mut loaded = TicketStore::new();
    assert!(matches!(loaded.load(&path, now()), Err(Error::Format(_))));
    assert!(loaded.is_empty());
}

#[test]
fn field_too_long_test() {
    let mut store = TicketStore::new();
    let contents = Bytes::from(vec![0u8; u16::MAX as usize + 1]);
    let result = store.insert(
        ticket_key("a.example"),
        Ticket {
            valid_until: now(),
            ticket: contents,
        },
    );
    assert!(matches!(result, Err(Error::FieldTooLong)));
    assert!(store.is_empty());
}

#[test]
fn token_store_round_trip_test() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.bin");

    let v4 = TokenKey {
        server_name: "a.example".into(),
        ip: IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10)),
    };
    let v6 = TokenKey {
        server_name: "a.example".into(),
        ip: IpAddr::V6(Ipv6Addr::LOCALHOST),
    };
    let token = |contents: &'static [u8]| Token {
        valid_until: now() + Duration::from_secs(60),
        token: Bytes::from_static(contents),
    };

    let mut store = TokenStore::new();
    store.insert(v4.clone(), token(b"four")).unwrap();
    store.insert(v6.clone(), token(b"six")).unwrap();
    store.save(&path).unwrap();

    let mut loaded = TokenStore::new();
    assert_eq!(loaded.load(&path, now()).unwrap(), 2);
    assert_eq!(loaded.get(&v6, now()), Some(&token(b"six")));

    // a token is only presented once
    assert_eq!(loaded.take(&v4, now()), Some(token(b"four")));
    assert_eq!(loaded.take(&v4, now()), None);
    assert_eq!(loaded.len(), 1);
}
