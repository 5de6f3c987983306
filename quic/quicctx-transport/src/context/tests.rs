// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::{
    callback::Event,
    config::{LossBitPolicy, PmtudPolicy, SpinBitPolicy},
    congestion,
    connection::{PeerId, Settings, State},
    testing::{self, callback::Recorder, v4},
};
use insta::assert_debug_snapshot;
use quicctx_core::version;

fn now() -> Timestamp {
    Timestamp::from_micros(1_000_000)
}

fn context(config: Config) -> (Context, event::testing::Subscriber) {
    context_with_tls(config, testing::tls::Provider::default())
}

fn context_with_tls(
    config: Config,
    tls: testing::tls::Provider,
) -> (Context, event::testing::Subscriber) {
    let subscriber = event::testing::Subscriber::new();
    let context = Context::new(
        config,
        Box::new(tls),
        Box::new(random::testing::Generator(0x40)),
        Box::new(subscriber.clone()),
    );
    (context, subscriber)
}

fn server_config(max_connections: u32, max_half_open: u32) -> Config {
    Config::new()
        .with_max_connections(max_connections)
        .unwrap()
        .with_max_half_open_before_retry(max_half_open)
        .unwrap()
}

/// Server parameters for the first Initial of client `n`
fn server(n: u8) -> Parameters {
    let initial_id = InitialId::try_from_bytes(&[n; 8]).unwrap();
    let remote_id = PeerId::try_from_bytes(&[0x80 | n; 8]).unwrap();
    Parameters::server(initial_id, remote_id, version::V1)
        .with_local_addr(v4(1, 443))
        .with_peer_addr(v4(100 + n, 5000))
}

fn client() -> Parameters {
    Parameters::client(v4(10, 4433)).with_local_addr(v4(1, 5000))
}

#[test]
fn half_open_threshold_test() {
    let (mut context, _) = context(server_config(16, 2));

    let first = context.create_connection(server(1), now()).unwrap();
    context.create_connection(server(2), now()).unwrap();
    assert_eq!(context.half_open(), 2);
    assert!(!context.is_token_check_required());

    context.create_connection(server(3), now()).unwrap();
    assert_eq!(context.half_open(), 3);
    assert!(context.is_token_check_required());

    context.delete_connection(first, now()).unwrap();
    assert_eq!(context.half_open(), 2);
    assert!(!context.is_token_check_required());
}

#[test]
fn handshake_completion_clears_half_open_test() {
    let (mut context, _) = context(server_config(16, 2));
    let id = context.create_connection(server(1), now()).unwrap();
    assert!(context.connection(id).unwrap().is_half_open());

    context
        .with_connection(id, now(), |connection, shared| {
            connection.set_state(State::ServerAlmostReady, shared);
        })
        .unwrap();
    assert_eq!(context.half_open(), 1);

    context
        .with_connection(id, now(), |connection, shared| {
            connection.set_state(State::Ready, shared);
        })
        .unwrap();
    assert_eq!(context.half_open(), 0);
    assert!(!context.connection(id).unwrap().is_half_open());

    // a completed connection is not counted again when it closes
    context.delete_connection(id, now()).unwrap();
    assert_eq!(context.half_open(), 0);
}

#[test]
fn cookie_mode_test() {
    let (mut context, _) = context(server_config(16, 2));
    assert!(!context.is_token_check_required());

    context.set_cookie_mode(CookieMode::from_bits(1));
    assert!(context.is_token_check_required());
    assert!(!context.cookie_mode().provide_token);

    context.set_cookie_mode(CookieMode::from_bits(2));
    assert!(!context.is_token_check_required());
    assert!(context.cookie_mode().provide_token);
}

#[test]
fn client_only_test() {
    let tls = testing::tls::Provider {
        has_server_credentials: false,
        ..Default::default()
    };
    let (mut context, _) = context_with_tls(server_config(16, 2), tls);
    assert!(context.is_client_only());

    assert_eq!(
        context.create_connection(server(1), now()),
        Err(Error::ConnectionRefused)
    );
    assert!(context.create_connection(client(), now()).is_ok());
    assert_eq!(context.len(), 1);
}

#[test]
fn zero_max_connections_test() {
    let config = Config::new().with_max_connections(0).unwrap();
    let (context, _) = context(config);
    assert_eq!(context.max_connections(), 1);
    assert_eq!(context.config().max_connections(), 1);
}

#[test]
fn connection_limit_test() {
    let (mut context, _) = context(server_config(2, 64));
    let first = context.create_connection(server(1), now()).unwrap();
    context.create_connection(server(2), now()).unwrap();
    assert_eq!(
        context.create_connection(server(3), now()),
        Err(Error::ConnectionRefused)
    );

    assert_eq!(context.adjust_max_connections(3), Err(Error::InvalidArgument));

    // the lower limit applies once enough connections closed
    context.adjust_max_connections(1).unwrap();
    assert_eq!(context.max_connections(), 2);
    context.delete_connection(first, now()).unwrap();
    assert_eq!(context.max_connections(), 1);
    assert_eq!(
        context.create_connection(server(4), now()),
        Err(Error::ConnectionRefused)
    );
}

#[test]
fn round_trip_config_test() {
    let config = Config::new()
        .with_padding(128, 1200)
        .unwrap()
        .with_spin_bit_policy(SpinBitPolicy::Null)
        .unwrap()
        .with_loss_bit_policy(LossBitPolicy::SendReceive)
        .unwrap()
        .with_pmtud_policy(PmtudPolicy::Delayed)
        .unwrap()
        .with_stream_priority(3)
        .unwrap();
    let (mut context, _) = context(config.clone());

    let id = context.create_connection(client(), now()).unwrap();
    let connection = context.connection(id).unwrap();

    assert_eq!(connection.local_parameters(), &config.transport_parameters());
    assert_eq!(connection.settings(), &Settings::from(&config));
    assert_eq!(connection.settings().padding, config.padding());
    assert_eq!(connection.settings().spin_bit_policy, SpinBitPolicy::Null);
    assert_eq!(connection.settings().pmtud_policy, PmtudPolicy::Delayed);
}

#[test]
fn delete_reports_close_test() {
    let (mut context, subscriber) = context(Config::new());
    let recorder = Recorder::new();
    context.set_default_callback(Some(recorder.handle()));

    let id = context.create_connection(client(), now()).unwrap();
    assert_eq!(context.earliest_connection(None), Some(id));

    context.delete_connection(id, now()).unwrap();
    assert_eq!(recorder.events(), [Event::Close]);
    assert_eq!(subscriber.count("connection_closed"), 1);
    assert!(context.scheduler().is_empty());
    assert!(context.id_tables().is_empty());
    assert!(context.is_empty());

    assert_eq!(
        context.delete_connection(id, now()),
        Err(Error::ConnectionNotFound)
    );
}

#[test]
fn delete_with_failing_callback_test() {
    let config = Config::new().with_path_callbacks(true).unwrap();
    let (mut context, _) = context(config);
    let recorder = Recorder::new();
    let id = context
        .create_connection(client().with_callback(recorder.handle()), now())
        .unwrap();

    recorder.set_fail(true);
    context.delete_connection(id, now()).unwrap();

    assert!(recorder
        .events()
        .iter()
        .any(|event| matches!(event, Event::PathDeleted(_))));
    assert!(context.is_empty());
    assert!(context.scheduler().is_empty());
    assert_eq!(context.earliest_connection(None), None);
    assert!(context.id_tables().is_empty());
}

#[test]
fn drop_deletes_connections_test() {
    let (mut context, _) = context(Config::new());
    let recorder = Recorder::new();
    context
        .create_connection(client().with_callback(recorder.handle()), now())
        .unwrap();

    drop(context);
    assert_eq!(recorder.events(), [Event::Close]);
}

#[test]
fn server_lookup_test() {
    let (mut context, _) = context(server_config(4, 64));
    let id = context.create_connection(server(1), now()).unwrap();

    let initial_id = InitialId::try_from_bytes(&[1; 8]).unwrap();
    assert_eq!(context.lookup_initial_id(initial_id, &v4(101, 5000)), Some(id));
    assert_eq!(context.lookup_initial_id(initial_id, &v4(102, 5000)), None);

    let local_id = context
        .connection(id)
        .unwrap()
        .local_ids()
        .list(0)
        .and_then(|list| list.get(0))
        .map(|entry| entry.id)
        .unwrap();
    let route = context.lookup_local_id(&local_id).unwrap();
    assert_eq!(route.connection, id);
    assert_eq!(route.path_id, 0);

    context.delete_connection(id, now()).unwrap();
    assert_eq!(context.lookup_initial_id(initial_id, &v4(101, 5000)), None);
    assert!(context.lookup_local_id(&local_id).is_none());
}

#[test]
fn destination_unreachable_routing_test() {
    let (mut context, _) = context(Config::new());
    context.create_connection(client(), now()).unwrap();

    assert_eq!(
        context.notify_destination_unreachable_by_id(None, None, &v4(99, 1), now()),
        Err(Error::ConnectionNotFound)
    );
}

#[test]
fn stateless_packet_wake_test() {
    let (mut context, subscriber) = context(Config::new());
    let cap = Duration::from_secs(1);

    assert_eq!(context.next_wake_time(now()), Timestamp::MAX);
    assert_eq!(context.next_wake_delay(now(), cap), cap);

    let packet = StatelessPacket {
        local_addr: None,
        peer_addr: v4(20, 443),
        if_index: 0,
        bytes: Bytes::from_static(b"\x80\x00\x00"),
    };
    context.queue_stateless_packet(packet.clone(), now());
    assert_eq!(context.next_wake_time(now()), now());
    assert_eq!(context.next_wake_delay(now(), cap), Duration::ZERO);

    assert_eq!(context.dequeue_stateless_packet(), Some(packet));
    assert_eq!(context.dequeue_stateless_packet(), None);
    assert_eq!(context.next_wake_time(now()), Timestamp::MAX);

    assert_debug_snapshot!(subscriber.output(), @r###"
    [
        "stateless_packet_queued len=3",
    ]
    "###);
}

#[test]
fn connection_wake_test() {
    let (mut context, _) = context(Config::new());
    let id = context.create_connection(client(), now()).unwrap();

    assert_eq!(context.next_wake_time(now()), now());
    assert_eq!(context.earliest_connection(Some(now())), Some(id));

    let later = now() + Duration::from_millis(20);
    context
        .with_connection(id, now(), |connection, shared| {
            connection.reinsert(shared.scheduler, later);
        })
        .unwrap();
    assert_eq!(context.earliest_connection(Some(now())), None);
    assert_eq!(
        context.next_wake_delay(now(), Duration::from_secs(1)),
        Duration::from_millis(20)
    );
}

#[test]
fn token_reuse_test() {
    let (mut context, subscriber) = context(Config::new());
    let expiry = now() + Duration::from_secs(30);
    let token = b"retry-token-0123";

    assert_eq!(context.check_token_reuse(token, expiry, now()), Ok(()));
    assert_eq!(
        context.check_token_reuse(token, expiry, now()),
        Err(Error::TokenReused)
    );
    assert_eq!(
        context.check_token_reuse(b"short", expiry, now()),
        Err(Error::InvalidArgument)
    );
    assert_eq!(subscriber.output(), ["token_reuse_detected count=2"]);

    context.clear_registered_tokens(expiry + Duration::from_micros(1));
    assert_eq!(context.check_token_reuse(token, expiry, now()), Ok(()));
}

#[test]
fn issued_ticket_test() {
    let (mut context, _) = context(Config::new());
    for ticket_id in 1..=3 {
        context.remember_issued_ticket(
            ticket_id,
            Duration::from_millis(ticket_id * 10),
            ticket_id * 1000,
            &v4(30, 443),
        );
    }

    // with a limit of one connection, one ticket past the limit is kept
    assert!(context.retrieve_issued_ticket(1).is_none());
    let ticket = context.retrieve_issued_ticket(3).unwrap();
    assert_eq!(ticket.rtt, Duration::from_millis(30));
    assert_eq!(ticket.cwin, 3000);
    assert_eq!(ticket.ip(), &[192, 0, 2, 30]);
}

#[test]
fn congestion_algorithm_test() {
    let mock = Arc::new(testing::congestion::Mock::new("mock"));
    let registry = congestion::Registry::new(vec![mock.clone() as Arc<dyn congestion::Algorithm>]);
    let config = Config::new().with_congestion_registry(registry).unwrap();
    let (mut context, _) = context(config);
    let id = context.create_connection(client(), now()).unwrap();
    assert_eq!(context.connection(id).unwrap().congestion_algorithm(), None);

    assert_eq!(
        context.set_congestion_algorithm(id, "cubic", None, now()),
        Err(Error::InvalidArgument)
    );

    context
        .set_congestion_algorithm(id, "mock", Some("fast"), now())
        .unwrap();
    let connection = context.connection(id).unwrap();
    assert_eq!(connection.congestion_algorithm(), Some("mock"));
    assert_eq!(connection.settings().congestion_option.as_deref(), Some("fast"));
    assert_eq!(mock.inits(), 1);

    context.delete_connection(id, now()).unwrap();
    assert_eq!(mock.deletes(), 1);
}

#[test]
fn ticket_persistence_test() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tickets.bin");
    let key = store::TicketKey {
        server_name: "example.com".into(),
        alpn: "h3".into(),
        version: version::V1,
    };

    let (mut context, _) = context(Config::new());
    assert_eq!(context.load_tickets(&path, now()).unwrap(), 0);
    context
        .ticket_store_mut()
        .insert(
            key.clone(),
            store::Ticket {
                valid_until: now() + Duration::from_secs(3600),
                ticket: Bytes::from_static(b"session"),
            },
        )
        .unwrap();
    context.save_tickets(&path).unwrap();

    let (mut restarted, _) = self::context(Config::new());
    assert_eq!(restarted.load_tickets(&path, now()).unwrap(), 1);
    assert!(restarted.ticket_store().get(&key, now()).is_some());
    assert!(restarted.token_store().is_empty());
}

#[test]
fn service_due_connections_test() {
    let (mut context, _) = context(Config::new());
    let first = context.create_connection(client(), now()).unwrap();
    let second = context
        .create_connection(client().with_local_addr(v4(1, 5001)), now())
        .unwrap();

    let later = now() + Duration::from_millis(20);
    context
        .with_connection(second, now(), |connection, shared| {
            connection.set_app_wake_time(later, shared);
        })
        .unwrap();

    // the first connection has nothing pending and leaves the schedule
    assert_eq!(context.service_due_connections(now()), 2);
    assert_eq!(context.scheduler().wake_time(first), None);
    assert_eq!(context.scheduler().wake_time(second), Some(later));
    assert_eq!(context.earliest_connection(Some(now())), None);

    assert_eq!(context.service_due_connections(later), 1);
    assert!(context.scheduler().is_empty());
    assert_eq!(context.len(), 2);
}
