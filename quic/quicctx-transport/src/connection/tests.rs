// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::{
    callback::Event,
    config::{Config, PreferredAddress, SpinBitPolicy, TransportParameters},
    error::Error,
    testing::{v4, Harness},
    tls,
};
use bytes::Bytes;
use core::time::Duration;
use insta::assert_debug_snapshot;
use quicctx_core::{
    packet::PacketNumberSpace,
    stateless_reset,
    time::Timestamp,
    transport::{self, error::LOCAL_ERROR_CLASS},
    version,
};

fn config() -> Config {
    Config::new().with_random_initial(false).unwrap()
}

fn client(harness: &mut Harness) -> Connection {
    let parameters = harness.client();
    harness.build(&config(), parameters).unwrap()
}

fn ready_client(harness: &mut Harness) -> Connection {
    let mut connection = client(harness);
    connection.set_state(State::Ready, &mut harness.shared());
    connection
}

fn server(harness: &mut Harness, config: &Config) -> Result<Connection, Error> {
    let initial_id = InitialId::try_from_bytes(&[7; 8]).unwrap();
    let remote_id = PeerId::try_from_bytes(&[8; 8]).unwrap();
    let parameters = Parameters::server(initial_id, remote_id, version::V1)
        .with_local_addr(v4(1, 443))
        .with_peer_addr(v4(50, 6000));
    harness.build(config, parameters)
}

#[test]
fn handshake_error_test() {
    let mut harness = Harness::new();
    let mut connection = client(&mut harness);

    let error = transport::Error::PROTOCOL_VIOLATION
        .with_reason("bad frame")
        .with_frame_type(0x1c);
    connection.connection_error(error, &mut harness.shared());

    assert_eq!(connection.state(), State::HandshakeFailure);
    assert_eq!(connection.close_reasons().local, Some(0xa));
    assert_eq!(connection.offending_frame_type(), Some(0x1c));
    assert_eq!(connection.local_error_reason(), "bad frame");

    // a failing connection keeps its first error
    connection.connection_error(
        transport::Error::FRAME_ENCODING_ERROR.with_frame_type(0x18),
        &mut harness.shared(),
    );
    assert_eq!(connection.state(), State::HandshakeFailure);
    assert_eq!(connection.close_reasons().local, Some(0xa));
    assert_eq!(connection.offending_frame_type(), Some(0x1c));
}

#[test]
fn ready_error_test() {
    let mut harness = Harness::new();
    let mut connection = ready_client(&mut harness);

    connection.connection_error(
        transport::Error::new(LOCAL_ERROR_CLASS + 3),
        &mut harness.shared(),
    );

    assert_eq!(connection.state(), State::Disconnecting);
    assert_eq!(
        connection.close_reasons().local,
        Some(transport::Error::INTERNAL_ERROR.code)
    );
}

#[test]
fn close_test() {
    let mut harness = Harness::new();
    let mut connection = ready_client(&mut harness);

    connection.close(0x42, &mut harness.shared());
    assert_eq!(connection.state(), State::Disconnecting);
    assert_eq!(connection.close_reasons().local_application, Some(0x42));

    // closing twice keeps the first code
    connection.close(0x43, &mut harness.shared());
    assert_eq!(connection.close_reasons().local_application, Some(0x42));

    connection.disconnect(&mut harness.shared());
    connection.disconnect(&mut harness.shared());
    assert_eq!(connection.state(), State::Disconnected);
    assert_eq!(harness.callback().events(), [Event::Close]);
    assert_eq!(harness.subscriber.count("connection_closed"), 1);
    assert_eq!(
        connection.close_reasons().to_error(),
        quicctx_core::connection::Error::Application(0x42)
    );
}

#[test]
fn close_during_handshake_test() {
    let mut harness = Harness::new();
    let mut connection = client(&mut harness);

    connection.close(0, &mut harness.shared());
    assert_eq!(connection.state(), State::HandshakeFailure);
}

#[test]
fn peer_close_test() {
    let mut harness = Harness::new();
    let mut connection = ready_client(&mut harness);

    connection.on_peer_close(Some(0x3), None, &mut harness.shared());
    assert_eq!(connection.state(), State::ClosingReceived);
    assert_eq!(
        connection.close_reasons(),
        CloseReasons {
            remote: Some(0x3),
            ..Default::default()
        }
    );
}

#[test]
fn state_events_test() {
    let mut harness = Harness::new();
    let mut connection = client(&mut harness);
    harness.subscriber.clear();

    connection.set_state(State::ClientInitSent, &mut harness.shared());
    connection.set_state(State::ClientInitSent, &mut harness.shared());
    connection.set_state(State::Ready, &mut harness.shared());

    assert_debug_snapshot!(harness.subscriber.output(), @r###"
    [
        "connection_state_changed conn=0 client_init -> client_init_sent",
        "connection_state_changed conn=0 client_init_sent -> ready",
    ]
    "###);
}

#[test]
fn key_rotation_test() {
    let mut harness = Harness::new();
    let mut connection = client(&mut harness);
    assert_eq!(connection.start_key_rotation(), Err(Error::KeyRotationNotReady));

    connection.set_state(State::Ready, &mut harness.shared());
    // nothing of the current epoch was acknowledged yet
    assert_eq!(connection.start_key_rotation(), Err(Error::KeyRotationNotReady));

    let now = harness.now;
    let space = &mut connection.packet_spaces[PacketNumberSpace::ApplicationData.as_index()];
    for _ in 0..5 {
        space.on_packet_sent(Some(0), 1200, now);
    }
    space.on_packet_acked(0, now);

    assert_eq!(connection.start_key_rotation(), Ok(()));
    assert_eq!(connection.crypto_epoch_sequence(), 5);
    assert_eq!(harness.tls.stats.rotations.get(), 1);

    // the new epoch has to be acknowledged before the next rotation
    assert_eq!(connection.start_key_rotation(), Err(Error::KeyRotationNotReady));
}

#[test]
fn failed_session_rolls_back_test() {
    let mut harness = Harness::new();
    harness.tls.fail_sessions = true;

    let parameters = harness.client();
    let result = harness.build(&config(), parameters);

    assert_eq!(result.err(), Some(Error::Tls(tls::Error::SessionCreation)));
    assert!(harness.id_tables.is_empty());
    assert!(harness.scheduler.is_empty());
    // the application never saw the connection
    assert!(harness.callback().events().is_empty());
    assert_eq!(harness.subscriber.count("connection_created"), 0);
}

#[test]
fn failed_session_reports_no_path_test() {
    let mut harness = Harness::new();
    harness.tls.fail_sessions = true;
    let config = config().with_path_callbacks(true).unwrap();

    let parameters = harness.client();
    let result = harness.build(&config, parameters);

    assert!(result.is_err());
    assert!(harness.callback().events().is_empty());
    assert!(harness.scheduler.is_empty());
    assert!(harness.id_tables.is_empty());
}

#[test]
fn teardown_with_failing_callback_test() {
    let mut harness = Harness::new();
    let config = config().with_path_callbacks(true).unwrap();
    let parameters = harness.client();
    let mut connection = harness.build(&config, parameters).unwrap();
    connection.set_state(State::Ready, &mut harness.shared());

    harness.callback().set_fail(true);
    connection.teardown(&mut harness.shared());

    assert_eq!(connection.state(), State::Disconnected);
    assert!(harness
        .callback()
        .events()
        .iter()
        .any(|event| matches!(event, Event::PathDeleted(_))));
    // the failed callback does not bring the connection back
    assert!(harness.scheduler.is_empty());
    assert_eq!(connection.close_reasons().local, None);
}

#[test]
fn closing_connection_records_frame_type_test() {
    let mut harness = Harness::new();
    let mut connection = ready_client(&mut harness);

    connection.close(0x42, &mut harness.shared());
    assert_eq!(connection.offending_frame_type(), None);

    connection.connection_error(
        transport::Error::FRAME_ENCODING_ERROR.with_frame_type(0x18),
        &mut harness.shared(),
    );
    assert_eq!(connection.offending_frame_type(), Some(0x18));
    assert_eq!(connection.close_reasons().local, None);

    // later errors never replace a known frame type
    connection.connection_error(
        transport::Error::PROTOCOL_VIOLATION.with_frame_type(0x1c),
        &mut harness.shared(),
    );
    assert_eq!(connection.offending_frame_type(), Some(0x18));

    connection.disconnect(&mut harness.shared());
    harness.scheduler.remove(connection.id());
    connection.connection_error(
        transport::Error::PROTOCOL_VIOLATION,
        &mut harness.shared(),
    );
    assert!(harness.scheduler.is_empty());
}

#[test]
fn reset_test() {
    let mut harness = Harness::new();
    let mut connection = client(&mut harness);
    let now = harness.now;
    connection.packet_spaces[PacketNumberSpace::Initial.as_index()].on_packet_sent(Some(0), 1200, now);
    connection.packet_spaces[PacketNumberSpace::ApplicationData.as_index()]
        .on_packet_sent(Some(0), 1200, now);

    connection.reset(&mut harness.shared()).unwrap();

    // handshake packets are dropped but packet numbers keep increasing
    let initial = connection.packet_space(PacketNumberSpace::Initial);
    assert_eq!(initial.in_flight().count(), 0);
    assert_eq!(initial.send_sequence, 1);
    let application = connection.packet_space(PacketNumberSpace::ApplicationData);
    assert_eq!(application.in_flight().count(), 1);
    assert_eq!(harness.tls.stats.sessions.get(), 2);
    assert_eq!(harness.tls.stats.initial_keys.get(), 2);
}

#[test]
fn teardown_test() {
    let mut harness = Harness::new();
    let mut connection = ready_client(&mut harness);
    assert!(!harness.id_tables.is_empty());

    connection.teardown(&mut harness.shared());

    assert!(connection.paths().is_empty());
    assert!(harness.id_tables.is_empty());
    assert!(harness.scheduler.is_empty());
    assert_eq!(harness.callback().events(), [Event::Close]);
}

#[test]
fn keep_alive_test() {
    let mut harness = Harness::new();
    let config = config()
        .with_idle_timeout(Duration::from_secs(10))
        .unwrap()
        .with_keep_alive_interval(Duration::from_secs(4))
        .unwrap();
    let parameters = harness.client();
    let mut connection = harness.build(&config, parameters).unwrap();
    assert_eq!(connection.keep_alive_interval(), Some(Duration::from_secs(4)));

    // half of the idle timeout
    connection.enable_keep_alive(Duration::ZERO);
    assert_eq!(connection.keep_alive_interval(), Some(Duration::from_secs(5)));

    connection.disable_keep_alive();
    assert_eq!(connection.keep_alive_interval(), None);
}

#[test]
fn app_wake_time_test() {
    let mut harness = Harness::new();
    let mut connection = client(&mut harness);
    let id = connection.id();
    let now = harness.now;

    connection.reinsert(&mut harness.scheduler, now + Duration::from_millis(100));
    connection.set_app_wake_time(now + Duration::from_millis(10), &mut harness.shared());
    assert_eq!(
        harness.scheduler.wake_time(id),
        Some(now + Duration::from_millis(10))
    );

    // a later application wake never delays the connection
    connection.set_app_wake_time(now + Duration::from_millis(50), &mut harness.shared());
    assert_eq!(connection.wake_time(), now + Duration::from_millis(10));

    connection.set_app_wake_time(Timestamp::ZERO, &mut harness.shared());
    assert_eq!(connection.wake_time(), now + Duration::from_millis(10));
}

#[test]
fn misc_frames_wake_test() {
    let mut harness = Harness::new();
    let mut connection = client(&mut harness);
    let now = harness.now;
    connection.reinsert(&mut harness.scheduler, now + Duration::from_secs(1));

    connection.queue_misc_frame(
        Bytes::from_static(&[0x1e]),
        false,
        PacketNumberSpace::Handshake,
        &mut harness.shared(),
    );
    connection.queue_datagram_frame(Bytes::from_static(b"data"), &mut harness.shared());
    assert_eq!(connection.wake_time(), now);
    assert_eq!(connection.misc_frames().len(), 1);
    assert_eq!(connection.datagram_frames().len(), 1);

    connection.purge_misc_frames_after_ready();
    assert!(connection.misc_frames().is_empty());
}

#[test]
fn spin_bit_policy_test() {
    let mut harness = Harness::new();
    let mut connection = client(&mut harness);

    assert_eq!(
        connection.set_spin_bit_policy(SpinBitPolicy::On),
        Err(Error::InvalidArgument)
    );
    connection.set_spin_bit_policy(SpinBitPolicy::Random).unwrap();
    assert_eq!(connection.settings().spin_bit_policy, SpinBitPolicy::Random);

    // `On` is only accepted as a default, and never randomized
    let config = config().with_spin_bit_policy(SpinBitPolicy::On).unwrap();
    let parameters = harness.client();
    let connection = harness.build(&config, parameters).unwrap();
    assert_eq!(connection.settings().spin_bit_policy, SpinBitPolicy::Basic);
}

#[test]
fn version_selection_test() {
    let mut harness = Harness::new();

    let parameters = harness.client().with_preferred_version(version::V2);
    let connection = harness.build(&config(), parameters).unwrap();
    assert_eq!(connection.version(), version::V2);

    let grease = 0x1a2a_3a4a;
    let parameters = harness.client().with_preferred_version(grease);
    let mut connection = harness.build(&config(), parameters).unwrap();
    assert_eq!(connection.proposed_version(), grease);
    assert_eq!(connection.version(), version::V1);

    assert!(!connection.is_version_negotiation_armed());
    connection.set_desired_version(version::V2);
    assert!(connection.is_version_negotiation_armed());
    assert_eq!(connection.desired_version(), Some(version::V2));

    let parameters = harness.client();
    let mut connection = harness.build(&config(), parameters).unwrap();
    connection.set_rejected_version(version::V1);
    assert!(connection.is_version_negotiation_armed());
    assert_eq!(connection.rejected_version(), Some(version::V1));
    assert_eq!(connection.desired_version(), None);
}

#[test]
fn zero_length_server_ids_disable_migration_test() {
    let mut harness = Harness::new();
    let config = config().with_local_id_len(0).unwrap();
    let connection = server(&mut harness, &config).unwrap();

    assert!(connection.local_parameters().migration_disabled);
    assert!(connection.is_half_open());
    // servers without local IDs are not found by their initial ID
    assert_eq!(
        harness
            .id_tables
            .lookup_initial_id(connection.initial_id(), &v4(50, 6000)),
        None
    );
}

#[test]
fn preferred_address_test() {
    let mut harness = Harness::new();
    let parameters = TransportParameters {
        preferred_address: Some(PreferredAddress {
            ipv4: Some("192.0.2.200:443".parse().unwrap()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let config = config().with_transport_parameters(parameters).unwrap();
    let connection = server(&mut harness, &config).unwrap();

    let list = connection.local_ids().list(0).unwrap();
    assert_eq!(list.len(), 2);
    let entry = list.get(1).unwrap();
    let preferred = connection.local_parameters().preferred_address.unwrap();
    assert_eq!(preferred.connection_id, entry.id);
    assert_eq!(
        preferred.stateless_reset_token,
        crate::id_tables::stateless_reset_token(&[2; stateless_reset::LEN], &entry.id)
    );
}

#[test]
fn server_requires_initial_id_test() {
    let mut harness = Harness::new();
    let mut parameters = Parameters::client(v4(10, 4433));
    parameters.endpoint_type = quicctx_core::endpoint::Type::Server;

    assert_eq!(
        harness.build(&config(), parameters).err(),
        Some(Error::InvalidArgument)
    );
}
