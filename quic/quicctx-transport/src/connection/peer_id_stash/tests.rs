// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use bolero::{check, generator::*};
use quicctx_core::stateless_reset::testing::*;

fn id(bytes: &[u8]) -> PeerId {
    PeerId::try_from_bytes(bytes).unwrap()
}

fn secret(value: u8) -> stateless_reset::Secret {
    [value; stateless_reset::LEN].into()
}

#[test]
fn duplicate_rejection_test() {
    let mut stash = Stash::new(0);

    assert_eq!(
        stash.add(3, id(&[0xaa]), TEST_SECRET_1, 2),
        Ok(AddOutcome::Added)
    );
    assert_eq!(
        stash.add(3, id(&[0xaa]), TEST_SECRET_1, 2),
        Ok(AddOutcome::Duplicate)
    );
    assert_eq!(
        stash.add(3, id(&[0xbb]), TEST_SECRET_2, 2),
        Err(StashError::SequenceReused)
    );
    assert_eq!(
        stash.add(4, id(&[0xaa]), TEST_SECRET_1, 2),
        Err(StashError::IdReused)
    );
    assert_eq!(
        stash.add(5, id(&[0xcc]), TEST_SECRET_1, 2),
        Err(StashError::SecretReused)
    );
    assert_eq!(stash.len(), 1);

    let error = transport::Error::from(StashError::SequenceReused);
    assert_eq!(error.code, transport::Error::PROTOCOL_VIOLATION.code);
}

#[test]
fn capacity_test() {
    let mut stash = Stash::new(0);

    for sequence in 1..=4u8 {
        assert_eq!(
            stash.add(sequence as u64, id(&[sequence]), secret(sequence), 2),
            Ok(AddOutcome::Added)
        );
    }
    assert_eq!(
        stash.add(5, id(&[5]), secret(5), 2),
        Err(StashError::LimitExceeded)
    );

    let error = transport::Error::from(StashError::LimitExceeded);
    assert_eq!(error.code, transport::Error::CONNECTION_ID_LIMIT_ERROR.code);
    insta::assert_snapshot!(error, @"too many connection IDs");
}

#[test]
fn retired_ids_make_room_test() {
    let mut stash = Stash::new(0);
    for sequence in 1..=4u8 {
        stash
            .add(sequence as u64, id(&[sequence]), secret(sequence), 2)
            .unwrap();
    }

    stash.raise_retire_before(3);
    assert_eq!(stash.remove_not_before(3), vec![1, 2]);
    assert_eq!(
        stash.add(5, id(&[5]), secret(5), 2),
        Ok(AddOutcome::Added)
    );
}

#[test]
fn obtain_first_fit_test() {
    let mut stash = Stash::new(0);
    stash.add(1, id(&[1]), secret(1), 4).unwrap();
    stash.add(2, id(&[2]), secret(2), 4).unwrap();

    assert_eq!(stash.obtain().map(|entry| entry.sequence), Some(1));
    stash.reference(1);
    assert_eq!(stash.obtain().map(|entry| entry.sequence), Some(2));
    stash.reference(2);
    assert!(stash.obtain().is_none());
}

#[test]
fn empty_id_is_shared_test() {
    let mut stash = Stash::new(0);
    stash.insert_initial(PeerId::EMPTY, TEST_SECRET_3);
    assert_eq!(stash.obtain().map(|entry| entry.sequence), Some(0));
}

#[test]
fn two_phase_retirement_test() {
    let mut stash = Stash::new(0);
    stash.add(1, id(&[1]), secret(1), 4).unwrap();
    stash.reference(1);

    // still referenced by a path
    assert!(stash.remove_not_before(2).is_empty());
    assert_eq!(stash.referenced_for_removal().collect::<Vec<_>>(), [1]);

    let released = stash.release(1, false);
    assert_eq!(
        released,
        Released {
            retire: Some(1),
            removed: false
        }
    );
    assert_eq!(stash.get(1).unwrap().retirement, Retirement::RetirePending);

    // retiring again does not queue a second frame
    assert!(stash.remove_not_before(2).is_empty());

    assert!(stash.on_retire_acked(1));
    assert!(stash.get(1).is_none());
    assert!(!stash.on_retire_acked(1));
}

#[test]
fn deleting_skips_retirement_test() {
    let mut stash = Stash::new(0);
    stash.add(1, id(&[1]), secret(1), 4).unwrap();
    stash.reference(1);
    assert_eq!(
        stash.release(1, true),
        Released {
            retire: None,
            removed: true
        }
    );
    assert!(stash.is_empty());
}

#[test]
fn first_idle_stash_test() {
    let mut stashes = Stashes::default();
    stashes.get_or_create(0);
    stashes.get_or_create(2).in_use = true;
    stashes.get_or_create(3);
    assert_eq!(stashes.first_idle(), Some(3));
    stashes.remove(3);
    assert_eq!(stashes.first_idle(), None);
}

#[derive(Clone, Copy, Debug, TypeGenerator)]
enum Operation {
    Add { sequence: u8 },
    Reference { sequence: u8 },
    Release { sequence: u8 },
    RemoveNotBefore { threshold: u8 },
    RetireAcked { sequence: u8 },
}

#[test]
fn referenced_entries_survive_removal_test() {
    check!()
        .with_type::<Vec<Operation>>()
        .for_each(|operations| {
            let mut stash = Stash::new(0);
            let mut removed = Vec::new();

            for operation in operations {
                match *operation {
                    Operation::Add { sequence } => {
                        let outcome =
                            stash.add(sequence as u64, id(&[sequence]), secret(sequence), 16);
                        if outcome == Ok(AddOutcome::Added) {
                            removed.retain(|removed| *removed != sequence as u64);
                        }
                    }
                    Operation::Reference { sequence } => {
                        stash.reference(sequence as u64);
                    }
                    Operation::Release { sequence } => {
                        if stash.get(sequence as u64).is_some_and(|entry| entry.refs > 0)
                            && stash.release(sequence as u64, false).removed
                        {
                            removed.push(sequence as u64);
                        }
                    }
                    Operation::RemoveNotBefore { threshold } => {
                        let referenced: Vec<_> = stash
                            .iter()
                            .filter(|entry| entry.refs > 0)
                            .map(|entry| entry.sequence)
                            .collect();
                        let before: Vec<_> = stash.iter().map(|entry| entry.sequence).collect();
                        stash.remove_not_before(threshold as u64);
                        for sequence in referenced {
                            assert!(stash.get(sequence).is_some());
                        }
                        for sequence in before {
                            if stash.get(sequence).is_none() {
                                removed.push(sequence);
                            }
                        }
                    }
                    Operation::RetireAcked { sequence } => {
                        let referenced = stash
                            .get(sequence as u64)
                            .is_some_and(|entry| entry.refs > 0);
                        if stash.on_retire_acked(sequence as u64) {
                            assert!(!referenced);
                            removed.push(sequence as u64);
                        }
                    }
                }

                // every entry is deleted at most once
                let mut sorted = removed.clone();
                sorted.sort_unstable();
                sorted.dedup();
                assert_eq!(sorted.len(), removed.len());
            }
        });
}
