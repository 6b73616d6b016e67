//! End-to-end convergence tests over randomized item sets.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rangesync::Reconciler;

const TIMESTAMP_WINDOW: std::ops::Range<u64> = 1_677_970_534..1_677_980_534;

fn random_id(rng: &mut StdRng, id_size: usize) -> Vec<u8> {
    let mut id = vec![0u8; id_size];
    rng.fill(&mut id[..]);
    id
}

struct Outcome {
    have: Vec<Vec<u8>>,
    need: Vec<Vec<u8>>,
    rounds: usize,
    max_initiator_frame: usize,
}

/// Drive both sides to convergence, panicking if `max_rounds` is exceeded.
fn drive(
    initiator: &mut Reconciler,
    responder: &mut Reconciler,
    frame_size_limit: u64,
    max_rounds: usize,
) -> Outcome {
    let mut have = Vec::new();
    let mut need = Vec::new();

    let mut frame = initiator.initiate(frame_size_limit).unwrap();
    let mut max_initiator_frame = frame.len();

    for rounds in 1..=max_rounds {
        let reply = responder.reconcile(&frame).unwrap();
        frame = initiator
            .reconcile_with_ids(&reply, &mut have, &mut need)
            .unwrap();
        max_initiator_frame = max_initiator_frame.max(frame.len());

        if reply.is_empty() && frame.is_empty() {
            return Outcome {
                have,
                need,
                rounds,
                max_initiator_frame,
            };
        }
    }

    panic!("no convergence within {max_rounds} rounds");
}

/// Build the two sides from shared items plus per-side extras.
fn build_sides(
    id_size: usize,
    shared: &[(u64, Vec<u8>)],
    ours: &[(u64, Vec<u8>)],
    theirs: &[(u64, Vec<u8>)],
) -> (Reconciler, Reconciler) {
    let mut initiator = Reconciler::new(id_size).unwrap();
    let mut responder = Reconciler::new(id_size).unwrap();

    for (timestamp, id) in shared {
        initiator.add_item(*timestamp, id).unwrap();
        responder.add_item(*timestamp, id).unwrap();
    }
    for (timestamp, id) in ours {
        initiator.add_item(*timestamp, id).unwrap();
    }
    for (timestamp, id) in theirs {
        responder.add_item(*timestamp, id).unwrap();
    }

    initiator.seal().unwrap();
    responder.seal().unwrap();
    (initiator, responder)
}

fn id_set(ids: &[(u64, Vec<u8>)]) -> HashSet<Vec<u8>> {
    ids.iter().map(|(_, id)| id.clone()).collect()
}

fn assert_exact_difference(outcome: &Outcome, ours: &[(u64, Vec<u8>)], theirs: &[(u64, Vec<u8>)]) {
    let have: HashSet<Vec<u8>> = outcome.have.iter().cloned().collect();
    let need: HashSet<Vec<u8>> = outcome.need.iter().cloned().collect();

    // No id reported twice, and the two sets are disjoint.
    assert_eq!(have.len(), outcome.have.len(), "duplicate have ids");
    assert_eq!(need.len(), outcome.need.len(), "duplicate need ids");
    assert!(have.is_disjoint(&need));

    assert_eq!(have, id_set(ours));
    assert_eq!(need, id_set(theirs));
}

#[test]
fn test_randomized_sets_converge() {
    for iter in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(iter);

        let shared_count = rng.gen_range(0..500);
        let ours_count = rng.gen_range(0..50);
        let theirs_count = rng.gen_range(0..50);

        let mut draw = |count: usize| -> Vec<(u64, Vec<u8>)> {
            (0..count)
                .map(|_| (rng.gen_range(TIMESTAMP_WINDOW), random_id(&mut rng, 16)))
                .collect()
        };
        let shared = draw(shared_count);
        let ours = draw(ours_count);
        let theirs = draw(theirs_count);

        let (mut initiator, mut responder) = build_sides(16, &shared, &ours, &theirs);
        let outcome = drive(&mut initiator, &mut responder, 0, 64);
        assert_exact_difference(&outcome, &ours, &theirs);
    }
}

#[test]
fn test_single_difference_in_large_sets() {
    let mut rng = StdRng::seed_from_u64(4);

    let shared: Vec<(u64, Vec<u8>)> = (0..10_000)
        .map(|_| (rng.gen_range(TIMESTAMP_WINDOW), random_id(&mut rng, 16)))
        .collect();
    let ours = vec![(rng.gen_range(TIMESTAMP_WINDOW), random_id(&mut rng, 16))];
    let theirs = vec![(rng.gen_range(TIMESTAMP_WINDOW), random_id(&mut rng, 16))];

    let (mut initiator, mut responder) = build_sides(16, &shared, &ours, &theirs);
    let outcome = drive(&mut initiator, &mut responder, 0, 64);

    assert_exact_difference(&outcome, &ours, &theirs);
    assert_eq!(outcome.have.len(), 1);
    assert_eq!(outcome.need.len(), 1);

    // Each round narrows mismatched ranges by a factor of 16.
    assert!(
        outcome.rounds <= 12,
        "expected logarithmic convergence, took {} rounds",
        outcome.rounds
    );
}

#[test]
fn test_frame_size_limit_is_honored() {
    let mut rng = StdRng::seed_from_u64(5);

    let shared: Vec<(u64, Vec<u8>)> = (0..10_000)
        .map(|_| (rng.gen_range(TIMESTAMP_WINDOW), random_id(&mut rng, 16)))
        .collect();
    let ours: Vec<(u64, Vec<u8>)> = (0..100)
        .map(|_| (rng.gen_range(TIMESTAMP_WINDOW), random_id(&mut rng, 16)))
        .collect();
    let theirs: Vec<(u64, Vec<u8>)> = (0..100)
        .map(|_| (rng.gen_range(TIMESTAMP_WINDOW), random_id(&mut rng, 16)))
        .collect();

    let (mut initiator, mut responder) = build_sides(16, &shared, &ours, &theirs);
    let outcome = drive(&mut initiator, &mut responder, 1024, 1000);

    // Deferred outputs spread the dialog over more rounds, but every
    // initiator frame stays within the limit and everything still arrives.
    assert!(
        outcome.max_initiator_frame <= 1024,
        "frame of {} bytes exceeds limit",
        outcome.max_initiator_frame
    );
    assert_exact_difference(&outcome, &ours, &theirs);
}

#[test]
fn test_empty_initiator_against_large_responder() {
    let mut rng = StdRng::seed_from_u64(6);

    let theirs: Vec<(u64, Vec<u8>)> = (0..1000)
        .map(|_| (rng.gen_range(TIMESTAMP_WINDOW), random_id(&mut rng, 16)))
        .collect();

    let (mut initiator, mut responder) = build_sides(16, &[], &[], &theirs);
    let outcome = drive(&mut initiator, &mut responder, 0, 64);
    assert_exact_difference(&outcome, &[], &theirs);
}
