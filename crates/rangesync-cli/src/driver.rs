//! Randomized convergence driver.
//!
//! Repeatedly builds two random item sets with partial overlap, reconciles
//! them to convergence, and checks the result against the known symmetric
//! difference. `ITERS` (default 100) and `SEED` (default 0) come from the
//! environment.

use std::collections::HashSet;
use std::env;

use anyhow::{ensure, Context, Result};
use clap::Args;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rangesync::Reconciler;
use tracing::info;

const TIMESTAMP_WINDOW: std::ops::Range<u64> = 1_677_970_534..1_677_980_534;
const MAX_ROUNDS: usize = 500;

#[derive(Debug, Args)]
pub struct DriverArgs {
    /// Id size in bytes (8..=32)
    #[arg(long, default_value_t = 16)]
    pub id_size: usize,

    /// Frame size limit in bytes (0 = unbounded, otherwise >= 1024)
    #[arg(long, default_value_t = 0)]
    pub frame_size_limit: u64,
}

pub fn run(args: DriverArgs) -> Result<()> {
    let iters = env_u64("ITERS", 100)?;
    let seed = env_u64("SEED", 0)?;

    for iter in 0..iters {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(iter));
        run_iteration(&mut rng, iter, &args)
            .with_context(|| format!("iteration {iter} (seed {seed})"))?;
    }

    info!(iters, "all iterations converged");
    Ok(())
}

fn run_iteration(rng: &mut StdRng, iter: u64, args: &DriverArgs) -> Result<()> {
    let shared_count = rng.gen_range(0..2000);
    let shared = random_items(rng, shared_count, args.id_size);
    let ours_count = rng.gen_range(0..100);
    let ours = random_items(rng, ours_count, args.id_size);
    let theirs_count = rng.gen_range(0..100);
    let theirs = random_items(rng, theirs_count, args.id_size);

    let mut initiator = Reconciler::new(args.id_size)?;
    let mut responder = Reconciler::new(args.id_size)?;
    for (timestamp, id) in shared.iter().chain(&ours) {
        initiator.add_item(*timestamp, id)?;
    }
    for (timestamp, id) in shared.iter().chain(&theirs) {
        responder.add_item(*timestamp, id)?;
    }
    initiator.seal()?;
    responder.seal()?;

    let mut have_ids = Vec::new();
    let mut need_ids = Vec::new();
    let mut frame = initiator.initiate(args.frame_size_limit)?;
    let mut rounds = 0;

    loop {
        rounds += 1;
        ensure!(rounds <= MAX_ROUNDS, "no convergence within {MAX_ROUNDS} rounds");

        if args.frame_size_limit != 0 {
            ensure!(
                frame.len() as u64 <= args.frame_size_limit,
                "initiator frame of {} bytes exceeds limit",
                frame.len()
            );
        }

        let reply = responder.reconcile(&frame)?;
        frame = initiator.reconcile_with_ids(&reply, &mut have_ids, &mut need_ids)?;
        if reply.is_empty() && frame.is_empty() {
            break;
        }
    }

    let have: HashSet<&[u8]> = have_ids.iter().map(Vec::as_slice).collect();
    let need: HashSet<&[u8]> = need_ids.iter().map(Vec::as_slice).collect();
    ensure!(have.len() == have_ids.len(), "duplicate have ids");
    ensure!(need.len() == need_ids.len(), "duplicate need ids");

    let expected_have: HashSet<&[u8]> = ours.iter().map(|(_, id)| id.as_slice()).collect();
    let expected_need: HashSet<&[u8]> = theirs.iter().map(|(_, id)| id.as_slice()).collect();
    ensure!(have == expected_have, "have set mismatch");
    ensure!(need == expected_need, "need set mismatch");

    info!(
        iter,
        rounds,
        shared = shared.len(),
        have = have_ids.len(),
        need = need_ids.len(),
        "converged"
    );
    Ok(())
}

fn random_items(rng: &mut StdRng, count: usize, id_size: usize) -> Vec<(u64, Vec<u8>)> {
    (0..count)
        .map(|_| {
            let mut id = vec![0u8; id_size];
            rng.fill(&mut id[..]);
            (rng.gen_range(TIMESTAMP_WINDOW), id)
        })
        .collect()
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{name} must be an unsigned integer")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {name}")),
    }
}
