use anyhow::Result;
use forager_channel::{ScoreChannel, SharedScoreBoard, decode_scores};
use forager_core::{ACTION_COUNT, EpisodePhase, ForagerConfig, ForagerWorld};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use tracing::{info, warn};

const DEMO_EPISODES: u64 = 5;

fn main() -> Result<()> {
    init_tracing();
    let scores = SharedScoreBoard::new();
    let mut world = bootstrap_world(&scores)?;
    let mut channel = ScoreChannel::new();
    info!("Starting forager arena demo");

    let mut policy = SmallRng::seed_from_u64(0xF0_4A_6E_12_u64);
    for _ in 0..DEMO_EPISODES {
        run_episode(&mut world, &mut policy);
        let snapshot = scores.snapshot();
        channel.send_scores(snapshot);
        info!(
            good = snapshot.good(),
            bad = snapshot.bad(),
            "Queued score snapshot"
        );
    }

    flush_channel(&mut channel);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn bootstrap_world(scores: &SharedScoreBoard) -> Result<ForagerWorld> {
    let config = ForagerConfig {
        rng_seed: Some(0xFACA_DEAF_0123_4567_u64),
        history_capacity: 64,
        ..ForagerConfig::default()
    };
    let world = ForagerWorld::with_observer(config, Box::new(scores.clone()))?;
    info!(
        markers_per_burst = world.config().burst_count,
        spawn_frequency = world.config().spawn_frequency,
        "World bootstrapped"
    );
    Ok(world)
}

fn run_episode(world: &mut ForagerWorld, policy: &mut SmallRng) {
    world.begin_episode();
    while world.phase() == EpisodePhase::Active {
        let action = policy.random_range(0..ACTION_COUNT);
        world.step(action);
    }

    if let Some(summary) = world.history().last() {
        info!(
            episode = summary.episode,
            ticks = summary.ticks,
            reward = summary.reward,
            good = summary.collected_good,
            bad = summary.collected_bad,
            end = ?summary.end,
            "Episode finished",
        );
    } else {
        warn!("Episode ended without recording a summary");
    }
}

fn flush_channel(channel: &mut ScoreChannel) {
    for payload in channel.drain_outgoing() {
        match decode_scores(&payload) {
            Ok((good, bad)) => info!(good, bad, bytes = payload.len(), "Flushed score message"),
            Err(err) => warn!(%err, "Dropped malformed score message"),
        }
    }
}
