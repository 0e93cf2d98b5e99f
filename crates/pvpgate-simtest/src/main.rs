//! PvPGate Headless Harness
//!
//! Drives the force engine with synthetic participants and checks the
//! accrual, zone, persistence and scheduler behaviour end to end.
//! Runs entirely in-process: no game server, no commands, no chat.
//!
//! Usage:
//!   cargo run -p pvpgate-simtest
//!   cargo run -p pvpgate-simtest -- --verbose --seed 7 --config force.json
//!
//! Set `RUST_LOG=debug` to see the engine's own log output.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pvpgate_logic::accrual::AccrualPolicy;
use pvpgate_logic::config::{ForceConfig, MilestoneConfig, PolicyConfig, RatioConfig};
use pvpgate_logic::identity::{BlockPos, ParticipantId};
use pvpgate_logic::resolver::{EngageDecision, ToggleError};
use pvpgate_logic::zone::{SelectionSlot, ZoneError};
use pvpgate_server::persistence::{FileGateway, MemoryGateway, SnapshotFormat};
use pvpgate_server::presence::{Presence, PresenceBoard};
use pvpgate_server::store::MemoryRecordStore;
use pvpgate_server::{ForceEngine, TickScheduler};

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

struct Options {
    verbose: bool,
    seed: u64,
    config: ForceConfig,
}

fn parse_options() -> Result<Options, String> {
    let mut options = Options {
        verbose: false,
        seed: 42,
        config: ForceConfig::default(),
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--verbose" => options.verbose = true,
            "--seed" => {
                let value = args.next().ok_or("--seed needs a value")?;
                options.seed = value
                    .parse()
                    .map_err(|e| format!("bad seed '{}': {}", value, e))?;
            }
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| format!("cannot read {}: {}", path, e))?;
                options.config = serde_json::from_str(&text)
                    .map_err(|e| format!("cannot parse {}: {}", path, e))?;
            }
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }
    Ok(options)
}

fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let options = match parse_options() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    };
    log::info!("Harness starting with seed {}", options.seed);
    println!("=== PvPGate Harness (seed {}) ===\n", options.seed);

    let mut results = Vec::new();

    // 1. Configuration clamps
    results.extend(validate_config(&options));

    // 2. Milestone policy
    results.extend(validate_milestone());

    // 3. Ratio policy
    results.extend(validate_ratio());

    // 4. Resolver and combat
    results.extend(validate_resolver());

    // 5. Zones and membership cache
    results.extend(validate_zones());

    // 6. Persistence round trip
    results.extend(validate_persistence());

    // 7. Scheduler liveness
    results.extend(validate_scheduler());

    // 8. Randomized soak
    results.extend(soak(&options));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || options.verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

fn build(config: &ForceConfig) -> (ForceEngine, Arc<PresenceBoard>) {
    let board = Arc::new(PresenceBoard::new());
    let engine = ForceEngine::from_config(
        config,
        Arc::new(MemoryRecordStore::new()),
        board.clone(),
        Arc::new(MemoryGateway::new()),
    );
    (engine, board)
}

fn pid(n: u128) -> ParticipantId {
    ParticipantId::from_u128(n)
}

fn spawn_point() -> BlockPos {
    BlockPos::new("world", 0, 64, 0)
}

// ── 1. Configuration ────────────────────────────────────────────────────

fn validate_config(options: &Options) -> Vec<TestResult> {
    println!("--- Configuration ---");
    let mut results = Vec::new();

    let (settings, warnings) = options.config.resolve();
    results.push(TestResult {
        name: "config_loaded".into(),
        passed: true,
        detail: format!(
            "{:?} policy, {} clamp warning(s)",
            settings.policy.kind(),
            warnings.len()
        ),
    });

    let bad = ForceConfig {
        snapshot_interval_secs: 0,
        membership_cache_capacity: 0,
        policy: PolicyConfig::Ratio(RatioConfig {
            window_seconds: -3,
            increment_seconds: 60,
            max_debt_seconds: 100,
            minimum_forced_seconds: 500,
        }),
        ..Default::default()
    };
    let (settings, warnings) = bad.resolve();
    let clamped = match settings.policy {
        AccrualPolicy::Ratio(p) => p.window_seconds() == 1 && p.minimum_forced_seconds() == 100,
        AccrualPolicy::Milestone(_) => false,
    };
    results.push(TestResult {
        name: "config_clamps".into(),
        passed: clamped
            && warnings.len() == 4
            && settings.snapshot_interval == Duration::from_secs(300)
            && settings.membership_cache_capacity == 1,
        detail: warnings
            .iter()
            .map(|w| w.field)
            .collect::<Vec<_>>()
            .join(", "),
    });

    results
}

// ── 2. Milestone ────────────────────────────────────────────────────────

fn validate_milestone() -> Vec<TestResult> {
    println!("--- Milestone Policy ---");
    let mut results = Vec::new();

    let (engine, board) = build(&ForceConfig {
        policy: PolicyConfig::Milestone(MilestoneConfig {
            cycle_seconds: 3600,
            forced_seconds_per_cycle: 1200,
        }),
        ..Default::default()
    });
    let p = pid(1);
    board.connect(p, spawn_point());
    for _ in 0..3600 {
        engine.tick();
    }
    let r = engine.record(p);
    results.push(TestResult {
        name: "milestone_one_hour_solo".into(),
        passed: r.debt_seconds == 1200 && r.processed_milestones == 1,
        detail: format!(
            "debt {}s after {} milestone(s)",
            r.debt_seconds, r.processed_milestones
        ),
    });

    // A companion lets the debt count down.
    board.connect(pid(2), spawn_point());
    for _ in 0..600 {
        engine.tick();
    }
    let r = engine.record(p);
    results.push(TestResult {
        name: "milestone_payoff_with_company".into(),
        passed: r.debt_seconds == 600 && r.forced_elapsed_seconds == 600,
        detail: format!(
            "debt {}s, elapsed {}s",
            r.debt_seconds, r.forced_elapsed_seconds
        ),
    });

    // Privileged participants advance milestones without accruing.
    let (engine, board) = build(&ForceConfig::default());
    board.connect(p, spawn_point());
    board.set_privileged(p, true);
    for _ in 0..3600 {
        engine.tick();
    }
    let r = engine.record(p);
    results.push(TestResult {
        name: "milestone_privileged_exempt".into(),
        passed: r.debt_seconds == 0 && r.processed_milestones == 1,
        detail: format!("privileged: debt {}s", r.debt_seconds),
    });

    results
}

// ── 3. Ratio ────────────────────────────────────────────────────────────

fn validate_ratio() -> Vec<TestResult> {
    println!("--- Ratio Policy ---");
    let mut results = Vec::new();

    let config = ForceConfig {
        policy: PolicyConfig::Ratio(RatioConfig::default()),
        ..Default::default()
    };
    let (engine, board) = build(&config);
    let (a, b) = (pid(1), pid(2));
    board.connect(a, spawn_point());
    board.connect(b, spawn_point());

    let mut increments = 0;
    let mut last = 0;
    for _ in 0..900 {
        engine.tick();
        let debt = engine.record(a).debt_seconds;
        if debt > last {
            increments += 1;
        }
        last = debt;
    }
    let r = engine.record(a);
    results.push(TestResult {
        name: "ratio_fifteen_minutes_idle".into(),
        passed: increments == 3 && r.debt_seconds == 719 && r.off_accumulator_seconds == 0,
        detail: format!(
            "{} increment(s), debt {}s, accumulator {}s",
            increments, r.debt_seconds, r.off_accumulator_seconds
        ),
    });

    let toggle = engine.set_toggle(a, &spawn_point(), false);
    results.push(TestResult {
        name: "ratio_cannot_disable_while_forced".into(),
        passed: toggle == Err(ToggleError::ForcedByDebt {
            remaining_seconds: 719,
        }),
        detail: format!("{:?}", toggle),
    });

    let (engine, board) = build(&config);
    board.connect(a, spawn_point());
    for _ in 0..1800 {
        engine.tick();
    }
    results.push(TestResult {
        name: "ratio_solo_exempt".into(),
        passed: engine.record(a).debt_seconds == 0,
        detail: "alone for 30 minutes, no debt".into(),
    });

    let (engine, board) = build(&config);
    board.connect(a, spawn_point());
    board.connect(b, spawn_point());
    let applied = engine.set_debt(a, 10_000);
    results.push(TestResult {
        name: "ratio_override_capped".into(),
        passed: applied == 3600,
        detail: format!("set_debt(10000) applied {}s", applied),
    });

    results
}

// ── 4. Resolver ─────────────────────────────────────────────────────────

fn validate_resolver() -> Vec<TestResult> {
    println!("--- Resolver & Combat ---");
    let mut results = Vec::new();

    let (engine, board) = build(&ForceConfig::default());
    let (a, b) = (pid(1), pid(2));
    let pos = spawn_point();

    results.push(TestResult {
        name: "combat_both_off".into(),
        passed: engine.can_engage(a, &pos, b, &pos) == EngageDecision::AttackerDisabled,
        detail: "attacker checked first".into(),
    });

    let on = engine.set_toggle(a, &pos, true);
    results.push(TestResult {
        name: "combat_victim_off".into(),
        passed: on.is_ok()
            && engine.can_engage(a, &pos, b, &pos) == EngageDecision::VictimDisabled,
        detail: "attacker opted in, victim not".into(),
    });

    engine.set_debt(b, 60);
    results.push(TestResult {
        name: "combat_debt_forces_victim".into(),
        passed: engine.can_engage(a, &pos, b, &pos) == EngageDecision::Allowed,
        detail: "victim forced by debt".into(),
    });

    board.connect(b, pos.clone());
    board.set_privileged(b, true);
    results.push(TestResult {
        name: "combat_privilege_bypasses_debt".into(),
        passed: engine.can_engage(a, &pos, b, &pos) == EngageDecision::VictimDisabled,
        detail: "privileged victim ignores debt".into(),
    });

    results.push(TestResult {
        name: "combat_self_never_gated".into(),
        passed: engine.can_engage(b, &pos, b, &pos) == EngageDecision::Allowed,
        detail: "self damage allowed".into(),
    });

    results
}

// ── 5. Zones ────────────────────────────────────────────────────────────

fn validate_zones() -> Vec<TestResult> {
    println!("--- Zones ---");
    let mut results = Vec::new();

    let (engine, _board) = build(&ForceConfig::default());
    let op = pid(99);

    let incomplete = engine.create_zone("arena", op);
    results.push(TestResult {
        name: "zone_needs_selection".into(),
        passed: incomplete == Err(ZoneError::IncompleteSelection),
        detail: format!("{:?}", incomplete),
    });

    engine.set_selection_point(op, SelectionSlot::First, BlockPos::new("world", 20, 50, 20));
    engine.set_selection_point(op, SelectionSlot::Second, BlockPos::new("world", -20, 90, -20));
    let created = engine.create_zone("Arena", op);
    let duplicate = engine.create_zone("ARENA", op);
    results.push(TestResult {
        name: "zone_create_and_duplicate".into(),
        passed: created.is_ok() && matches!(duplicate, Err(ZoneError::AlreadyExists(_))),
        detail: format!("{} zone(s)", engine.list_zones().len()),
    });

    let here = BlockPos::new("world", 20, 50, -20);
    let nether = BlockPos::new("world_nether", 20, 50, -20);
    results.push(TestResult {
        name: "zone_inclusive_same_world".into(),
        passed: engine.in_zone(&here) && !engine.in_zone(&nether),
        detail: "corner block inside, other world outside".into(),
    });

    // Cached and uncached answers agree across a grid, twice.
    let mut mismatches = 0;
    for _ in 0..2 {
        for x in -25..=25 {
            for y in [49, 50, 70, 90, 91] {
                let pos = BlockPos::new("world", x, y, 0);
                if engine.zones().contains(&pos) != engine.zones().scan(&pos) {
                    mismatches += 1;
                }
            }
        }
    }
    let (hits, misses) = engine.zones().cache_stats();
    results.push(TestResult {
        name: "zone_cache_consistent".into(),
        passed: mismatches == 0 && hits > 0,
        detail: format!("{} mismatches, {} hits / {} misses", mismatches, hits, misses),
    });

    engine.delete_zone("arena");
    results.push(TestResult {
        name: "zone_delete_clears_cache".into(),
        passed: !engine.in_zone(&here),
        detail: "deleted zone no longer forces".into(),
    });

    results
}

// ── 6. Persistence ──────────────────────────────────────────────────────

fn validate_persistence() -> Vec<TestResult> {
    println!("--- Persistence ---");
    let mut results = Vec::new();

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let config = ForceConfig {
        policy: PolicyConfig::Ratio(RatioConfig::default()),
        ..Default::default()
    };

    for format in [SnapshotFormat::Json, SnapshotFormat::Bincode] {
        let dir = std::env::temp_dir().join(format!("pvpgate-simtest-{}-{:?}", nanos, format));
        let gateway = || Arc::new(FileGateway::new(&dir).with_format(format));

        let board = Arc::new(PresenceBoard::new());
        let writer = ForceEngine::from_config(
            &config,
            Arc::new(MemoryRecordStore::new()),
            board.clone(),
            gateway(),
        );
        for n in 1..=5 {
            board.connect(pid(n), spawn_point());
        }
        writer.set_toggle(pid(3), &spawn_point(), true).ok();
        writer.add_off_time(pid(4), 250);
        for _ in 0..400 {
            writer.tick();
        }
        let op = pid(1);
        writer.set_selection_point(op, SelectionSlot::First, BlockPos::new("world", 0, 0, 0));
        writer.set_selection_point(op, SelectionSlot::Second, BlockPos::new("world", 9, 9, 9));
        writer.create_zone("Pit", op).ok();
        let saved = writer.persist();

        let reader = ForceEngine::from_config(
            &config,
            Arc::new(MemoryRecordStore::new()),
            Arc::new(PresenceBoard::new()),
            gateway(),
        );
        let loaded = reader.load();
        let same_records = reader.records() == writer.records();
        let same_zones = reader.list_zones() == writer.list_zones();
        results.push(TestResult {
            name: format!("persistence_round_trip_{:?}", format).to_lowercase(),
            passed: saved.is_ok() && loaded.is_ok() && same_records && same_zones,
            detail: format!(
                "{} record(s), {} zone(s) restored",
                reader.records().len(),
                reader.list_zones().len()
            ),
        });
        let _ = std::fs::remove_dir_all(&dir);
    }

    // A failing gateway leaves memory untouched.
    let gateway = Arc::new(MemoryGateway::new());
    let engine = ForceEngine::from_config(
        &ForceConfig::default(),
        Arc::new(MemoryRecordStore::new()),
        Arc::new(PresenceBoard::new()),
        gateway.clone(),
    );
    engine.set_debt(pid(1), 77);
    gateway.set_failing(true);
    let failed = engine.persist().is_err();
    results.push(TestResult {
        name: "persistence_failure_non_fatal".into(),
        passed: failed && engine.record(pid(1)).debt_seconds == 77,
        detail: "write failed, memory authoritative".into(),
    });

    results
}

// ── 7. Scheduler ────────────────────────────────────────────────────────

fn validate_scheduler() -> Vec<TestResult> {
    println!("--- Scheduler ---");
    let mut results = Vec::new();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            results.push(TestResult {
                name: "scheduler_runtime".into(),
                passed: false,
                detail: format!("cannot build runtime: {}", e),
            });
            return results;
        }
    };

    let gateway = Arc::new(MemoryGateway::new());
    let board = Arc::new(PresenceBoard::new());
    let engine = Arc::new(ForceEngine::from_config(
        &ForceConfig::default(),
        Arc::new(MemoryRecordStore::new()),
        board.clone(),
        gateway.clone(),
    ));
    board.connect(pid(1), spawn_point());

    let scheduler = TickScheduler::new(engine.clone())
        .with_tick_period(Duration::from_millis(10))
        .with_snapshot_interval(Duration::from_millis(100));
    let outcome = runtime.block_on(async {
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(350)).await;
        scheduler.stop();
        scheduler.stop();
        scheduler.shutdown().await
    });

    let ticks = scheduler.ticks();
    let active = engine.record(pid(1)).cumulative_active_seconds;
    results.push(TestResult {
        name: "scheduler_ticks".into(),
        passed: ticks >= 10 && active == ticks,
        detail: format!("{} tick(s) in 350ms, {} active second(s)", ticks, active),
    });
    results.push(TestResult {
        name: "scheduler_snapshots".into(),
        passed: outcome.is_ok() && gateway.save_count() >= 2,
        detail: format!("{} save(s) including shutdown", gateway.save_count()),
    });

    results
}

// ── 8. Soak ─────────────────────────────────────────────────────────────

fn soak(options: &Options) -> Vec<TestResult> {
    println!("--- Randomized Soak ---");
    let mut results = Vec::new();
    let mut rng = StdRng::seed_from_u64(options.seed);

    let config = ForceConfig {
        membership_cache_capacity: 64,
        policy: PolicyConfig::Ratio(RatioConfig {
            window_seconds: 30,
            increment_seconds: 20,
            max_debt_seconds: 240,
            minimum_forced_seconds: 90,
        }),
        ..options.config.clone()
    };
    let (settings, _) = config.resolve();
    let cap = match settings.policy {
        AccrualPolicy::Ratio(p) => p.max_debt_seconds(),
        AccrualPolicy::Milestone(_) => u64::MAX,
    };
    let (engine, board) = build(&config);
    let worlds = ["world", "world_nether"];
    let random_pos = |rng: &mut StdRng| {
        BlockPos::new(
            worlds[rng.gen_range(0..worlds.len())],
            rng.gen_range(-40..40),
            rng.gen_range(50..80),
            rng.gen_range(-40..40),
        )
    };

    let population: Vec<ParticipantId> = (1..=24).map(pid).collect();
    let op = pid(1000);
    let mut violations = Vec::new();
    let mut cache_mismatches = 0;
    let mut zones_made = 0;

    for second in 0..5000u32 {
        for &id in &population {
            match rng.gen_range(0..100) {
                0 => {
                    board.connect(id, random_pos(&mut rng));
                    engine.on_join(id);
                }
                1 => {
                    if board.disconnect(id) {
                        engine.on_quit(id);
                    }
                }
                2..=9 => {
                    board.move_to(id, random_pos(&mut rng));
                }
                10 => {
                    let pos = board.position(id).unwrap_or_else(spawn_point);
                    let _ = engine.set_toggle(id, &pos, rng.gen_bool(0.5));
                }
                11 => board.set_privileged(id, rng.gen_bool(0.2)),
                _ => {}
            }
        }
        if second % 250 == 0 {
            engine.set_selection_point(op, SelectionSlot::First, random_pos(&mut rng));
            engine.set_selection_point(op, SelectionSlot::Second, random_pos(&mut rng));
            if engine.create_zone(&format!("z{}", second), op).is_ok() {
                zones_made += 1;
            }
            if rng.gen_bool(0.3) {
                let names = engine.zone_names();
                if !names.is_empty() {
                    engine.delete_zone(&names[rng.gen_range(0..names.len())]);
                }
            }
        }

        engine.tick();

        for (id, r) in engine.records() {
            if r.debt_seconds > cap {
                violations.push(format!("{} debt {} over cap at {}", id, r.debt_seconds, second));
            }
            if r.debt_seconds == 0 && r.forced_elapsed_seconds != 0 {
                violations.push(format!("{} elapsed without debt at {}", id, second));
            }
        }
        let sample = random_pos(&mut rng);
        if engine.zones().contains(&sample) != engine.zones().scan(&sample) {
            cache_mismatches += 1;
        }
    }

    if options.verbose {
        for v in violations.iter().take(10) {
            println!("  violation: {}", v);
        }
    }
    let forced = engine.records().iter().filter(|(_, r)| r.debt_seconds > 0).count();
    results.push(TestResult {
        name: "soak_invariants".into(),
        passed: violations.is_empty(),
        detail: format!(
            "{} violation(s) over 5000s, {} participant(s) forced at end",
            violations.len(),
            forced
        ),
    });
    results.push(TestResult {
        name: "soak_cache_matches_scan".into(),
        passed: cache_mismatches == 0,
        detail: format!(
            "{} mismatch(es), {} zone(s) created, {} live",
            cache_mismatches,
            zones_made,
            engine.list_zones().len()
        ),
    });

    results
}
