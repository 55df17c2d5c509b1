//! Demonstration of the Synheart group synchrony pipeline.
//!
//! This example shows how to:
//! 1. Create an engine for three wearers
//! 2. Feed it from a transport thread over the update channel
//! 3. Watch soft and hard clusters form as heart rates converge
//! 4. Inspect the emitted aggregate records
//!
//! Run with: cargo run --example replay_demo

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use synheart_group_sync::{
    core::ClusterKind,
    transport::{update_channel, DEFAULT_QUEUE_CAPACITY},
    EngineConfig, MemorySink, SensorRegistry, SensorUpdate, SharedEngine, SyncEngine,
};

const ROUNDS: usize = 40;

fn main() {
    println!("Synheart Group Sync - Replay Demo");
    println!("==================================");
    println!();

    let sink = MemorySink::new();
    let engine = SyncEngine::new(
        SensorRegistry::new(["Blue", "Green", "Red"]),
        EngineConfig::default(),
    )
    .with_sink(Box::new(sink.clone()));
    println!("Session: {}", engine.session_id());
    println!();

    let shared = SharedEngine::new(engine);
    let (sender, receiver) = update_channel(DEFAULT_QUEUE_CAPACITY);

    // Simulated transport: three wearers drifting toward 70 bpm
    let producer = thread::spawn(move || {
        let starts = [("Blue", 62.0), ("Green", 78.0), ("Red", 90.0)];
        for round in 0..ROUNDS {
            let progress = round as f64 / (ROUNDS - 1) as f64;
            for (sensor, start) in starts {
                let hr: f64 = start + (70.0 - start) * progress;
                let ibi = 60.0 / hr;
                let update = SensorUpdate::new(sensor, hr.round(), vec![ibi, ibi * 1.01]);
                if sender.send(update).is_err() {
                    return;
                }
            }
            thread::sleep(Duration::from_millis(25));
        }
    });

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    let mut update_count = 0;
    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(update) => {
                let report = match shared.update(&update) {
                    Ok(report) => report,
                    Err(e) => {
                        eprintln!("  Rejected: {e}");
                        continue;
                    }
                };
                update_count += 1;

                for transition in &report.transitions {
                    let members: Vec<&str> =
                        transition.members.iter().map(|id| id.as_str()).collect();
                    println!(
                        "  [{:>3}] {} cluster {:?} {}",
                        report.record.sequence,
                        match transition.kind {
                            ClusterKind::Soft => "soft",
                            ClusterKind::Hard => "hard",
                        },
                        members,
                        if transition.activated {
                            "activated"
                        } else {
                            "deactivated"
                        }
                    );
                }

                if update_count % 30 == 0 {
                    println!(
                        "  Processed {update_count} updates, proximity score {:.3}",
                        report.record.proximity_score
                    );
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let _ = producer.join();

    println!();
    println!("=== Final State ===");
    for id in shared.sensor_ids() {
        if let Ok(Some(stats)) = shared.statistics(&id) {
            println!(
                "  {id}: min {:.1} max {:.1} median {:.1} mean {:.1}",
                stats.min, stats.max, stats.median, stats.mean
            );
        }
    }
    println!("  Proximity score: {:.3}", shared.proximity_score());
    for cluster in shared.hard_clusters() {
        println!(
            "  Hard cluster {:?}: active={} activations={}",
            cluster.members, cluster.is_active, cluster.activation_count
        );
    }
    println!();

    // Show snippet of the last record
    if let Some(record) = sink.records().last() {
        let json = serde_json::to_string_pretty(record).unwrap();
        println!("Last record (truncated):");
        for line in json.lines().take(20) {
            println!("  {line}");
        }
        println!("  ...");
    }
    println!();

    let stats = shared.transparency_stats();
    println!(
        "Records emitted: {}, IBIs accepted: {}",
        stats.records_emitted, stats.ibis_accepted
    );
}
