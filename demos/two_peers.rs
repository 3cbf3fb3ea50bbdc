// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Two peers syncing a photo collection over the in-memory network.
//!
//! Demonstrates:
//! 1. Publishing a local name set on one peer
//! 2. A listener on the other peer learning every missing name
//! 3. An incremental publish delivering only the new names
//! 4. Displaying metrics
//! 5. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! cargo run --example two_peers
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use ndn_sync::{
    Listener, MemoryNetwork, Name, Slice, SyncConfig, SyncEvent, SyncMonitor,
};
use tokio::sync::{mpsc, watch};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║              ndn-sync: Two Peers Example                      ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Two monitors on one network
    // ─────────────────────────────────────────────────────────────────────────
    let config = SyncConfig {
        poll_interval_ms: 250,
        root_advise_timeout_ms: 500,
        node_fetch_timeout_ms: 250,
        ..Default::default()
    };
    let (_config_tx, config_rx) = watch::channel(config);

    let net = MemoryNetwork::new();
    let alice = SyncMonitor::new(Arc::new(net.transport()), config_rx.clone());
    let bob = SyncMonitor::new(Arc::new(net.transport()), config_rx);

    let slice = Slice::new("/home/lan".parse()?, "/photos".parse()?, vec![])?;
    println!("📦 Slice {} (topology {}, prefix {})", slice.hash(), slice.topology(), slice.prefix());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Alice publishes, Bob listens
    // ─────────────────────────────────────────────────────────────────────────
    let photos = |range: std::ops::Range<usize>| -> BTreeSet<Name> {
        range
            .filter_map(|i| format!("/photos/2024/img-{i:05}.jpg").parse().ok())
            .collect()
    };

    let built = alice.publish_names(&slice, &photos(0..5_000))?;
    println!(
        "\n📝 Alice published 5000 names: root {} (height {}, {} nodes)",
        built.root, built.height, built.nodes_written
    );

    let (listener, mut events) = Listener::channel(1024);
    bob.register_listener(&listener, &slice, None, None);

    let start = Instant::now();
    let learned = receive(&mut events, 5_000).await;
    println!("   ✅ Bob learned {} names in {:?}", learned.len(), start.elapsed());

    // Bob's repository now holds them too
    bob.publish_names(&slice, &learned)?;

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Incremental change
    // ─────────────────────────────────────────────────────────────────────────
    let built = alice.publish_names(&slice, &photos(0..5_010))?;
    println!(
        "\n📝 Alice added 10 names: {} nodes written, {} reused",
        built.nodes_written, built.nodes_reused
    );

    let start = Instant::now();
    let fresh = receive(&mut events, 10).await;
    println!("   ✅ Bob learned {} new names in {:?}", fresh.len(), start.elapsed());
    for name in &fresh {
        println!("   └─ {name}");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Shutdown
    // ─────────────────────────────────────────────────────────────────────────
    bob.remove_listener(&listener, &slice);
    alice.shutdown();
    bob.shutdown();
    println!("\n👋 Done.");
    Ok(())
}

async fn receive(events: &mut mpsc::Receiver<SyncEvent>, count: usize) -> BTreeSet<Name> {
    let mut names = BTreeSet::new();
    while names.len() < count {
        match tokio::time::timeout(Duration::from_secs(10), events.recv()).await {
            Ok(Some(SyncEvent::Name(name))) => {
                names.insert(name);
            }
            Ok(Some(SyncEvent::Partial { root, failed })) => {
                println!("   ⚠️  Partial walk of {root}: {} subtrees missing", failed.len());
            }
            Ok(None) | Err(_) => break,
        }
    }
    names
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let label_str = if labels.is_empty() {
                String::new()
            } else {
                format!("{{{}}}", labels.join(","))
            };
            let value = match value {
                DebugValue::Counter(v) => v.to_string(),
                DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
                DebugValue::Histogram(samples) => {
                    let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                    format!("count={} sum={sum:.4}", samples.len())
                }
            };
            format!("{}{} = {}", key.name(), label_str, value)
        })
        .collect();
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {line}");
    }
}
