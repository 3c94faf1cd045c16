//! Minimal embedding example for zonesync-core
//!
//! Drives the reconciliation engine as a library against the in-memory
//! provider: preview, push, then preview again to show convergence.

use std::collections::BTreeMap;
use std::sync::Arc;
use zonesync_core::providers::MemoryProvider;
use zonesync_core::record::{Record, RecordType};
use zonesync_core::{DnsProvider, Mode, ReconcileConfig, ReconcileEngine, Result, ZoneOutcome};

const CONFIG: &str = r#"{
    "providers": { "mem": { "type": "memory" } },
    "zones": [
        {
            "name": "example.com",
            "provider": "mem",
            "default_ttl": 600,
            "ignore_labels": ["legacy-*"],
            "features": { "universal_ssl": false },
            "records": [
                { "label": "@", "type": "A", "content": "192.0.2.10" },
                { "label": "www", "type": "CNAME", "content": "@" },
                { "label": "@", "type": "MX", "content": "10 mail" },
                { "label": "mail", "type": "A", "content": "192.0.2.25", "ttl": 3600 },
                { "label": "sub", "type": "NS", "content": "ns1.dns-host.net." },
                { "label": "sub", "type": "DS", "content": "2371 13 2 1F987CC6583E92DF0890718C42D5C0D4A0C3E9AF5A7C7F2D8C3A3E0C1B5D9A11" }
            ]
        }
    ],
    "engine": { "event_channel_capacity": 100, "max_concurrent_zones": 2 }
}"#;

fn print_outcome(outcome: &ZoneOutcome) {
    match outcome {
        ZoneOutcome::Failed { zone, error } => println!("   {}: FAILED: {}", zone, error),
        ZoneOutcome::Planned(plan) => {
            println!("   {}: {} correction(s)", plan.zone, plan.corrections.len());
            for correction in &plan.corrections {
                println!("     - {}", correction);
            }
        }
        ZoneOutcome::Applied { plan, report } => {
            println!(
                "   {}: {} applied, {} failed",
                plan.zone,
                report.succeeded(),
                report.failed()
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    println!("=== Embedded zonesync-core Example ===\n");

    let config = ReconcileConfig::from_json(CONFIG)?;

    // Pretend the provider already serves a few records
    let provider = MemoryProvider::new();
    provider
        .seed(
            "example.com",
            vec![
                Record::parse("@", RecordType::A, "192.0.2.1")?.with_ttl(600),
                Record::parse("old", RecordType::A, "192.0.2.99")?.with_ttl(600),
                Record::parse("legacy-app", RecordType::A, "192.0.2.50")?.with_ttl(600),
            ],
        )
        .await;
    provider
        .set_features(
            "example.com",
            BTreeMap::from([("universal_ssl".to_string(), true)]),
        )
        .await;

    println!("1. Creating engine...");
    let mut providers: BTreeMap<String, Arc<dyn DnsProvider>> = BTreeMap::new();
    providers.insert("mem".to_string(), Arc::new(provider.clone()));
    let (engine, mut event_rx) = ReconcileEngine::new(providers, config.engine.clone());

    let event_listener = tokio::spawn(async move {
        let mut seen = 0;
        while let Some(event) = event_rx.recv().await {
            println!("   [Event] {:?}", event);
            seen += 1;
        }
        seen
    });

    println!("2. Preview:");
    for outcome in engine.reconcile(&config, Mode::Preview).await? {
        print_outcome(&outcome);
    }

    println!("\n3. Push:");
    for outcome in engine.reconcile(&config, Mode::Push).await? {
        print_outcome(&outcome);
    }

    println!("\n4. Preview again (expect nothing to do):");
    for outcome in engine.reconcile(&config, Mode::Preview).await? {
        print_outcome(&outcome);
    }

    println!("\n5. Provider now holds:");
    for record in provider.records("example.com").await {
        println!(
            "     {} {} {}",
            record.fqdn("example.com"),
            record.rtype,
            record.describe()
        );
    }

    drop(engine);
    let events = event_listener.await.unwrap_or(0);

    println!("\n=== Embedding Successful ({} events) ===", events);
    println!("Key Points:");
    println!("- Providers are passed in explicitly; no global registration");
    println!("- Preview never writes; push applies corrections in a safe order");
    println!("- Records at ignored labels (legacy-app) survive purge");

    Ok(())
}
