// Example demonstrating the log dispatch pipeline
//
// Run with: cargo run --example dispatch_demo

use logrelay::{
    relay_debug, relay_error, relay_info, relay_warning, ConsoleListener, DispatchRouter,
    LevelMask, ListenerFlags, MemoryListener, RelayConfig, Severity,
};
use std::sync::Arc;
use std::time::Duration;

fn main() {
    println!("=== Log Dispatch Pipeline Demo ===\n");

    // Configure the pipeline: tick-stamped prefixes, physics kept quiet
    let config = RelayConfig::parse(
        r#"{
            timestamp: "Tick",
            sources: {
                physics: ["Fatal", "Error", "Warning"],
            },
        }"#,
    )
    .expect("demo config is valid");

    let router = DispatchRouter::new(config);

    println!("1. Console listener on its own worker thread, with prefixes:");
    let console = Arc::new(ConsoleListener::stdout());
    let console_id = router.add_listener(console).unwrap();
    router.register_policy(
        console_id,
        ListenerFlags {
            add_timestamp: true,
            ..Default::default()
        },
    );

    relay_info!(router, "game", "session started");
    relay_warning!(router, "render", "frame budget exceeded by {}ms", 4);
    std::thread::sleep(Duration::from_millis(100));

    println!("\n2. Sync listener, delivered before submit returns:");
    let capture = Arc::new(MemoryListener::new());
    let capture_id = router.add_listener(capture.clone()).unwrap();
    router.register_policy(
        capture_id,
        ListenerFlags {
            sync_handling: true,
            ..Default::default()
        },
    );
    relay_error!(router, "netcode", "lost connection to relay server");
    println!("   captured inline: {:?}", capture.lines());

    println!("\n3. Source masks drop chatter before it reaches anyone:");
    relay_debug!(router, "physics", "this debug line is suppressed");
    relay_error!(router, "physics", "this error still gets through");
    std::thread::sleep(Duration::from_millis(100));

    println!("\n4. Runtime filter control:");
    router
        .filters()
        .set_source_mask("render", LevelMask::of(&[Severity::Fatal]));
    relay_warning!(router, "render", "now suppressed at runtime");
    router.filters().clear_source_mask("render");
    relay_warning!(router, "render", "and audible again");
    std::thread::sleep(Duration::from_millis(100));

    println!("\n5. Graceful shutdown drains every queue:");
    for i in 0..5 {
        relay_info!(router, "game", "draining message {}", i);
    }
    router.shutdown(false);
    println!("\n=== Demo complete ===");
}
