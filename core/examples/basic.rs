//! Basic per-key breaker usage example

use keyed_breaker::{BreakerRegistry, CallOptions, ManualClock};
use std::sync::Arc;

fn main() {
    println!("=== Keyed Breaker Basic Example ===\n");

    let clock = Arc::new(ManualClock::new());
    let registry = BreakerRegistry::builder()
        .max_retries(2)
        .cool_down_secs(10.0)
        .clock(clock.clone())
        .on_trip(|key| println!("🔴 '{}' blocked!", key))
        .on_probe(|key| println!("🟡 '{}' probing...", key))
        .on_recover(|key| println!("🟢 '{}' recovered!", key))
        .build();

    println!("--- Successful calls ---");
    for i in 1..=2 {
        match registry.run("payment_api", move || Ok::<_, String>(format!("Payment {}", i))) {
            Ok(result) => println!("✓ {}", result),
            Err(e) => println!("✗ Error: {}", e),
        }
    }

    println!("\n--- Triggering failures ---");
    for i in 1..=3 {
        match registry.run("payment_api", move || {
            Err::<String, _>(format!("Payment failed {}", i))
        }) {
            Ok(_) => println!("✓ Success"),
            Err(e) => println!("✗ {}", e),
        }
    }
    println!("Phase: {:?}\n", registry.phase("payment_api"));

    println!("--- Calls while blocked ---");
    match registry.run("payment_api", || Ok::<_, String>("Should be rejected")) {
        Ok(_) => println!("✓ Success"),
        Err(e) => println!("✗ {}", e),
    }
    let cached = registry.run(
        "payment_api",
        (
            || Ok::<_, String>("Should be rejected"),
            CallOptions::new().with_fallback(|ctx| {
                println!("  fallback for '{}' in phase {}", ctx.key, ctx.phase);
                Ok("cached response")
            }),
        ),
    );
    println!("✓ {:?}", cached);

    println!("\n--- Other keys are unaffected ---");
    match registry.run("search_api", || Ok::<_, String>("Search ok")) {
        Ok(result) => println!("✓ {}", result),
        Err(e) => println!("✗ {}", e),
    }

    println!("\n--- After cool-down ---");
    clock.advance(10.0);
    match registry.run("payment_api", || Ok::<_, String>("Payment successful")) {
        Ok(result) => println!("✓ {}", result),
        Err(e) => println!("✗ {}", e),
    }
    println!("Phase: {:?}", registry.phase("payment_api"));
}
