//! Basic usage example for the tokengate crate.

use std::thread;
use std::time::Duration;
use tokengate::{Limiter, Policy, TokenBucket};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== Token Bucket Admission Control ===\n");

    // Example 1: Burst, then throttle
    burst_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 2: Continuous refill
    refill_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 3: One bucket per key
    per_key_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 4: Refill is capped at capacity
    capacity_clamp_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 5: Metrics
    metrics_example();
}

fn burst_example() {
    println!("1. Burst, then Throttle:");

    let bucket = TokenBucket::new(5.0, 2.0).expect("valid policy");
    println!("   Created bucket with capacity=5, refill_rate=2 tokens/second");

    for i in 1..=6 {
        if bucket.allow() {
            println!("   Request {} - ✅ Allowed", i);
        } else {
            println!("   Request {} - ❌ Throttled", i);
        }
    }
}

fn refill_example() {
    println!("2. Continuous Refill:");

    let bucket = TokenBucket::new(5.0, 2.0).expect("valid policy");
    while bucket.allow() {}
    println!("   Bucket drained, available: {:.2}", bucket.peek());

    println!("   Waiting 1 second for refill...");
    thread::sleep(Duration::from_secs(1));

    println!("   Available tokens: {:.2}", bucket.peek());
    if bucket.allow() {
        println!("   ✅ Request after refill allowed");
    }

    if let Some(wait) = bucket.time_until_available(5) {
        println!("   Full burst available again in {:?}", wait);
    }
}

fn per_key_example() {
    println!("3. Multiple Users/Endpoints:");

    let limiter: Limiter<String> = Limiter::new(3.0, 1.0).expect("valid policy");
    let user1 = "user1:api/getData";
    let user2 = "user2:api/getData";

    for user in [user1, user2] {
        println!("   {} requests:", user);
        for i in 1..=4 {
            let verdict = if limiter.allow(user) {
                "✅ Allowed"
            } else {
                "❌ Throttled"
            };
            println!("     Request {} - {}", i, verdict);
        }
    }

    println!(
        "   Unknown key starts full: {:.0} tokens",
        limiter.peek("user3:api/getData")
    );
    println!("   Tracked keys: {}", limiter.tracked_keys());
}

fn capacity_clamp_example() {
    println!("4. Burst Traffic Handling:");

    let policy = Policy::new(10.0, 5.0).expect("valid policy");
    let bucket = TokenBucket::with_policy(policy);

    let allowed = (0..10).filter(|_| bucket.allow()).count();
    println!("   10 rapid requests - Allowed: {}, Throttled: {}", allowed, 10 - allowed);

    println!("   Waiting 2 seconds for refill...");
    thread::sleep(Duration::from_secs(2));

    println!(
        "   Available tokens after refill: {:.2} (capped at {})",
        bucket.peek(),
        policy.capacity()
    );

    let allowed = (0..10).filter(|_| bucket.allow()).count();
    println!("   10 more requests - Allowed: {}, Throttled: {}", allowed, 10 - allowed);
}

fn metrics_example() {
    println!("5. Monitoring and Metrics:");

    let bucket = TokenBucket::new(20.0, 5.0).expect("valid policy");
    for _ in 0..25 {
        bucket.allow();
    }

    let metrics = bucket.metrics();
    println!("   - Total requests: {}", metrics.total_requests());
    println!("   - Success rate: {:.2}%", metrics.success_rate() * 100.0);
    println!("   - Utilization: {:.2}%", metrics.utilization() * 100.0);
    println!("   - Health status: {}", metrics.health_status());

    println!("\n{}", metrics.summary());

    bucket.reset();
    println!("\n   After reset: {:.0} tokens", bucket.peek());
}
