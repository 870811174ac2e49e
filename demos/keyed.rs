//! Per-client limiting with idle eviction and a background sweeper.
//!
//! Run with `RUST_LOG=debug cargo run --example keyed` to see bucket
//! creation and eviction events.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokengate::{IdleTimeout, Limiter, LimiterBuilder, Policy};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let trusted = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    let limiter: Arc<Limiter<IpAddr>> = Arc::new(
        LimiterBuilder::new()
            .policy(Policy::per_second(5.0).expect("valid policy"))
            .policy_for(trusted, Policy::per_second(50.0).expect("valid policy"))
            .eviction(IdleTimeout::new(Duration::from_millis(500)))
            .build()
            .expect("valid limiter"),
    );

    let sweeper = limiter
        .clone()
        .start_sweeper(Duration::from_millis(200))
        .expect("sweeper thread");

    // Simulate requests from different IPs
    let ips = [
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2)),
        trusted,
    ];

    for ip in &ips {
        let allowed = (0..12).filter(|_| limiter.allow(ip)).count();
        println!("IP {:<12} - {:>2} of 12 requests allowed", ip, allowed);
    }
    println!();

    // Each client thread hammers its own bucket
    let handles: Vec<_> = (0..4u8)
        .map(|id| {
            let limiter = limiter.clone();
            thread::spawn(move || {
                let ip = IpAddr::V4(Ipv4Addr::new(172, 16, 0, id));
                (0..100).filter(|_| limiter.allow(&ip)).count()
            })
        })
        .collect();
    for (id, handle) in handles.into_iter().enumerate() {
        let allowed = handle.join().unwrap_or(0);
        println!("Worker {} - {} of 100 requests allowed", id, allowed);
    }

    println!("\n{}\n", limiter.stats());

    // Drained buckets are only forgotten once they have refilled
    println!("Going quiet for three seconds...");
    thread::sleep(Duration::from_secs(3));
    sweeper.stop();

    println!("\n{}", limiter.stats());
}
