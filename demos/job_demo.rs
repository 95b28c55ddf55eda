//! Walk the whole group lifecycle against the in-memory capability
//!
//! Run with: cargo run --example job_demo
//! (On Windows, swap `create_with(api, ...)` for `ProcessGroup::create(...)`
//! to drive the real job-object calls instead.)

use std::time::Duration;

use jobgroup::{JobLimits, LimitValue, MemoryJobApi, ProcessGroup};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=debug shows the per-operation trace events.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("┌─────────────────────────────────────────┐");
    println!("│  jobgroup: group lifecycle walkthrough  │");
    println!("└─────────────────────────────────────────┘\n");

    let api = MemoryJobApi::new();

    // Stand in for three already-running worker processes.
    for pid in [301, 302, 303] {
        api.register_process(pid);
    }

    println!("1. Creating group 'demo-workers'...");
    let mut group = ProcessGroup::create_with(api.clone(), Some("demo-workers"))?;
    println!("   ✅ Group created: {:?}\n", group);

    println!("2. Applying limits (2s CPU per process, 8 active, kill on close)...");
    group.configure([
        ("process_time", LimitValue::from(Duration::from_secs(2))),
        ("active_process", LimitValue::from(8u32)),
        ("kill_on_job_close", LimitValue::from(true)),
    ])?;
    let record = api.job_limits_named("demo-workers").expect("limits were submitted");
    println!("   ✅ Record submitted, flags = {:?}\n", record.flags);

    println!("3. Admitting workers 301, 302, 303...");
    for pid in [301, 302, 303] {
        group.admit(pid)?;
        println!("   ✅ pid {} admitted", pid);
    }
    println!("   Roster: {:?}\n", group.members());

    println!("4. Re-admitting pid 301 (expected to fail)...");
    match group.admit(301) {
        Ok(_) => println!("   ❌ unexpectedly admitted twice"),
        Err(e) => println!("   ✅ refused: {}\n", e),
    }

    println!("5. Rejecting a typo'd option (expected to fail)...");
    match group.configure([("job_memroy", LimitValue::Amount(1 << 30))]) {
        Ok(_) => println!("   ❌ unexpectedly accepted"),
        Err(e) => println!("   ✅ refused: {}\n", e),
    }

    println!("6. Terminating every member...");
    group.terminate()?;
    for pid in [301, 302, 303] {
        println!(
            "   pid {} alive: {}",
            pid,
            if api.is_alive(pid) { "yes ❌" } else { "no ✅" }
        );
    }

    println!("\n7. Releasing the handle (twice, second is a no-op)...");
    group.release();
    group.release();
    println!("   ✅ open handles remaining: {}", api.open_handles());

    // Same flow, scoped: the handle is released even if the work errors out.
    println!("\n8. Scoped acquisition...");
    let leftover = JobLimits {
        job_time: Some(JobLimits::ticks(Duration::from_secs(30))),
        ..Default::default()
    };
    ProcessGroup::scoped(api.clone(), Some("demo-scoped"), |group| {
        group.apply_limits(&leftover)
    })?;
    println!("   ✅ scoped group released, open handles: {}", api.open_handles());

    Ok(())
}
