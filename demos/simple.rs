//! Simple Chart
//!
//! One user state between `initial` and `final`, driven first step by step
//! and then on a background thread.
//!
//! ```text
//!  (e1)      [t1]   (e1,e2,e3)   [t2]
//! initial -------->    s1    --------> final
//!            <g1>             (eT2)<g2>
//! ```
//!
//! Key concepts:
//! - Entry, do and exit actions on a state
//! - Guards and events gating transitions
//! - Event callbacks that only fire in the active state
//! - State-change callbacks
//!
//! Run with: cargo run --example simple
//! Set `RUST_LOG=statechart=debug` to watch the engine's own logs.
//! Set `STATECHART_RUNNER='{"thread_name":"simple","idle_backoff_us":500}'`
//! to configure the background runner.

use statechart::{Chart, ChartError, Event, RunnerConfig};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn spin_and_print(chart: &Chart, count: &mut usize) {
    *count += 1;
    println!("------------");
    println!("spin({count}) -> {{{}}} in [{}]", chart.name(), chart.current_state_name());
    chart.spin_once();
}

/// Runner settings from `STATECHART_RUNNER` (JSON), or a light backoff.
fn runner_config() -> RunnerConfig {
    match std::env::var("STATECHART_RUNNER") {
        Ok(json) => serde_json::from_str(&json).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "ignoring malformed STATECHART_RUNNER");
            RunnerConfig::default()
        }),
        Err(_) => RunnerConfig::default().with_idle_backoff(Duration::from_micros(100)),
    }
}

fn main() -> Result<(), ChartError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Simple Chart ===\n");

    let chart = Chart::new("chart")?;
    let s1 = chart.create_state("s1")?;

    let do_count = Arc::new(AtomicUsize::new(0));
    s1.set_callback_entry(|| println!("<s1 Entry> called!"));
    let counter = do_count.clone();
    s1.set_callback_do(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        println!("<s1 Do> called *{n}* time(s)");
    });
    s1.set_callback_exit(|| println!("<s1 Exit> called!"));

    let t1 = chart.initial_state().create_transition(&s1)?;
    let t2 = s1.create_transition_with_action(&chart.final_state(), || {
        println!("<t2 callback> called!")
    })?;

    let g1 = Arc::new(AtomicBool::new(false));
    let g2 = Arc::new(AtomicBool::new(false));
    let flag = g1.clone();
    t1.create_guard(move || flag.load(Ordering::SeqCst));
    let flag = g2.clone();
    t2.create_guard(move || flag.load(Ordering::SeqCst));

    let e1 = Event::new("e1");
    let e2 = Event::new("e2");
    let e3 = Event::new("e3");
    chart
        .initial_state()
        .create_event_callback(&e1, |event| println!("Event:[Initial]:{}", event.name()));
    s1.create_event_callback(&e1, |event| println!("Event:[s1Lambda]:{}", event.name()));
    for event in [&e2, &e3] {
        s1.create_event_callback(event, |event| println!("Event:[s1Logger]:{}", event.name()));
    }

    let e_t2 = Event::new("eT2");
    t2.add_event(&e_t2);

    chart.create_state_change_callback(|name| println!("[Observer]:{name}"));

    println!("======== Running with spin_once ========");
    let mut count = 0;
    spin_and_print(&chart, &mut count);
    spin_and_print(&chart, &mut count);

    println!("Triggering e1 while in initial");
    e1.trigger();

    println!("Granting <g1>");
    g1.store(true, Ordering::SeqCst);
    spin_and_print(&chart, &mut count);
    spin_and_print(&chart, &mut count);

    println!("Triggering e1, e2, e3 while in s1");
    e1.trigger();
    e2.trigger();
    e3.trigger();

    println!("Triggering eT2 without <g2> has no effect");
    e_t2.trigger();
    spin_and_print(&chart, &mut count);

    println!("Granting <g2> and triggering eT2");
    g2.store(true, Ordering::SeqCst);
    e_t2.trigger();
    spin_and_print(&chart, &mut count);
    println!("{{{}}} in [{}]\n", chart.name(), chart.current_state_name());

    println!("======== Running with spin_async ========");
    chart.reset();
    g2.store(false, Ordering::SeqCst);
    do_count.store(0, Ordering::SeqCst);
    s1.set_callback_do(|| {});

    chart.set_runner_config(runner_config());
    println!("Runner config: {:?}", chart.runner_config());
    chart.spin_async()?;
    while !s1.is_active() {
        thread::sleep(Duration::from_millis(1));
    }
    println!("{{{}}} in [{}]", chart.name(), chart.current_state_name());

    e2.trigger();
    g2.store(true, Ordering::SeqCst);
    e_t2.trigger();
    while chart.current_state_name() != "final" {
        thread::sleep(Duration::from_millis(1));
    }
    chart.stop();
    println!("{{{}}} in [{}]", chart.name(), chart.current_state_name());

    println!("\n=== Example Complete ===");
    Ok(())
}
