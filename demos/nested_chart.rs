//! Nested Chart
//!
//! A chart with a subchart as one of its states, run on a background thread
//! while events are triggered from the main thread.
//!
//! ```text
//!         [tInit]         [tSub]      (eSub)     [tFinal]
//! initial -----> state1 --------->  {subchart}  -------> final
//!                  ^     <gReady>       |       (eFinish)
//!                  |      [tAgain]      |
//!                  +--------------------+
//!                         (eAgain)
//!
//!                 {subchart}
//!  (e1)      [t1]   (e1,e2,e3)   [t2]
//! initial -------->    s1    --------> final
//!            <g1>             (eT2)<g2>
//! ```
//!
//! The subchart restarts from its own `initial` every time it is entered.
//!
//! Run with: cargo run --example nested_chart

use statechart::{Chart, ChartError, Event};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn wait_for(condition: impl Fn() -> bool) {
    while !condition() {
        thread::sleep(Duration::from_millis(1));
    }
}

/// Flags and events controlling the subchart.
#[derive(Default)]
struct SubchartControl {
    g1: Arc<AtomicBool>,
    g2: Arc<AtomicBool>,
    e1: Event,
    e2: Event,
    e3: Event,
    e_t2: Event,
}

impl SubchartControl {
    fn new() -> Self {
        Self {
            e1: Event::new("e1"),
            e2: Event::new("e2"),
            e3: Event::new("e3"),
            e_t2: Event::new("eT2"),
            ..Self::default()
        }
    }

    fn build(&self) -> Result<Chart, ChartError> {
        let chart = Chart::new("subchart")?;
        let s1 = chart.create_state("s1")?;
        s1.set_callback_entry(|| println!("<s1 Entry> called!"));
        s1.set_callback_exit(|| println!("<s1 Exit> called!"));

        let t1 = chart.initial_state().create_transition(&s1)?;
        let t2 = s1.create_transition_with_action(&chart.final_state(), || println!("[t2]"))?;
        let flag = self.g1.clone();
        t1.create_guard(move || flag.load(Ordering::SeqCst));
        let flag = self.g2.clone();
        t2.create_guard(move || flag.load(Ordering::SeqCst));
        t2.add_event(&self.e_t2);

        chart
            .initial_state()
            .create_event_callback(&self.e1, |e| println!("Event:[Initial]:{}", e.name()));
        for event in [&self.e1, &self.e2, &self.e3] {
            s1.create_event_callback(event, |e| println!("(Event):{}", e.name()));
        }
        Ok(chart)
    }
}

fn main() -> Result<(), ChartError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Nested Chart ===\n");

    let chart = Chart::new("chart")?;
    let state1 = chart.create_state("state1")?;
    let control = SubchartControl::new();
    let subchart = control.build()?;
    chart.add_subchart(&subchart);

    chart
        .initial_state()
        .create_transition_with_action(&state1, || println!("[tInit]"))?;
    let t_sub = state1.create_transition_with_action(&subchart, || println!("[tSub]"))?;
    let t_final = subchart.create_transition_with_action(&chart.final_state(), || println!("[tFinal]"))?;
    let t_again = subchart.create_transition_with_action(&state1, || println!("[tAgain]"))?;

    let ready = Arc::new(AtomicBool::new(false));
    let flag = ready.clone();
    t_sub.create_guard(move || flag.load(Ordering::SeqCst));

    let e_finish = Event::new("eFinish");
    let e_again = Event::new("eAgain");
    t_final.add_event(&e_finish);
    t_again.add_event(&e_again);

    let e_sub = Event::new("eSub");
    subchart.create_event_callback(&e_sub, |e| println!("(Event):{}", e.name()));

    for observed in [&chart, &subchart] {
        let root = chart.clone();
        observed.create_state_change_callback(move |_| {
            println!("[Observer]:{}", root.current_state_name_full())
        });
    }

    println!("===== start =====");
    chart.spin_async()?;
    wait_for(|| state1.is_active());

    println!("------ grant tSub and t1 ------");
    ready.store(true, Ordering::SeqCst);
    control.g1.store(true, Ordering::SeqCst);
    wait_for(|| subchart.current_state_name() == "s1");

    println!("------ trigger events e1, e2, e3, eSub ------");
    control.e1.trigger();
    control.e2.trigger();
    control.e3.trigger();
    e_sub.trigger();

    ready.store(false, Ordering::SeqCst);
    control.g1.store(false, Ordering::SeqCst);
    println!("------ trigger eAgain ------");
    e_again.trigger();
    wait_for(|| state1.is_active());

    println!("------ grant tSub ------");
    ready.store(true, Ordering::SeqCst);
    wait_for(|| subchart.initial_state().is_active());

    println!("------ setup tFinal hook ------");
    chart.stop();
    let finish = e_finish.clone();
    subchart.create_state_change_callback(move |name| {
        if name == "final" {
            finish.trigger();
        }
    });
    chart.spin_async()?;

    control.g1.store(true, Ordering::SeqCst);
    control.g2.store(true, Ordering::SeqCst);
    wait_for(|| subchart.get_state("s1").is_some_and(|s1| s1.is_active()));
    println!("------ trigger eT2 ------");
    control.e_t2.trigger();

    wait_for(|| chart.final_state().is_active());
    chart.stop();
    println!("===== stop =====");
    Ok(())
}
