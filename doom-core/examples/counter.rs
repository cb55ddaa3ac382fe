//! Counter demo
//!
//! A counter signal, a derive rendering it as text, a derive keeping the
//! history of every value, and effects printing both. Run with
//! `RUST_LOG=doom_core=trace` to watch dependency tracking and flushes.

use tracing::info;
use tracing_subscriber::EnvFilter;

use doom_core::{batch, create_derive, create_effect, create_signal, ReactiveError};

fn main() -> Result<(), ReactiveError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (count, set_count) = create_signal(0);

    let source = count.clone();
    let label = create_derive(String::new(), move |_| {
        let value = source.get();
        format!("{value} x 2 = {}", value * 2)
    })?;

    let source = count.clone();
    let history = create_derive(Vec::new(), move |previous: Vec<i32>| {
        let mut next = Vec::with_capacity(previous.len() + 1);
        next.push(source.get());
        next.extend(previous);
        next
    })?;

    let reader = label.clone();
    create_effect(move || info!(label = %reader.get(), "render label"))?;

    let reader = history.clone();
    create_effect(move || info!(history = ?reader.get(), "render history"))?;

    for value in 1..=3 {
        set_count.set(value)?;
    }

    // Both writes land in one flush; only 10 reaches the history.
    batch(|| -> Result<(), ReactiveError> {
        set_count.set(5)?;
        set_count.set(10)?;
        Ok(())
    })??;

    // Equal value: nothing re-runs.
    set_count.set(10)?;

    info!(history = ?history.get_untracked(), "done");
    Ok(())
}
