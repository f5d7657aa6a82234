// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::sync::mpsc;
use std::time::Instant;

use anyhow::{bail, Context};
use flowbridge::bridge::{SourceSpec, ValueEncoding};
use flowbridge::config::{load_and_validate_config, RuntimeBuilder};
use flowbridge::errors::FlowError;
use flowbridge::scheduler::ShutdownOutcome;
use flowbridge::traits::CallbackSubscriber;
use tracing_subscriber::EnvFilter;

/// What the subscriber observed, forwarded to the main thread for printing.
enum Event {
    Value(Vec<u8>),
    Completed,
    Failed(FlowError),
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <config.yaml|config.toml> [values...]", args[0]);
        eprintln!("Example: {} configs/text-pipeline.yaml", args[0]);
        eprintln!("Example: {} configs/text-pipeline.yaml \" one \" \"\" two", args[0]);
        std::process::exit(1);
    }
    let config_file = &args[1];
    let values = &args[2..];

    let mut config = load_and_validate_config(config_file)
        .with_context(|| format!("loading {}", config_file))?;

    // Values on the command line replace the configured source.
    if !values.is_empty() {
        match config.pipeline.as_mut() {
            Some(pipeline) => {
                pipeline.source = SourceSpec::Sequence {
                    values: values.to_vec(),
                    encoding: ValueEncoding::Utf8,
                }
            }
            None => bail!("{} has no pipeline section to feed values into", config_file),
        }
    }

    let (scheduler, pipeline) = RuntimeBuilder::from_config(&config)?;

    println!("📋 Configuration: {}", config_file);
    println!("🔧 Scheduler: {} ({:?})", scheduler.name(), scheduler.kind());
    println!("🔗 Pipeline: {}", pipeline.describe());
    println!();

    let (tx, rx) = mpsc::channel();
    let (done, failed) = (tx.clone(), tx.clone());
    let started = Instant::now();
    let subscription = pipeline.subscribe(CallbackSubscriber::new(
        move |value| {
            let _ = tx.send(Event::Value(value));
        },
        move || {
            let _ = done.send(Event::Completed);
        },
        move |error| {
            let _ = failed.send(Event::Failed(error));
        },
    ))?;
    subscription.request(u64::MAX)?;

    let mut delivered = 0usize;
    let outcome = loop {
        match rx.recv() {
            Ok(Event::Value(value)) => {
                delivered += 1;
                println!("  {}", String::from_utf8_lossy(&value));
            }
            Ok(Event::Completed) => break Ok(()),
            Ok(Event::Failed(error)) => break Err(error),
            Err(_) => bail!("subscription ended without a terminal event"),
        }
    };

    println!();
    match &outcome {
        Ok(()) => println!("✅ Completed: {} values in {:?}", delivered, started.elapsed()),
        Err(error) => println!("❌ Failed after {} values: {}", delivered, error),
    }

    match scheduler.shutdown() {
        ShutdownOutcome::Abandoned { pending } => {
            eprintln!("⚠️  Shutdown abandoned {} pending tasks", pending)
        }
        ShutdownOutcome::Drained | ShutdownOutcome::AlreadyShutdown => {}
    }

    outcome.map_err(Into::into)
}
