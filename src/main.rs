use std::{
    io::{self, Write},
    process,
    sync::Arc,
};

use querydeck::{
    application::{Fingerprint, QueryOrchestrator, RunSnapshot, StateView, error::AppError},
    cache::{self, CacheBackend, FsStore},
    config::{self, CacheCommand, ClearArgs, Command, LoadArgs, Settings},
    domain::PageDefinition,
    infra::{http_client::HttpResourceClient, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(error = %report.chain(), "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %report.chain(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Load(args) => run_load(settings, args).await,
        Command::Cache(args) => match args.command {
            CacheCommand::Clear(clear) => run_cache_clear(settings, clear).await,
        },
    }
}

async fn run_load(settings: Settings, args: LoadArgs) -> Result<(), AppError> {
    let page = PageDefinition::from_path(&args.page)?;
    let client = HttpResourceClient::from_settings(&settings.backend)?;

    let cache_enabled = settings.cache.enabled && !args.no_cache;
    let store = if cache_enabled {
        Some(cache::open_store(&settings.cache)?)
    } else {
        None
    };

    let fingerprint = if args.fingerprint.is_empty() {
        Fingerprint::from(page.fingerprint.clone())
    } else {
        Fingerprint::new(args.fingerprint.iter().cloned())
    };

    info!(
        page = %args.page.display(),
        base_url = %settings.backend.base_url,
        cache_enabled,
        "Loading page"
    );

    let orchestrator = QueryOrchestrator::new(Arc::new(client), store);
    let mut view = orchestrator.run(page.descriptors(), fingerprint, cache_enabled)?;

    let snapshot = if args.watch {
        watch_until_settled(&mut view).await?
    } else {
        match view.settled().await {
            Some(snapshot) => snapshot,
            None => view.snapshot(),
        }
    };

    let failed = snapshot
        .states
        .values()
        .filter(|state| state.error.is_some())
        .count();
    info!(
        queries = snapshot.states.len(),
        failed,
        generation = snapshot.generation,
        "Page load settled"
    );

    let rendered = serde_json::to_string_pretty(&snapshot.states)
        .map_err(|err| AppError::unexpected(format!("failed to render states: {err}")))?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{rendered}").map_err(|err| AppError::Infra(err.into()))?;
    Ok(())
}

/// Print every snapshot as one JSON line until no query is loading.
async fn watch_until_settled(view: &mut StateView) -> Result<RunSnapshot, AppError> {
    let mut snapshot = view.snapshot();
    print_snapshot_line(&snapshot)?;
    while snapshot.any_loading() {
        match view.changed().await {
            Some(next) => {
                snapshot = next;
                print_snapshot_line(&snapshot)?;
            }
            None => break,
        }
    }
    Ok(snapshot)
}

fn print_snapshot_line(snapshot: &RunSnapshot) -> Result<(), AppError> {
    let line = serde_json::json!({
        "generation": snapshot.generation,
        "all_loading": snapshot.all_loading(),
        "any_loading": snapshot.any_loading(),
        "states": snapshot.states,
    });
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{line}").map_err(|err| AppError::Infra(err.into()))
}

async fn run_cache_clear(settings: Settings, _args: ClearArgs) -> Result<(), AppError> {
    if settings.cache.backend == CacheBackend::Memory {
        warn!("Memory cache backend holds nothing between runs; nothing to clear");
        return Ok(());
    }

    let store = FsStore::open(&settings.cache.directory)?;
    let removed = store.clear().await?;
    info!(
        directory = %store.directory().display(),
        removed,
        "Cache cleared"
    );
    Ok(())
}
