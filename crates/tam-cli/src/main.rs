use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tam_core::{BuildId, CancellationToken, Cohort, Configuration, TamError, TamResult};
use tam_engine::{calibration_pool, generate_assignments, AssignmentInput};
use tam_store::{
    AssignmentSnapshot, BuildData, MemoryStore, ParsedSnapshot, SnapshotSource, TierFilter,
};
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

mod cli;
mod manifest;
mod summary;

use cli::{Cli, Commands};
use manifest::{write_manifest, RunManifest};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Trip the run's cancellation token on Ctrl-C. The engine observes the
/// token at its next pass boundary.
fn install_interrupt(token: CancellationToken) {
    unsafe {
        libc::signal(libc::SIGINT, on_sigint as libc::sighandler_t);
    }
    std::thread::spawn(move || loop {
        if INTERRUPTED.load(Ordering::SeqCst) {
            token.cancel();
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    });
}

fn main() {
    let cli = Cli::parse();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("failed to initialize logging");
    }

    match run(cli) {
        Ok(()) => {}
        Err(err) => {
            error!("{err}");
            eprintln!("error: {err}");
            std::process::exit(err.exit_code());
        }
    }
}

fn run(cli: Cli) -> TamResult<()> {
    match cli.command {
        Commands::Assign {
            build,
            cohort,
            tier,
            snapshot,
            out,
            dry_run,
        } => assign(
            cli.config.as_deref(),
            &build,
            &cohort,
            &tier,
            &snapshot,
            &out,
            dry_run,
        ),
        Commands::Calibrate {
            build,
            cohort,
            snapshot,
        } => calibrate(cli.config.as_deref(), &build, &cohort, &snapshot),
    }
}

/// Configuration precedence: explicit file, then snapshot-embedded, then
/// defaults.
fn load_config(
    path: Option<&Path>,
    embedded: Option<Configuration>,
) -> TamResult<Configuration> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)
                .map_err(|e| TamError::Config(format!("{}: {e}", path.display())))?
        }
        None => embedded.unwrap_or_default(),
    };
    config.validate()?;
    Ok(config)
}

fn load_snapshot(path: &Path) -> TamResult<ParsedSnapshot> {
    AssignmentSnapshot::from_json_file(path)?.parse()
}

#[allow(clippy::too_many_arguments)]
fn assign(
    config_path: Option<&Path>,
    build: &str,
    cohort: &str,
    tier: &str,
    snapshot_path: &Path,
    out: &Path,
    dry_run: bool,
) -> TamResult<()> {
    let cohort: Cohort = cohort.parse()?;
    let tier_filter: TierFilter = tier.parse()?;
    let parsed = load_snapshot(snapshot_path)?;
    let configuration = load_config(config_path, parsed.configuration.clone())?;
    let build_id = BuildId::new(build);

    // Route the pool through the store contract so tier filtering and the
    // stable name sort match what a backing service would return.
    let mut store = MemoryStore::new();
    store.seed(
        build_id.clone(),
        BuildData {
            accounts: parsed.accounts,
            reps: parsed.reps,
            opportunities: parsed.opportunities,
        },
    );
    let accounts = store
        .read_accounts(&build_id, cohort, tier_filter)
        .map_err(|e| TamError::Other(e.to_string()))?;
    let reps = store
        .read_reps(&build_id)
        .map_err(|e| TamError::Other(e.to_string()))?;
    let opportunities = store
        .read_opportunities(&build_id)
        .map_err(|e| TamError::Other(e.to_string()))?;

    let cancellation = CancellationToken::new();
    install_interrupt(cancellation.clone());

    let input = AssignmentInput {
        build_id: build_id.clone(),
        cohort,
        accounts,
        reps,
        opportunities,
        configuration,
        cancellation,
    };
    let output = generate_assignments(&input)?;

    let rendered = summary::render_summary(&output).map_err(|e| TamError::Other(e.to_string()))?;
    println!("{rendered}");

    if dry_run {
        info!("dry run; nothing written");
        return Ok(());
    }

    std::fs::create_dir_all(out)?;
    write_json(&out.join("proposals.json"), &output.proposals)?;
    write_json(&out.join("warnings.json"), &output.warnings)?;
    write_json(&out.join("thresholds.json"), &output.thresholds)?;
    write_json(&out.join("cascade.json"), &output.cascade)?;
    write_manifest(
        out,
        &RunManifest {
            created_at: chrono::Utc::now(),
            build_id: build_id.to_string(),
            cohort: cohort.as_str().to_string(),
            snapshot: snapshot_path.display().to_string(),
            proposals: output.proposals.len(),
            warnings: output.warnings.len(),
            cascaded_children: output.cascade.children.len(),
            cascaded_opportunities: output.cascade.opportunities.len(),
        },
    )
    .map_err(|e| TamError::Other(e.to_string()))?;
    info!(out = %out.display(), "outputs written");
    Ok(())
}

fn calibrate(
    config_path: Option<&Path>,
    build: &str,
    cohort: &str,
    snapshot_path: &Path,
) -> TamResult<()> {
    let cohort: Cohort = cohort.parse()?;
    let parsed = load_snapshot(snapshot_path)?;
    let configuration = load_config(config_path, parsed.configuration.clone())?;

    let pool = calibration_pool(&parsed.accounts, &parsed.reps, cohort);
    let mut warnings = Vec::new();
    let thresholds = tam_engine::calibrate(
        &pool,
        &parsed.reps,
        &configuration,
        cohort,
        &mut warnings,
    )?;

    info!(build, pool = pool.len(), "calibration complete");
    let rendered =
        summary::render_thresholds(&thresholds).map_err(|e| TamError::Other(e.to_string()))?;
    println!("{rendered}");
    for warning in &warnings {
        println!("warning: {}", warning.message);
    }
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> TamResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}
