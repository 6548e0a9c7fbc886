//! sweep_recon - command line entry point
//!
//! ```text
//! sweep_recon --env dev --mode transfer --part 2
//! sweep_recon --env dev --mode credit-match
//! sweep_recon --env dev --mode revert-all
//! sweep_recon --env dev --mode plan            # print the scenario plan
//! sweep_recon --env dev --mode run             # run the whole plan
//! sweep_recon --env dev --mode simulate --mock # virtual-user pool
//! ```
//!
//! `--mock` swaps the HTTP ledger for a seeded in-memory one.

use std::sync::Arc;

use anyhow::{Context, bail};

use sweep_recon::config::AppConfig;
use sweep_recon::engine::{ReconciliationEngine, ScenarioOutcome};
use sweep_recon::error::EngineError;
use sweep_recon::ledger::{HttpLedgerClient, LedgerService};
use sweep_recon::observed::{LedgerMirror, ObservedState};
use sweep_recon::report::ReportRow;
use sweep_recon::scenario::{ScenarioDescriptor, ScenarioKind};
use sweep_recon::simulation::{AccountProvisioner, VirtualUserPool};

fn get_arg(names: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if names.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn get_env() -> String {
    get_arg(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

fn get_mode() -> String {
    get_arg(&["--mode", "-m"]).unwrap_or_else(|| "plan".to_string())
}

fn get_part() -> anyhow::Result<Option<usize>> {
    get_arg(&["--part", "-p"])
        .map(|p| p.parse::<usize>().with_context(|| format!("invalid --part {:?}", p)))
        .transpose()
}

fn use_mock_ledger() -> bool {
    std::env::args().any(|a| a == "--mock")
}

fn print_rows(title: &str, rows: &[ReportRow]) {
    println!("--- {} ---", title);
    println!("{}", ReportRow::HEADER.join("\t"));
    for row in rows {
        println!("{}", row.cells().join("\t"));
    }
}

#[cfg(feature = "mock-ledger")]
fn demo_ledger() -> Arc<sweep_recon::ledger::InMemoryLedger> {
    use rust_decimal::Decimal;
    use sweep_recon::models::Provider;

    let providers = (1..=12).map(|id| {
        Provider::new(id, format!("provider-{:02}", id), Decimal::new(id * 50, 2))
    });
    Arc::new(sweep_recon::ledger::InMemoryLedger::with_providers(
        Decimal::from(1_000),
        providers,
    ))
}

struct Collaborators {
    ledger: Arc<dyn LedgerService>,
    observed: Arc<dyn ObservedState>,
    provisioner: Option<Arc<dyn AccountProvisioner>>,
}

fn collaborators(config: &AppConfig) -> anyhow::Result<Collaborators> {
    if use_mock_ledger() {
        #[cfg(feature = "mock-ledger")]
        {
            let ledger = demo_ledger();
            return Ok(Collaborators {
                observed: Arc::new(LedgerMirror::live(ledger.clone())),
                provisioner: Some(ledger.clone()),
                ledger,
            });
        }
        #[cfg(not(feature = "mock-ledger"))]
        bail!("--mock needs the mock-ledger feature");
    }

    let ledger: Arc<dyn LedgerService> = Arc::new(HttpLedgerClient::new(&config.ledger)?);
    Ok(Collaborators {
        observed: Arc::new(LedgerMirror::live(ledger.clone())),
        provisioner: None,
        ledger,
    })
}

fn report_error(e: &EngineError) {
    let rows: Vec<ReportRow> = e.mismatches().iter().map(ReportRow::from).collect();
    if !rows.is_empty() {
        print_rows("mismatches", &rows);
    }
    if let Some(outcome) = e.partial_outcome() {
        println!(
            "aborted part {}: {} ok, {} failed, expected credit {}",
            outcome.part,
            outcome.succeeded(),
            outcome.failed(),
            outcome.total_expected_credit
        );
        for record in &outcome.records {
            println!("{}\t{}\t{}", record.target_id, record.amount, record.status);
        }
    }
}

fn report(scenario: &ScenarioDescriptor, outcome: &ScenarioOutcome) {
    let status = if outcome.passed() { "PASS" } else { "FAIL" };
    print_rows(&format!("{} [{}]", scenario.label(), status), &outcome.report_rows());
    if let ScenarioOutcome::Transfer(part) = outcome {
        println!(
            "transfers: {} ok, {} failed, expected credit {}",
            part.outcome.succeeded(),
            part.outcome.failed(),
            part.outcome.total_expected_credit
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mode = get_mode();
    let config = AppConfig::load(&env)?;
    let _log_guard = sweep_recon::logging::init_logging(&config);

    tracing::info!(
        env = %env,
        mode = %mode,
        revision = env!("SWEEP_RECON_REVISION"),
        "Starting sweep_recon"
    );

    let collab = collaborators(&config)?;
    let user = collab.ledger.current_user().await?;
    tracing::info!(ledger = collab.ledger.name(), user, "Ledger session established");

    if mode == "simulate" {
        let Some(provisioner) = collab.provisioner else {
            bail!("simulate needs an account provisioner; run with --mock");
        };
        let pool = VirtualUserPool::from_config(
            provisioner,
            &config.simulation,
            config.ledger.timeouts.user(),
        )?;
        let summary = pool.run(config.simulation.users).await;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        if !summary.all_succeeded() {
            bail!("{} of {} virtual users failed", summary.failed, summary.attempted);
        }
        return Ok(());
    }

    let mut engine = ReconciliationEngine::new(collab.ledger, collab.observed, &config.engine)?;

    if mode == "plan" || mode == "run" {
        let plan = engine
            .plan(engine.plan_builder().with_credit_match().with_revert_all())
            .await?;
        for scenario in &plan.scenarios {
            println!("{}", scenario.label());
        }
        if mode == "plan" {
            return Ok(());
        }

        let mut failed = 0;
        for (scenario, result) in engine.run_plan(&plan).await {
            match result {
                Ok(outcome) => {
                    report(&scenario, &outcome);
                    failed += usize::from(!outcome.passed());
                }
                Err(e) => {
                    eprintln!("{}: {}", scenario.label(), e);
                    report_error(&e);
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            bail!("{} scenario(s) failed", failed);
        }
        return Ok(());
    }

    let scenario = ScenarioDescriptor {
        index: 0,
        kind: ScenarioKind::resolve(&mode, get_part()?)?,
    };
    match engine.run_scenario(&scenario).await {
        Ok(outcome) => {
            report(&scenario, &outcome);
            if !outcome.passed() {
                bail!("{} failed verification", scenario.label());
            }
            Ok(())
        }
        Err(e) => {
            report_error(&e);
            Err(e.into())
        }
    }
}
