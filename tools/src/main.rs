//! recon-runner: headless driver for the commission reconciliation engine.
//!
//! Usage:
//!   recon-runner ingest --db court.db --source commission --file rows.json
//!   recon-runner auto-match --db court.db [--batch ID]
//!   recon-runner assign --db court.db --commission ID --contract ID [--advisor ID]
//!   recon-runner suggest --db court.db --commission ID
//!   recon-runner generate --db court.db --month 2026-03
//!   recon-runner transition --db court.db --statement ID --to approved
//!   recon-runner summary --db court.db --from 2026-03-01 --to 2026-04-01
//!   recon-runner demo --db court.db --seed 42

use std::env;
use std::fs;

use anyhow::{bail, Context, Result};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use sha2::{Digest, Sha256};

use courtage_core::admin_subsystem::AdvisorInput;
use courtage_core::config::EngineConfig;
use courtage_core::import_subsystem::{
    CommissionRowInput, ConsultationRowInput, ContractRowInput, ImportRows,
};
use courtage_core::matching_subsystem::SuggestDirection;
use courtage_core::types::SettlementStatus;
use courtage_core::CommissionEngine;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1) else {
        print_usage();
        return Ok(());
    };

    let db = str_arg(&args, "--db").unwrap_or(":memory:");
    let config = match str_arg(&args, "--config") {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("reading config file {path}"))?;
            EngineConfig::from_json(&json)?
        }
        None => EngineConfig::default(),
    };
    let engine = CommissionEngine::open(db, config)?;

    match command.as_str() {
        "ingest" => cmd_ingest(&engine, &args),
        "auto-match" => cmd_auto_match(&engine, &args),
        "assign" => cmd_assign(&engine, &args),
        "suggest" => cmd_suggest(&engine, &args),
        "generate" => cmd_generate(&engine, &args),
        "transition" => cmd_transition(&engine, &args),
        "summary" => cmd_summary(&engine, &args),
        "demo" => cmd_demo(&engine, &args),
        other => {
            print_usage();
            bail!("unknown command '{other}'");
        }
    }
}

fn cmd_ingest(engine: &CommissionEngine, args: &[String]) -> Result<()> {
    let source = str_arg(args, "--source").context("--source is required")?;
    let file = str_arg(args, "--file").context("--file is required")?;
    let forced = flag(args, "--force");

    let content = fs::read_to_string(file).with_context(|| format!("reading {file}"))?;
    let rows = match source {
        "commission" => ImportRows::Commission(serde_json::from_str::<Vec<CommissionRowInput>>(&content)?),
        "contract" => ImportRows::Contract(serde_json::from_str::<Vec<ContractRowInput>>(&content)?),
        "consultation" => {
            ImportRows::Consultation(serde_json::from_str::<Vec<ConsultationRowInput>>(&content)?)
        }
        other => bail!("unknown source '{other}'"),
    };
    let fingerprint = match str_arg(args, "--fingerprint") {
        Some(fp) => fp.to_string(),
        None => format!("{:x}", Sha256::digest(content.as_bytes())),
    };

    let batch = engine.ingest(rows, &fingerprint, str_arg(args, "--label"), forced)?;
    println!("batch {}", batch.batch_id);
    println!(
        "  seen {} / imported {} / skipped {} / errored {}",
        batch.rows_seen, batch.rows_imported, batch.rows_skipped, batch.rows_errored
    );
    Ok(())
}

fn cmd_auto_match(engine: &CommissionEngine, args: &[String]) -> Result<()> {
    let summary = engine.auto_match(str_arg(args, "--batch"))?;
    println!("exact            {}", summary.exact);
    println!("alternate        {}", summary.alternate);
    println!("consultation     {}", summary.consultation);
    println!("advisor backfill {}", summary.advisor_backfill);
    println!("broker mapping   {}", summary.broker_mapping);
    println!("splits computed  {}", summary.splits_computed);
    println!("contracts moved  {}", summary.contracts_advanced);
    Ok(())
}

fn cmd_assign(engine: &CommissionEngine, args: &[String]) -> Result<()> {
    let commission = str_arg(args, "--commission").context("--commission is required")?;
    let contract = str_arg(args, "--contract").context("--contract is required")?;
    let outcome = engine.assign(commission, contract, str_arg(args, "--advisor"))?;
    println!(
        "assigned {} (advisor {:?}, {} siblings followed)",
        outcome.commission_id, outcome.advisor_id, outcome.siblings_linked
    );
    Ok(())
}

fn cmd_suggest(engine: &CommissionEngine, args: &[String]) -> Result<()> {
    let (id, direction) = match (str_arg(args, "--commission"), str_arg(args, "--contract")) {
        (Some(id), None) => (id, SuggestDirection::CommissionToContract),
        (None, Some(id)) => (id, SuggestDirection::ContractToCommission),
        _ => bail!("pass exactly one of --commission or --contract"),
    };
    let suggestions = engine.suggest(id, direction)?;
    if suggestions.is_empty() {
        println!("no candidates");
    }
    for s in suggestions {
        println!("{:>3}  {}  ({})", s.score, s.id, s.reason);
    }
    Ok(())
}

fn cmd_generate(engine: &CommissionEngine, args: &[String]) -> Result<()> {
    let month = str_arg(args, "--month").context("--month is required")?;
    let statements = engine.generate(month)?;
    println!("{} statements for {month}", statements.len());
    for s in &statements {
        println!(
            "  {} rev {}  advisor {}  gross {}  net {}  chargeback {}  payout {}",
            s.statement_id,
            s.revision,
            s.advisor_id,
            euro(s.gross_cents),
            euro(s.net_cents),
            euro(s.chargeback_cents),
            euro(s.payout_cents),
        );
    }
    Ok(())
}

fn cmd_transition(engine: &CommissionEngine, args: &[String]) -> Result<()> {
    let statement = str_arg(args, "--statement").context("--statement is required")?;
    let to = SettlementStatus::parse(str_arg(args, "--to").context("--to is required")?)?;
    let updated = engine.transition_statement(statement, to)?;
    println!(
        "statement {} -> {} (locked: {})",
        updated.statement_id, updated.status, updated.locked
    );
    Ok(())
}

fn cmd_summary(engine: &CommissionEngine, args: &[String]) -> Result<()> {
    let from = str_arg(args, "--from").context("--from is required")?;
    let to = str_arg(args, "--to").context("--to is required")?;
    let dashboard = engine.dashboard(from, to)?;

    println!(
        "period {from} .. {to} (as of {})",
        chrono::Local::now().format("%Y-%m-%d %H:%M")
    );
    println!(
        "gross {}  net {}  chargebacks {}",
        euro(dashboard.gross_cents),
        euro(dashboard.net_cents),
        euro(dashboard.chargeback_cents)
    );
    for row in &dashboard.advisors {
        println!(
            "  {:<24} gross {}  net {}  chargebacks {}  ({} rows)",
            row.name,
            euro(row.gross_cents),
            euro(row.net_cents),
            euro(row.chargeback_cents),
            row.commission_count
        );
    }
    let c = &dashboard.clearance;
    println!(
        "clearance: {} without contract, {} unknown broker, {} without rate model, {} without split",
        c.no_contract, c.unknown_broker, c.no_rate_model, c.no_split
    );
    Ok(())
}

/// Seed a deterministic demo book of business, run the pipeline and print
/// the March summary.
fn cmd_demo(engine: &CommissionEngine, args: &[String]) -> Result<()> {
    let seed = u64_arg(args, "--seed", 42);
    let mut rng = Pcg64::seed_from_u64(seed);

    let lead = engine.create_advisor(&AdvisorInput {
        name: "Teamleitung Nord".into(),
        role: "team_lead".into(),
        commission_rate: None,
        team_lead_id: None,
        override_rate: Some(10.0),
        override_basis: Some("advisor_share".into()),
    })?;
    let names = ["Vermittler Nord", "Vermittler Süd", "Vermittler West"];
    for (i, name) in names.iter().enumerate() {
        let advisor = engine.create_advisor(&AdvisorInput {
            name: name.to_string(),
            role: "advisor".into(),
            commission_rate: Some(25.0 + 5.0 * i as f64),
            team_lead_id: Some(lead.advisor_id.clone()),
            override_rate: None,
            override_basis: None,
        })?;
        engine.upsert_mapping(name, &advisor.advisor_id)?;
    }

    let mut contracts = Vec::new();
    for i in 0..60u64 {
        contracts.push(ContractRowInput {
            policy_number: format!("LV-{}", 111_111 + i * 7),
            alternate_policy_number: None,
            account_holder: Some(format!("Kunde {i}")),
            insurer: None,
            product: Some("LV".into()),
            advisor_name: Some(names[(i % 3) as usize].to_string()),
            status: None,
            begin_date: None,
        });
    }
    engine.ingest(ImportRows::Contract(contracts), &format!("demo-c-{seed}"), None, false)?;

    let mut commissions = Vec::new();
    for i in 0..200u64 {
        let known = rng.gen_bool(0.9);
        let policy = if known {
            format!("LV-{}", 111_111 + (rng.gen_range(0..60u64)) * 7)
        } else {
            format!("LV-{}", 900_000 + i)
        };
        let amount = if rng.gen_bool(0.12) {
            -(rng.gen_range(50.0..400.0f64) * 100.0).round() / 100.0
        } else {
            (rng.gen_range(50.0..1200.0f64) * 100.0).round() / 100.0
        };
        commissions.push(CommissionRowInput {
            policy_number: policy,
            amount,
            kind: None,
            paid_on: format!("2026-03-{:02}", rng.gen_range(1..=28)),
            broker_name: None,
            account_holder: None,
            installment_no: Some(i as i64),
            installment_count: None,
        });
    }
    engine.ingest(
        ImportRows::Commission(commissions),
        &format!("demo-k-{seed}"),
        None,
        false,
    )?;

    engine.auto_match(None)?;
    engine.generate("2026-03")?;
    cmd_summary(
        engine,
        &[
            String::new(),
            String::new(),
            "--from".into(),
            "2026-03-01".into(),
            "--to".into(),
            "2026-04-01".into(),
        ],
    )
}

// ── Argument helpers ─────────────────────────────────────────────

fn str_arg<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == name)
        .map(|w| w[1].as_str())
}

fn u64_arg(args: &[String], name: &str, default: u64) -> u64 {
    str_arg(args, name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

fn euro(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{sign}{}.{:02} EUR", abs / 100, abs % 100)
}

fn print_usage() {
    println!("recon-runner — commission reconciliation engine driver");
    println!();
    println!("commands:");
    println!("  ingest      --db F --source commission|contract|consultation --file F [--force]");
    println!("  auto-match  --db F [--batch ID]");
    println!("  assign      --db F --commission ID --contract ID [--advisor ID]");
    println!("  suggest     --db F --commission ID | --contract ID");
    println!("  generate    --db F --month YYYY-MM");
    println!("  transition  --db F --statement ID --to computed|reviewed|approved|paid");
    println!("  summary     --db F --from YYYY-MM-DD --to YYYY-MM-DD");
    println!("  demo        --db F [--seed N]");
    println!();
    println!("  --config F  JSON engine configuration (scoring weights, limits)");
}
