//! A thin CLI around the verification scenarios, for driving one test from
//! an external runner: verify a source node's imported chain, resolve its
//! peer endpoint, and verify one candidate's sync against it.
//!
//! A return code of `0` indicates every requested scenario passed.

use clap::{App, Arg, ArgMatches};
use slog::{crit, info, o, Drain, Level, Logger};
use std::process;
use std::time::Duration;
use url::Url;

use sync_verifier::engine_api::auth::JwtKey;
use sync_verifier::fixtures::Fixtures;
use sync_verifier::node::NodeHandle;
use sync_verifier::wait::SyncWaiter;
use sync_verifier::{source_peer_endpoint, verify_candidate_sync, verify_source_chain};

fn main() {
    let matches = App::new("sync_verifier")
        .about(
            "Verifies that an execution client can sync the fixture chain from a node \
             acting as a sync source.",
        )
        .arg(
            Arg::with_name("fixtures")
                .long("fixtures")
                .value_name("DIR")
                .help(
                    "Directory holding the pre-generated test artifacts (genesis.json, \
                     chain.rlp, forkenv.json, headblock.json, headnewpayload.json, \
                     headfcu.json).",
                )
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("source-rpc")
                .long("source-rpc")
                .value_name("URL")
                .help("RPC endpoint of the node pre-loaded with the fixture chain.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("candidate-rpc")
                .long("candidate-rpc")
                .value_name("URL")
                .help(
                    "RPC endpoint of the candidate node that should sync from the source. \
                     Its engine API is expected at the RPC port + 6.",
                )
                .takes_value(true)
                .requires("jwt-secret"),
        )
        .arg(
            Arg::with_name("jwt-secret")
                .long("jwt-secret")
                .value_name("HEX")
                .help("Hex-encoded 32-byte secret shared with the candidate's engine API.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("client")
                .long("client")
                .value_name("NAME")
                .help("Label for the candidate client implementation, used in logs and verdicts.")
                .default_value("client")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("sync-timeout")
                .long("sync-timeout")
                .value_name("SECONDS")
                .help("Seconds before a sync is considered stalled or failed.")
                .default_value("60")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("debug-level")
                .long("debug-level")
                .value_name("LEVEL")
                .help("Log verbosity.")
                .default_value("info")
                .possible_values(&["info", "debug", "trace", "warn", "error"])
                .takes_value(true),
        )
        .get_matches();

    let log = build_logger(matches.value_of("debug-level").unwrap_or("info"));

    if let Err(e) = run(&matches, &log) {
        crit!(log, "Scenario failed"; "verdict" => %e);
        process::exit(1);
    }
    info!(log, "All requested scenarios passed");
}

fn run(matches: &ArgMatches<'_>, log: &Logger) -> Result<(), String> {
    let fixtures_dir = matches.value_of("fixtures").ok_or("--fixtures is required")?;
    let fixtures = Fixtures::new(fixtures_dir);
    fixtures
        .ensure_available()
        .map_err(|e| format!("test artifacts unavailable: {:?}", e))?;
    let fork_env = fixtures.fork_env().map_err(|e| format!("{:?}", e))?;
    info!(
        log,
        "Loaded fixture set";
        "dir" => %fixtures_dir,
        "fork_params" => fork_env.len(),
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to build runtime: {}", e))?;
    runtime.block_on(run_scenarios(matches, &fixtures, log))
}

async fn run_scenarios(
    matches: &ArgMatches<'_>,
    fixtures: &Fixtures,
    log: &Logger,
) -> Result<(), String> {
    if let Some(url) = matches.value_of("source-rpc") {
        let url = Url::parse(url).map_err(|e| format!("invalid --source-rpc: {}", e))?;
        let source = NodeHandle::new("source", url).map_err(|e| format!("{:?}", e))?;
        verify_source_chain(&source, fixtures, log)
            .await
            .map_err(|e| e.to_string())?;
        let enode = source_peer_endpoint(&source, log)
            .await
            .map_err(|e| e.to_string())?;
        info!(log, "Source node verified"; "enode" => %enode);
    }

    if let Some(url) = matches.value_of("candidate-rpc") {
        let url = Url::parse(url).map_err(|e| format!("invalid --candidate-rpc: {}", e))?;
        let client = matches.value_of("client").unwrap_or("client");
        let jwt_hex = matches
            .value_of("jwt-secret")
            .ok_or("--jwt-secret is required to drive the candidate's engine API")?;
        let jwt_key =
            JwtKey::from_hex(jwt_hex).map_err(|e| format!("invalid --jwt-secret: {:?}", e))?;
        let timeout = matches
            .value_of("sync-timeout")
            .unwrap_or("60")
            .parse::<u64>()
            .map_err(|e| format!("invalid --sync-timeout: {}", e))?;
        let waiter = SyncWaiter::new(Duration::from_secs(timeout));

        let candidate = NodeHandle::new(client, url).map_err(|e| format!("{:?}", e))?;
        let outcome = verify_candidate_sync(&candidate, jwt_key, fixtures, &waiter, log)
            .await
            .map_err(|e| e.to_string())?;
        if !outcome.is_synced() {
            return Err(format!("sync failed: {}", outcome));
        }
        info!(log, "Sync verified"; "client" => %client, "outcome" => %outcome);
    }

    Ok(())
}

fn build_logger(debug_level: &str) -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build();
    let drain = match debug_level {
        "debug" => drain.filter_level(Level::Debug),
        "trace" => drain.filter_level(Level::Trace),
        "warn" => drain.filter_level(Level::Warning),
        "error" => drain.filter_level(Level::Error),
        _ => drain.filter_level(Level::Info),
    };
    Logger::root(drain.fuse(), o!())
}
