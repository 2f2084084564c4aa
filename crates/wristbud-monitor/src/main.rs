//! `wristbud`: run the health monitoring loop from a terminal, sign in to the
//! backend, print or upload demo readings, and edit the stored preferences.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use escalation_guards::{
    EscalationHandle, EscalationOptions, EscalationRuntime, PromptStage, SilentClassifier,
};
use prometheus_bridge::EscalationMetrics;
use rand::rngs::StdRng;
use rand::SeedableRng;
use telemetry_dispatch::{HttpNotifier, MemoryNotifier, Notifier, TelemetryDispatcher};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vitals_core::{Credentials, JsonFilePreferenceStore, PreferenceStore};
use wristbud_monitor::{
    demo_location, DemoScenario, DemoSensorSource, Monitor, ScriptedSensorSource, SensorSource,
    SAMPLE_PERIOD,
};

fn cli() -> Command {
    Command::new("wristbud")
        .about("Wearable vital-sign monitor with two-stage emergency confirmation")
        .subcommand_required(true)
        .arg(
            Arg::new("prefs")
                .long("prefs")
                .global(true)
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .default_value("wristbud-prefs.json")
                .help("Preference file (JSON key-value)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("run")
                .about("Sample vitals every period and escalate critical readings")
                .arg(
                    Arg::new("scenario")
                        .long("scenario")
                        .value_name("critical|abnormal|normal")
                        .value_parser(value_parser!(DemoScenario))
                        .conflicts_with("heart-rates")
                        .help("Feed synthetic readings from a demo scenario"),
                )
                .arg(
                    Arg::new("heart-rates")
                        .long("heart-rates")
                        .value_name("BPM,...")
                        .value_delimiter(',')
                        .value_parser(value_parser!(u32))
                        .help("Replay these heart rates, one per tick; 0 is a sensor gap"),
                )
                .arg(
                    Arg::new("period-secs")
                        .long("period-secs")
                        .value_parser(value_parser!(u64).range(1..))
                        .default_value("5")
                        .help("Sampling period"),
                )
                .arg(
                    Arg::new("tick-ms")
                        .long("tick-ms")
                        .value_parser(value_parser!(u64).range(1..))
                        .default_value("1000")
                        .help("Length of one countdown second"),
                )
                .arg(
                    Arg::new("duration-secs")
                        .long("duration-secs")
                        .value_parser(value_parser!(u64))
                        .help("Stop after this long instead of waiting for Ctrl-C"),
                )
                .arg(
                    Arg::new("offline")
                        .long("offline")
                        .action(ArgAction::SetTrue)
                        .help("Keep uploads in memory instead of posting them"),
                )
                .arg(
                    Arg::new("metrics")
                        .long("metrics")
                        .action(ArgAction::SetTrue)
                        .help("Print Prometheus metrics on exit"),
                ),
        )
        .subcommand(
            Command::new("demo")
                .about("Print one synthetic reading as JSON, or have the server record one")
                .arg(
                    Arg::new("scenario")
                        .required(true)
                        .value_parser(value_parser!(DemoScenario)),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(value_parser!(u64))
                        .conflicts_with("upload"),
                )
                .arg(
                    Arg::new("upload")
                        .long("upload")
                        .action(ArgAction::SetTrue)
                        .help("POST the scenario to the backend demo endpoint (needs login)"),
                ),
        )
        .subcommand(
            Command::new("login")
                .about("Sign in to the telemetry backend and store the session")
                .arg(Arg::new("email").required(true))
                .arg(
                    Arg::new("password")
                        .long("password")
                        .help("Read from stdin when omitted"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Inspect or change stored preferences")
                .subcommand_required(true)
                .subcommand(Command::new("show"))
                .subcommand(
                    Command::new("set-cooldown").arg(
                        Arg::new("minutes")
                            .required(true)
                            .allow_negative_numbers(true)
                            .value_parser(value_parser!(i64)),
                    ),
                )
                .subcommand(Command::new("set-server").arg(Arg::new("host").required(true)))
                .subcommand(
                    Command::new("set-context").arg(Arg::new("tag").required(true)),
                )
                .subcommand(
                    Command::new("monitoring").arg(
                        Arg::new("enabled")
                            .required(true)
                            .value_parser(value_parser!(bool)),
                    ),
                )
                .subcommand(
                    Command::new("prompting").arg(
                        Arg::new("enabled")
                            .required(true)
                            .value_parser(value_parser!(bool)),
                    ),
                )
                .subcommand(
                    Command::new("credentials")
                        .about("Store a session obtained elsewhere")
                        .arg(
                            Arg::new("user-id")
                                .required(true)
                                .value_parser(value_parser!(i64)),
                        )
                        .arg(Arg::new("token").required(true)),
                )
                .subcommand(Command::new("logout")),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    let prefs_path = matches
        .get_one::<PathBuf>("prefs")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("wristbud-prefs.json"));
    let prefs: Arc<dyn PreferenceStore> = Arc::new(JsonFilePreferenceStore::new(prefs_path));

    match matches.subcommand() {
        Some(("run", sub)) => run(sub, prefs).await,
        Some(("demo", sub)) => demo(sub, prefs).await,
        Some(("login", sub)) => login(sub, prefs).await,
        Some(("config", sub)) => config(sub, prefs.as_ref()),
        _ => bail!("no subcommand given"),
    }
}

async fn run(args: &ArgMatches, prefs: Arc<dyn PreferenceStore>) -> anyhow::Result<()> {
    let period = args
        .get_one::<u64>("period-secs")
        .map(|s| Duration::from_secs(*s))
        .unwrap_or(SAMPLE_PERIOD);
    let tick_period = Duration::from_millis(args.get_one::<u64>("tick-ms").copied().unwrap_or(1000));

    let metrics = EscalationMetrics::new().context("registering metrics")?;
    let notifier: Arc<dyn Notifier> = if args.get_flag("offline") {
        Arc::new(MemoryNotifier::new())
    } else {
        Arc::new(HttpNotifier::new(Arc::clone(&prefs)).context("building HTTP client")?)
    };
    let dispatcher = TelemetryDispatcher::new(notifier).with_metrics(metrics.clone());

    let (handle, escalation_task) = EscalationRuntime::spawn(
        Arc::clone(&prefs),
        dispatcher.clone(),
        Arc::new(SilentClassifier),
        Some(metrics.clone()),
        EscalationOptions {
            tick_period,
            ..EscalationOptions::default()
        },
    );

    let source: Box<dyn SensorSource> = match args.get_many::<u32>("heart-rates") {
        Some(rates) => Box::new(ScriptedSensorSource::from_heart_rates(rates.copied())),
        None => {
            let scenario = args
                .get_one::<DemoScenario>("scenario")
                .copied()
                .unwrap_or(DemoScenario::Normal);
            Box::new(DemoSensorSource::from_entropy(scenario))
        }
    };

    let monitor = Monitor::new(source, Arc::clone(&prefs), dispatcher, handle.clone())
        .with_metrics(metrics.clone())
        .with_period(period);
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let mut monitor_task = tokio::spawn(monitor.run(shutdown_rx));

    tokio::spawn(forward_console(handle.clone()));
    tokio::spawn(show_prompts(handle.clone()));

    let deadline = args.get_one::<u64>("duration-secs").copied();
    let monitor_done = tokio::select! {
        _ = tokio::signal::ctrl_c() => { info!("interrupted"); false }
        _ = sleep_or_forever(deadline) => false,
        res = &mut monitor_task => {
            res.context("monitor task panicked")?.context("monitor failed")?;
            true
        }
    };

    if !monitor_done {
        let _ = shutdown_tx.send(()).await;
        monitor_task
            .await
            .context("monitor task panicked")?
            .context("monitor failed")?;
    }
    if handle.shutdown().await.is_err() {
        warn!("escalation runtime already stopped");
    }
    escalation_task.await.context("escalation task panicked")?;

    if args.get_flag("metrics") {
        print!("{}", metrics.render().context("rendering metrics")?);
    }
    Ok(())
}

async fn sleep_or_forever(secs: Option<u64>) {
    match secs {
        Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
        None => std::future::pending::<()>().await,
    }
}

/// Console lines answer whichever prompt is showing.
async fn forward_console(handle: EscalationHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        if handle.respond_text(line).await.is_err() {
            break;
        }
    }
}

async fn show_prompts(handle: EscalationHandle) {
    let mut views = handle.subscribe();
    let mut last_stage = PromptStage::None;
    while views.changed().await.is_ok() {
        let view = views.borrow_and_update().clone();
        if view.stage != last_stage {
            match view.stage {
                PromptStage::Physical => println!("Are you OK? Type yes or no ({}s)", view.countdown_seconds.unwrap_or(0)),
                PromptStage::Voice => println!("No answer. Say or type yes / help ({}s)", view.countdown_seconds.unwrap_or(0)),
                PromptStage::None => println!("Prompt closed, status {}", view.display_severity),
            }
            last_stage = view.stage;
        }
    }
}

async fn demo(args: &ArgMatches, prefs: Arc<dyn PreferenceStore>) -> anyhow::Result<()> {
    let scenario = args
        .get_one::<DemoScenario>("scenario")
        .copied()
        .context("scenario is required")?;
    if args.get_flag("upload") {
        let notifier = HttpNotifier::new(prefs).context("building HTTP client")?;
        let response = notifier
            .post_demo(&scenario.to_string(), &demo_location())
            .await
            .with_context(|| format!("uploading {scenario} demo reading"))?;
        info!(%scenario, "demo reading recorded by server");
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    let mut rng = match args.get_one::<u64>("seed") {
        Some(seed) => StdRng::seed_from_u64(*seed),
        None => StdRng::from_entropy(),
    };
    let reading = scenario.generate(&mut rng, Utc::now());
    println!("{}", serde_json::to_string_pretty(&reading)?);
    Ok(())
}

async fn login(args: &ArgMatches, prefs: Arc<dyn PreferenceStore>) -> anyhow::Result<()> {
    let email = args.get_one::<String>("email").context("email is required")?;
    let password = match args.get_one::<String>("password") {
        Some(password) => password.clone(),
        None => {
            eprint!("Password: ");
            BufReader::new(tokio::io::stdin())
                .lines()
                .next_line()
                .await?
                .context("no password on stdin")?
        }
    };
    let notifier = HttpNotifier::new(prefs).context("building HTTP client")?;
    let credentials = notifier
        .login(email, &password)
        .await
        .context("login failed")?;
    println!("logged in as user {}", credentials.user_id);
    Ok(())
}

fn config(args: &ArgMatches, prefs: &dyn PreferenceStore) -> anyhow::Result<()> {
    match args.subcommand() {
        Some(("show", _)) => {
            let config = prefs.load()?;
            let logged_in = prefs.credentials()?.is_some();
            let shown = serde_json::json!({
                "config": config,
                "api_base": config.api_base(),
                "logged_in": logged_in,
            });
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        Some(("set-cooldown", sub)) => {
            let minutes = sub.get_one::<i64>("minutes").copied().context("minutes is required")?;
            prefs.set_cooldown_minutes(minutes)?;
            println!("prompt cooldown set to {minutes} minutes");
        }
        Some(("set-server", sub)) => {
            let host = sub.get_one::<String>("host").context("host is required")?;
            let mut config = prefs.load()?;
            config.server_endpoint = host.clone();
            prefs.store(&config)?;
            println!("server set to {}", config.api_base());
        }
        Some(("set-context", sub)) => {
            let tag = sub.get_one::<String>("tag").context("tag is required")?;
            let mut config = prefs.load()?;
            config.context_tag = tag.clone();
            prefs.store(&config)?;
        }
        Some((toggle @ ("monitoring" | "prompting"), sub)) => {
            let enabled = sub.get_one::<bool>("enabled").copied().unwrap_or(true);
            let mut config = prefs.load()?;
            if toggle == "monitoring" {
                config.monitoring_enabled = enabled;
            } else {
                config.prompting_enabled = enabled;
            }
            prefs.store(&config)?;
        }
        Some(("credentials", sub)) => {
            let credentials = Credentials {
                user_id: sub.get_one::<i64>("user-id").copied().context("user id is required")?,
                token: sub.get_one::<String>("token").cloned().context("token is required")?,
            };
            if !credentials.is_valid() {
                bail!("user id must be non-negative and token non-empty");
            }
            prefs.store_credentials(Some(&credentials))?;
        }
        Some(("logout", _)) => prefs.store_credentials(None)?,
        _ => bail!("unknown config command"),
    }
    Ok(())
}
