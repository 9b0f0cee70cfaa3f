use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use monitor_core::{Config, logging};
use monitor_dashboard::{
    CommandDispatcher, Confirm, CreateForm, DashboardEngine, DisplayTree, EngineConfig,
    RemoveOutcome, ReqwestApi, WsTransport,
    connection::{ConnectionState, ConnectionStats},
};
use std::{io::Write, path::PathBuf, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::{Mutex, watch},
};
use tracing::info;

type Input = Arc<Mutex<Lines<BufReader<Stdin>>>>;

const HELP: &str = "\
commands:
  add <name> <url> <method> <interval> <timeout>   fill the form and submit it
  set <field> <value>                              edit one form field
  form                                             show the form
  submit                                           create the endpoint from the form
  check <id>                                       trigger a check now
  rm <id>                                          remove an endpoint
  refresh                                          reload all endpoints
  list                                             print the dashboard
  quit";

#[derive(Parser, Debug)]
#[command(name = "monitor-dashboard", version, about = "Live terminal dashboard for the endpoint monitor")]
struct Args {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Monitoring server base URL, e.g. http://localhost:8080
    #[arg(short, long)]
    server: Option<String>,
}

struct StdinConfirm {
    input: Input,
}

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        print!("{} [y/N] ", prompt);
        let _ = std::io::stdout().flush();
        match self.input.lock().await.next_line().await {
            Ok(Some(answer)) => matches!(answer.trim(), "y" | "Y" | "yes"),
            _ => false,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(server) = args.server {
        config.server.base_url = server;
    }
    info!("Starting Monitor Dashboard with config: {:?}", config);

    let api = ReqwestApi::new(config.base_url()?, config.request_timeout())?;
    let transport = WsTransport::new(config.push_url()?).with_connect_timeout(config.request_timeout());
    info!("Server {} / push channel {}", api.base_url(), transport.url());

    let engine = DashboardEngine::start(
        EngineConfig::from(&config),
        Arc::new(api),
        Arc::new(transport),
    );
    let printer = tokio::spawn(print_frames(
        engine.frames(),
        engine.connection_state(),
        engine.connection_stats(),
    ));

    let input: Input = Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()));
    let confirm = StdinConfirm {
        input: input.clone(),
    };
    let dispatcher = engine.dispatcher();
    let mut form = CreateForm::default();
    println!("{}", HELP);

    loop {
        let line = tokio::select! {
            line = async { input.lock().await.next_line().await } => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        };
        let Some(line) = line else { break };
        if !run_line(&dispatcher, &confirm, &mut form, &engine, line.trim()).await {
            break;
        }
    }

    printer.abort();
    engine.stop().await;
    Ok(())
}

/// Returns `false` when the operator asked to quit.
async fn run_line(
    dispatcher: &CommandDispatcher,
    confirm: &StdinConfirm,
    form: &mut CreateForm,
    engine: &DashboardEngine,
    line: &str,
) -> bool {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return true;
    };
    let args: Vec<&str> = words.collect();
    let arg = |index: usize| args.get(index).copied().unwrap_or_default().to_string();

    match command {
        "add" => {
            *form = CreateForm {
                name: arg(0),
                url: arg(1),
                method: arg(2),
                interval: arg(3),
                timeout: arg(4),
            };
            submit(dispatcher, form).await;
        }
        "set" => {
            let value = args.get(1..).map(|rest| rest.join(" ")).unwrap_or_default();
            match args.first().copied() {
                Some("name") => form.name = value,
                Some("url") => form.url = value,
                Some("method") => form.method = value,
                Some("interval") => form.interval = value,
                Some("timeout") => form.timeout = value,
                _ => println!("! unknown field; use name, url, method, interval or timeout"),
            }
        }
        "form" => println!("{:#?}", form),
        "submit" => submit(dispatcher, form).await,
        "check" => match args.first() {
            Some(id) => dispatcher.check_now(id),
            None => println!("! usage: check <id>"),
        },
        "rm" => match args.first() {
            Some(id) => match dispatcher.remove(id, confirm).await {
                Ok(RemoveOutcome::Removed) => println!("Removed {}", id),
                Ok(RemoveOutcome::Cancelled) => {}
                Err(e) => println!("! Error removing endpoint: {}", e),
            },
            None => println!("! usage: rm <id>"),
        },
        "refresh" => {
            if let Err(e) = dispatcher.refresh().await {
                println!("! Error loading endpoints: {}", e);
            }
        }
        "list" => print!("{}", *engine.frames().borrow()),
        "quit" | "exit" => return false,
        _ => println!("{}", HELP),
    }
    true
}

async fn submit(dispatcher: &CommandDispatcher, form: &mut CreateForm) {
    if let Err(e) = dispatcher.create(form).await {
        println!("! Error adding endpoint: {}", e);
    }
}

async fn print_frames(
    mut frames: watch::Receiver<DisplayTree>,
    mut connection: watch::Receiver<ConnectionState>,
    stats: ConnectionStats,
) {
    loop {
        tokio::select! {
            changed = frames.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = frames.borrow_and_update().clone();
                println!("----------------------------------------");
                print!("{}", frame);
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connection.borrow_and_update();
                info!(
                    "Push channel {:?} (attempt {}, {} malformed messages dropped)",
                    state,
                    stats.attempts(),
                    stats.dropped_frames()
                );
            }
        }
    }
}
