//! # motionctl
//!
//! Command line client for a remote motion-control supervisor. Connects the
//! command channel (and the event channel for `monitor`), sends one request
//! and prints the replies as JSON.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use motionctl_client::transport::ws::{connect_command, connect_events};
use motionctl_client::{
    ConnectionSupervisor, NotificationHub, Observation, SubscribeOptions, SupervisorConfig,
};
use motionctl_core::{
    CorrelationId, DeviceSelector, JsonCodec, ParameterValue, Request, Status, logging,
};
use motionctl_settings::{MotionctlSettings, load_settings, load_settings_from_path};
use tokio::time;

/// Motion-control supervisor client.
#[derive(Parser, Debug)]
#[command(name = "motionctl", about = "Motion-control supervisor client")]
struct Cli {
    /// Settings file (defaults to `~/.motionctl/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Command channel URL (overrides settings).
    #[arg(long)]
    command_url: Option<String>,

    /// Event channel URL (overrides settings).
    #[arg(long)]
    event_url: Option<String>,

    /// Log filter (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Give up waiting for a reply after this many milliseconds.
    #[arg(long, default_value = "10000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List attached devices.
    Devices,
    /// Send a raw request body, e.g. `{"type":"listDevices"}`.
    Request {
        /// Request body as JSON.
        json: String,
    },
    /// Read parameters.
    Get {
        /// `@<position>` or a device address.
        device: DeviceSelector,
        /// Parameter names.
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Write parameters.
    Set {
        /// `@<position>` or a device address.
        device: DeviceSelector,
        /// `name=value` pairs.
        #[arg(required = true, value_parser = parse_assignment)]
        values: Vec<ParameterValue>,
    },
    /// Run a device command and print every phase.
    Exec {
        /// `@<position>` or a device address.
        device: DeviceSelector,
        /// Command name.
        command: String,
    },
    /// Publish parameter snapshots and print them as they arrive.
    Monitor(MonitorArgs),
}

#[derive(Args, Debug)]
struct MonitorArgs {
    /// `@<position>` or a device address.
    device: DeviceSelector,
    /// Parameter names.
    #[arg(required = true)]
    names: Vec<String>,
    /// Snapshots per printed batch (overrides settings).
    #[arg(long)]
    buffer: Option<usize>,
    /// Skip snapshots identical to the previous one.
    #[arg(long)]
    distinct: bool,
    /// Topic to publish under (random when omitted).
    #[arg(long)]
    topic: Option<String>,
    /// Stop after this many batches.
    #[arg(long)]
    count: Option<usize>,
}

/// Parse `name=value`.
///
/// Every typed field the text can represent is filled; the supervisor reads
/// the one matching the parameter's type.
fn parse_assignment(s: &str) -> Result<ParameterValue, String> {
    let (name, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{s}`"))?;
    if name.is_empty() {
        return Err(format!("missing parameter name in `{s}`"));
    }
    let mut value = ParameterValue::string(name, raw);
    if let Ok(int) = raw.parse::<i64>() {
        value.int_value = int;
        value.uint_value = u64::try_from(int).unwrap_or_default();
        #[allow(clippy::cast_precision_loss)]
        let as_float = int as f64;
        value.float_value = as_float;
    } else if let Ok(uint) = raw.parse::<u64>() {
        value.uint_value = uint;
    } else if let Ok(float) = raw.parse::<f64>() {
        value.float_value = float;
    }
    Ok(value)
}

fn resolve_settings(cli: &Cli) -> Result<MotionctlSettings> {
    let mut settings = match &cli.settings {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => load_settings().context("Failed to load settings")?,
    };
    if let Some(url) = &cli.command_url {
        settings.connection.command_url.clone_from(url);
    }
    if let Some(url) = &cli.event_url {
        settings.connection.event_url.clone_from(url);
    }
    if let Some(level) = &cli.log_level {
        settings.logging.level.clone_from(level);
    }
    Ok(settings)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print replies until a terminal one. `false` when the supervisor refused.
async fn follow(observation: &mut Observation, timeout: Duration) -> Result<bool> {
    loop {
        let Some(status) = time::timeout(timeout, observation.recv())
            .await
            .context("Timed out waiting for a reply")?
        else {
            bail!("Reply stream ended");
        };
        if let Status::Error { code, message } = &status {
            eprintln!("error {code}: {message}");
            return Ok(false);
        }
        print_json(&status)?;
        if status.is_terminal() {
            return Ok(true);
        }
    }
}

async fn monitor(
    supervisor: &ConnectionSupervisor,
    settings: &MotionctlSettings,
    args: MonitorArgs,
    timeout: Duration,
) -> Result<ExitCode> {
    let options = SubscribeOptions {
        buffer_size: args.buffer.unwrap_or(settings.notifications.buffer_size),
        distinct: args.distinct || settings.notifications.distinct,
    };
    let topic = args
        .topic
        .unwrap_or_else(|| format!("monitor-{}", CorrelationId::new()));
    let hub = Arc::new(NotificationHub::new(Arc::new(JsonCodec)));
    let mut batches = hub.subscribe(topic.clone(), options)?;
    let reader = connect_events(&settings.connection.event_url, Arc::clone(&hub))
        .await
        .with_context(|| format!("Failed to connect to {}", settings.connection.event_url))?;

    let (_, mut reply) = supervisor.correlator().request(Request::Monitor {
        device: args.device,
        names: args.names,
        topic: topic.clone(),
    });
    let accepted = follow(&mut reply, timeout).await?;
    reply.cancel();
    if !accepted {
        return Ok(ExitCode::FAILURE);
    }
    tracing::info!(%topic, "monitoring");

    let mut printed = 0usize;
    loop {
        tokio::select! {
            next = batches.next() => match next {
                Some(Ok(batch)) => {
                    print_json(&batch)?;
                    printed += 1;
                    if args.count.is_some_and(|limit| printed >= limit) {
                        break;
                    }
                }
                Some(Err(err)) => return Err(err).context("Monitoring failed"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    reader.abort();
    Ok(ExitCode::SUCCESS)
}

async fn run(cli: Cli, settings: MotionctlSettings) -> Result<ExitCode> {
    let (transport, events) = connect_command(&settings.connection.command_url)
        .await
        .with_context(|| format!("Failed to connect to {}", settings.connection.command_url))?;
    let supervisor = Arc::new(ConnectionSupervisor::new(
        SupervisorConfig::from(&settings.connection),
        Arc::new(JsonCodec),
        transport,
    ));
    let driver = supervisor.attach(events);
    let timeout = Duration::from_millis(cli.timeout_ms);

    let request = match cli.command {
        Command::Devices => Request::ListDevices,
        Command::Request { json } => {
            serde_json::from_str(&json).context("Request body is not a valid request")?
        }
        Command::Get { device, names } => Request::GetParameters { device, names },
        Command::Set { device, values } => Request::SetParameters { device, values },
        Command::Exec { device, command } => Request::Execute { device, command },
        Command::Monitor(args) => {
            let code = monitor(&supervisor, &settings, args, timeout).await?;
            supervisor.close();
            driver.abort();
            return Ok(code);
        }
    };

    let (id, mut observation) = supervisor.correlator().request(request);
    tracing::debug!(%id, "request sent");
    let accepted = follow(&mut observation, timeout).await?;
    supervisor.close();
    driver.abort();
    Ok(if accepted {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    if settings.logging.json {
        logging::init_json_subscriber(&settings.logging.level);
    } else {
        logging::init_subscriber(&settings.logging.level);
    }

    run(cli, settings).await
}
