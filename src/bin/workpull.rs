//! workpull CLI: pull a unit of work, run a program on it, acknowledge.

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use workpull::config::{Config, Settings, parse_pair};
use workpull::engine::{ControlConfig, Controller, ExecConfig, ProcessExecutor};
use workpull::source::Driver;
use workpull::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "workpull", about = "Pull one unit of work and hand it to a program")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch work, run the program, then acknowledge or report failure.
    ///
    /// Every option can also be set with a WORKPULL_<NAME> environment
    /// variable, which takes precedence when set.
    Run {
        /// Backend to pull from (see `workpull drivers`)
        #[arg(long)]
        driver: Option<String>,
        /// Keep pulling instead of exiting after one iteration
        #[arg(long)]
        daemon: bool,
        /// Daemon mode: pause after an empty poll, in milliseconds
        #[arg(long)]
        idle_interval_ms: Option<u64>,
        /// Driver setting, repeatable (e.g. -o queue=jobs)
        #[arg(short = 'o', long = "opt", value_parser = parse_pair)]
        opts: Vec<(String, String)>,
        /// Environment variable that carries the payload
        #[arg(long)]
        payload_env: Option<String>,
        /// Do not expose the payload as an environment variable
        #[arg(long, conflicts_with = "payload_env")]
        no_payload_env: bool,
        /// Append the payload as the program's last argument
        #[arg(long)]
        payload_arg: bool,
        /// Extra environment variable for the program, repeatable
        #[arg(long = "env", value_parser = parse_pair)]
        env: Vec<(String, String)>,
        /// Start the program with only the configured variables
        #[arg(long)]
        no_inherit_env: bool,
        /// Program to run, followed by its arguments
        #[arg(last = true, required = true)]
        program: Vec<String>,
    },
    /// List available drivers and the settings they read
    Drivers,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Drivers => {
            cmd_drivers();
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            driver,
            daemon,
            idle_interval_ms,
            opts,
            payload_env,
            no_payload_env,
            payload_arg,
            env,
            no_inherit_env,
            program,
        } => {
            // Dedicated flags land in the same layer as -o pairs so the
            // environment can override any of them.
            let mut flags = opts;
            flags.extend(driver.map(|d| ("driver".to_string(), d)));
            flags.extend(idle_interval_ms.map(|ms| ("idle-interval-ms".to_string(), ms.to_string())));
            flags.extend(payload_env.map(|name| ("payload-env".to_string(), name)));
            if daemon {
                flags.push(("daemon".to_string(), "true".to_string()));
            }
            if no_payload_env {
                flags.push(("payload-env".to_string(), "-".to_string()));
            }
            if payload_arg {
                flags.push(("payload-arg".to_string(), "true".to_string()));
            }
            if no_inherit_env {
                flags.push(("inherit-env".to_string(), "false".to_string()));
            }

            let settings = Settings::from_process_env(flags);
            cmd_run(settings, program, env).await
        }
    }
}

async fn cmd_run(
    settings: Settings,
    program: Vec<String>,
    env: Vec<(String, String)>,
) -> anyhow::Result<ExitCode> {
    let config = Config::from_env()?;
    let guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "workpull".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    // Configuration errors surface before any connection is attempted.
    let driver: Driver = settings.required("driver")?.parse()?;
    let source = driver.build(&settings)?;
    let control = ControlConfig::from_settings(&settings)?;

    let mut program = program.into_iter();
    let Some(command) = program.next() else {
        anyhow::bail!("no program given");
    };
    let mut exec = ExecConfig::new(command)
        .args(program.collect())
        .apply_settings(&settings)?;
    exec.env = env;

    let controller = Controller::new(source, Box::new(ProcessExecutor::new(exec)), control);

    let shutdown = controller.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("interrupt received, stopping after the current item");
        shutdown.notify_one();
    });

    let status = controller.run().await;
    guard.force_flush();
    Ok(ExitCode::from(status?.exit_code()))
}

fn cmd_drivers() {
    for driver in Driver::ALL {
        println!("{:<10}  {}", driver.name(), driver.description());
        for setting in driver.settings() {
            println!(
                "    {:<20} {:<9} {}  [{}]",
                setting.key,
                if setting.required { "required" } else { "" },
                setting.help,
                Settings::env_var_name(setting.key),
            );
        }
        println!();
    }
}
