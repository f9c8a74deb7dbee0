use crate::cli::args::{Args, Command, ConfigArgs, ConfigCommand};
use crate::cli::output::{ConsoleWriter, ExchangeReport, OutputWriter};
use crate::core::session::{ConnectOutcome, ConnectionState, SerialSession};
use crate::core::transport::Transport;
use crate::domain::config::{BridgeConfig, SessionSettings};
use crate::domain::error::{BridgeError, BridgeResult};
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::serial::SerialPortTransport;
use crate::infrastructure::simulated::SimulatedTransport;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Capture replayed by `--simulate`
const SIMULATED_CAPTURE: &str = "9000,4500,560,560,560,1690";
const SIMULATED_CAPTURE_DELAY: Duration = Duration::from_millis(300);

/// Execute CLI command
pub async fn execute_command(args: Args) -> BridgeResult<()> {
    let writer = ConsoleWriter::new(args.output);

    let config_manager = ConfigManager::new();
    let config = match &args.config {
        Some(path) => config_manager.load_config_from_path(path)?,
        None => config_manager.load_config()?,
    };

    if !args.quiet {
        setup_logging(&config, args.verbose)?;
    }

    let all_ports = matches!(args.command, Command::List { all: true });
    let transport = build_transport(args.simulate, all_ports);
    debug!("Using {} transport", transport.name());

    match args.command {
        Command::List { .. } => {
            let probe = Arc::clone(&transport);
            let devices = tokio::task::spawn_blocking(move || probe.enumerate())
                .await
                .map_err(|e| BridgeError::IoFault(format!("worker task failed: {}", e)))??;
            writer.write_devices(&devices)?;
            Ok(())
        }
        Command::Receive { timeout_ms } => {
            let session = open_session(transport, &config, &writer).await?;
            let timeout = receive_timeout(&session, timeout_ms);
            let result = session.request_receive(timeout).await;
            report(&writer, "receive", &session)?;
            session.close().await;
            result.map(|_| ())
        }
        Command::Send { payload } => {
            let session = open_session(transport, &config, &writer).await?;
            let result = session.send_raw(&payload).await;
            report(&writer, "send", &session)?;
            session.close().await;
            result
        }
        Command::Relay { timeout_ms } => {
            let session = open_session(transport, &config, &writer).await?;
            let timeout = receive_timeout(&session, timeout_ms);
            let result = relay(&session, timeout).await;
            report(&writer, "relay", &session)?;
            session.close().await;
            result
        }
        Command::Config(config_args) => {
            execute_config_command(config_args, &writer, &config, &config_manager, args.config)
        }
        Command::Version => {
            writer.write_message(&format!("irbridge {}", env!("CARGO_PKG_VERSION")))?;
            Ok(())
        }
    }
}

fn build_transport(simulate: bool, all_ports: bool) -> Arc<dyn Transport> {
    if simulate {
        Arc::new(SimulatedTransport::ir_device(SIMULATED_CAPTURE, SIMULATED_CAPTURE_DELAY))
    } else if all_ports {
        Arc::new(SerialPortTransport::new().include_all_ports())
    } else {
        Arc::new(SerialPortTransport::new())
    }
}

/// Connect to the first device, waiting out a permission request if one is issued.
async fn open_session(
    transport: Arc<dyn Transport>,
    config: &BridgeConfig,
    writer: &ConsoleWriter,
) -> BridgeResult<SerialSession> {
    let session = SerialSession::new(transport, SessionSettings::from(&config.global));

    match session.connect().await? {
        ConnectOutcome::PermissionRequested => {
            writer.write_message("Waiting for access to the device...")?;
            let state = session
                .wait_until_settled(config.global.permission_timeout())
                .await?;
            if state != ConnectionState::Connected {
                writer.write_error(&session.status().to_string())?;
                return Err(BridgeError::NotConnected);
            }
        }
        outcome => debug!("Connect finished: {}", outcome),
    }

    info!("Session {} ready", session.id());
    Ok(session)
}

fn receive_timeout(session: &SerialSession, timeout_ms: Option<u64>) -> Duration {
    timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(session.settings().receive_timeout)
}

async fn relay(session: &SerialSession, timeout: Duration) -> BridgeResult<()> {
    let payload = session.request_receive(timeout).await?;
    session.send_raw(&payload).await
}

fn report(writer: &ConsoleWriter, command: &str, session: &SerialSession) -> BridgeResult<()> {
    let report = ExchangeReport::new(command, session.state(), session.status());
    writer.write_report(&report)?;
    Ok(())
}

fn execute_config_command(
    args: ConfigArgs,
    writer: &ConsoleWriter,
    config: &BridgeConfig,
    config_manager: &ConfigManager,
    explicit_path: Option<PathBuf>,
) -> BridgeResult<()> {
    let source = explicit_path.or_else(|| config_manager.active_config_path().map(PathBuf::from));

    match args.command {
        ConfigCommand::Show => {
            writer.write_config(config, source.as_deref())?;
        }
        ConfigCommand::Init { dir } => {
            let path = config_manager.init_project_config(&dir)?;
            writer.write_message(&format!("Configuration written to {}", path.display()))?;
        }
        ConfigCommand::Path => {
            let message = match source {
                Some(path) => path.display().to_string(),
                None => "No configuration file found, using defaults".to_string(),
            };
            writer.write_message(&message)?;
        }
    }
    Ok(())
}

/// Setup logging based on configuration
fn setup_logging(config: &BridgeConfig, verbose: bool) -> BridgeResult<()> {
    init_logging(&config.global.log_level, verbose).map_err(|e| BridgeError::Config {
        message: format!("Failed to initialize logging: {}", e),
    })
}
