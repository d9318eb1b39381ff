use std::sync::Arc;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use spacemouse_driver::config::{Cli, DriverConfig};
use spacemouse_driver::device::info::JoystickInfo;
use spacemouse_driver::device::reader::DeviceReader;
use spacemouse_driver::publish::SystemClock;
use spacemouse_driver::service::JoystickService;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_error_reporting()?;

    let config = DriverConfig::load(cli.config.as_deref())
        .await?
        .apply_cli(&cli);
    setup_logging(config.log_level()?);
    info!("Starting SpaceMouse driver with config: {:?}", config);

    let joystick_info = JoystickInfo::load(config.info_file()?).await?;

    // Device acquisition is the only fatal runtime condition
    let reader = DeviceReader::open(&config.device)
        .and_then(|reader| reader.grab())
        .map_err(|e| eyre!("SpaceMouse unavailable: {}", e))?;
    info!(
        "Using device {} ({})",
        reader.path().display(),
        reader.name().unwrap_or("unnamed")
    );

    let mut service = JoystickService::new(
        Box::new(reader),
        joystick_info,
        Arc::new(SystemClock),
        config.stream_buffer,
    );
    info!("Service attributes: {:?}", service.service_attributes());

    let cancel = CancellationToken::new();
    service.start(cancel.child_token());

    if config.wait_signal {
        info!("Press Ctrl-C to quit...");
        wait_for_signal().await?;
    } else {
        info!("Server started, press enter to quit...");
        wait_for_enter().await?;
    }

    cancel.cancel();
    service.shutdown().await?;
    Ok(())
}

fn setup_error_reporting() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

async fn wait_for_signal() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = terminate.recv() => info!("Received SIGTERM"),
        _ = interrupt.recv() => info!("Received SIGINT"),
    }
    Ok(())
}

async fn wait_for_enter() -> Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        read = read_line(&mut stdin) => {
            read?;
        }
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
    }
    Ok(())
}

// Returns on the first line, or when the input closes
async fn read_line<R: AsyncBufRead + Unpin>(input: &mut R) -> std::io::Result<usize> {
    let mut line = String::new();
    input.read_line(&mut line).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enter_ends_the_wait() {
        let mut input = BufReader::new(&b"\nignored\n"[..]);
        assert_eq!(read_line(&mut input).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn closed_input_ends_the_wait() {
        let mut input = BufReader::new(&b""[..]);
        assert_eq!(read_line(&mut input).await.unwrap(), 0);
    }
}
