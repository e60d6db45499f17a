//! Line-delimited JSON host loop
//!
//! Input, one command per line:
//!   { "update": { "consents": {...} } }          application update
//!   { "confirm": { "payload": [ {...} ] } }      edge consent preference response
//!   { "defaults": { "consents": {...} } }        configuration defaults changed
//!   { "get": null }                              query current consents
//!   { "sync": null }                             barrier, no output
//!   { "shutdown": null }                         stop reading
//!
//! Output, one event per line:
//!   { "event": "consent.response", "data": { "consents": {...} } }
//!   { "event": "edge.update_consent", "data": { "consents": {...} } }
//!   { "event": "consent.get", "data": { "consents": {...} } }
//!   { "event": "error", "data": { "message": "..." } }
//!
//! After every command the loop waits for the service to catch up, so the
//! events a command caused are written before the next command is read.

use consentd_engine::{ConsentEvent, ConsentHandle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostCommand {
    Update(Value),
    Confirm(Value),
    Defaults(Value),
    Get,
    Sync,
    Shutdown,
}

/// One output line.
#[derive(Debug, Clone, Serialize)]
pub struct HostOutput {
    pub event: String,
    pub data: Value,
}

impl HostOutput {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("error", serde_json::json!({ "message": message.into() }))
    }
}

impl From<&ConsentEvent> for HostOutput {
    fn from(event: &ConsentEvent) -> Self {
        Self::new(event.name(), event.to_event_data())
    }
}

/// Drive `handle` from `input` until EOF or a shutdown command.
///
/// `events` must be subscribed before the service is spawned so the boot-time
/// consent response is not missed.
pub async fn run<R, W>(
    handle: &ConsentHandle,
    mut events: broadcast::Receiver<ConsentEvent>,
    input: R,
    mut output: W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    handle.sync().await?;
    flush_events(&mut events, &mut output).await?;

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match serde_json::from_str::<HostCommand>(line) {
            Ok(c) => c,
            Err(e) => {
                warn!("rejecting host command: {}", e);
                write_line(&mut output, &HostOutput::error(e.to_string())).await?;
                continue;
            }
        };
        debug!(?command, "host command");

        match command {
            HostCommand::Update(data) => handle.update(&data).await?,
            HostCommand::Confirm(data) => handle.confirm(&data).await?,
            HostCommand::Defaults(data) => handle.set_defaults(&data).await?,
            HostCommand::Get => {
                let consents = handle.get_consents().await?;
                flush_events(&mut events, &mut output).await?;
                write_line(&mut output, &HostOutput::new("consent.get", consents)).await?;
                continue;
            }
            HostCommand::Sync => {}
            HostCommand::Shutdown => {
                handle.sync().await?;
                flush_events(&mut events, &mut output).await?;
                handle.shutdown().await?;
                return Ok(());
            }
        }

        handle.sync().await?;
        flush_events(&mut events, &mut output).await?;
    }

    Ok(())
}

async fn flush_events<W>(
    events: &mut broadcast::Receiver<ConsentEvent>,
    output: &mut W,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        match events.try_recv() {
            Ok(event) => write_line(output, &HostOutput::from(&event)).await?,
            Err(TryRecvError::Lagged(skipped)) => {
                warn!("host output lagged, {} consent events dropped", skipped);
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(()),
        }
    }
}

async fn write_line<W>(output: &mut W, line: &HostOutput) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut json = serde_json::to_string(line)?;
    json.push('\n');
    output.write_all(json.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}
