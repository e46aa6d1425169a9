// Local crates
use crate::cloudwatch::client::{CloudWatchLogs, LogsApi};
use crate::cloudwatch::creds;
use crate::cloudwatch::models::Event;
use crate::container::container::ContainerRunner;
use crate::helpers::load_config::Config;
use crate::helpers::shutdown::Shutdown;
use crate::parser::parser::{LineFormatError, LineParser};
use crate::shipper::shipper::{LogShipper, ShipperError};
use crate::tailer::tailer::{RawLine, TailError, tail_lines};

// External crates
use anyhow::Result;
use futures::{Stream, StreamExt};
use tokio::sync::broadcast;

/// Why the pipeline left the `Running` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    /// Interrupt signal or end of the container's log stream.
    Normal,
    /// A parse or shipping failure halted consumption.
    Error,
}

/// Lifecycle of one forwarding session:
/// `NotStarted -> Running -> Stopped(Normal | Error)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    Running,
    Stopped(StopKind),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] LineFormatError),
    #[error(transparent)]
    Ship(#[from] ShipperError),
    #[error(transparent)]
    Tail(#[from] TailError),
}

/// Run the full forwarding session: provision the destination, create and
/// start the container, then pump its log lines to CloudWatch until the
/// stream ends, the user interrupts, or an error stops the pipeline.
pub async fn run_forwarder(config: Config) -> Result<()> {
    config.validate()?;

    let credentials = creds::resolve(
        config.aws.access_key_id.as_deref(),
        config.aws.secret_access_key.as_deref(),
        config.aws.session_token.as_deref(),
    )?;
    let client = CloudWatchLogs::new(&config.region(), config.endpoint().as_deref(), credentials)?;
    tracing::info!(region = %config.region(), "Connection to CloudWatch Logs configured");

    let shipper = LogShipper::new(
        client,
        config.destination.group.clone(),
        config.destination.stream.clone(),
    );

    let created = shipper.ensure_group().await?;
    tracing::info!(
        group = %config.destination.group,
        "CloudWatch log group {}",
        if created { "created" } else { "found" }
    );

    let created = shipper.ensure_stream().await?;
    tracing::info!(
        stream = %config.destination.stream,
        "CloudWatch log stream {}",
        if created { "created" } else { "found" }
    );

    let runner = ContainerRunner::new(config.container.clone())?;
    let container_id = runner.create().await?;
    tracing::info!(container_id = %container_id, "Container created");

    runner.start(&container_id).await?;
    tracing::info!(container_id = %container_id, "Container started");

    let shutdown = Shutdown::new();
    shutdown.spawn_signal_listener();

    let lines = tail_lines(runner.docker().clone(), container_id);
    let parser = LineParser::new();

    match pump(&shipper, &parser, lines, shutdown.subscribe()).await {
        Ok(StopKind::Normal) => {
            tracing::info!("Pipeline stopped");
            Ok(())
        }
        // Unreachable today: pump maps every failure to Err. Kept so the
        // state machine is total over StopKind.
        Ok(StopKind::Error) => Ok(()),
        Err(e) => {
            tracing::error!(error = %e, "Pipeline stopped on error");
            Err(e.into())
        }
    }
}

/// The ingestion loop. Strictly sequential: each line is parsed, shipped as
/// a single-event batch, and traced before the next line is read, so events
/// reach the stream in exactly arrival order and the shipping latency
/// backpressures line consumption. Fails fast on the first parse or ship
/// error; a shutdown signal or end of the line stream is a clean stop.
pub(crate) async fn pump<C, S>(
    shipper: &LogShipper<C>,
    parser: &LineParser,
    lines: S,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<StopKind, PipelineError>
where
    C: LogsApi,
    S: Stream<Item = Result<RawLine, TailError>>,
{
    let mut state = PipelineState::NotStarted;
    tokio::pin!(lines);

    loop {
        match state {
            PipelineState::NotStarted => state = PipelineState::Running,
            PipelineState::Running => {}
            PipelineState::Stopped(kind) => return Ok(kind),
        }

        tokio::select! {
            _ = shutdown_rx.recv() => {
                state = PipelineState::Stopped(StopKind::Normal);
            }
            next = lines.next() => match next {
                None => {
                    // Container exited; the log stream is drained.
                    state = PipelineState::Stopped(StopKind::Normal);
                }
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(raw)) => {
                    let parsed = parser.parse(&raw.text, raw.received_at_ms)?;
                    let event = Event::new(parsed.timestamp_ms, parsed.message);
                    shipper.put_events(std::slice::from_ref(&event)).await?;
                    tracing::info!("{event}");
                }
            }
        }
    }
}

/// Read the events held by the configured stream and print them.
pub async fn run_fetch(config: Config) -> Result<()> {
    config.validate_destination()?;

    let credentials = creds::resolve(
        config.aws.access_key_id.as_deref(),
        config.aws.secret_access_key.as_deref(),
        config.aws.session_token.as_deref(),
    )?;
    let client = CloudWatchLogs::new(&config.region(), config.endpoint().as_deref(), credentials)?;

    let shipper = LogShipper::new(
        client,
        config.destination.group.clone(),
        config.destination.stream.clone(),
    );

    for event in shipper.get_events().await? {
        println!("{event}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shipper::shipper::tests::RecordingApi;
    use futures::stream;

    fn line(ms: i64, text: &str) -> Result<RawLine, TailError> {
        Ok(RawLine {
            received_at_ms: ms,
            text: text.to_string(),
        })
    }

    fn provisioned_api() -> RecordingApi {
        RecordingApi {
            group_count: 1,
            stream_count: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn ships_lines_in_arrival_order_one_at_a_time() {
        let api = provisioned_api();
        let shipper = LogShipper::new(&api, "/containers/demo", "stdout");
        let parser = LineParser::new();
        let shutdown = Shutdown::new();

        let lines = stream::iter(vec![
            line(0, "2024-01-15T10:30:00.001Z first"),
            line(0, "2024-01-15T10:30:00.000Z second"),
            line(500, "third has no timestamp"),
        ]);

        let stop = pump(&shipper, &parser, lines, shutdown.subscribe())
            .await
            .unwrap();
        assert_eq!(stop, StopKind::Normal);

        let stored = api.stored_events.lock().unwrap().clone();
        // Arrival order, not timestamp order.
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].message, "first");
        assert_eq!(stored[1].message, "second");
        assert_eq!(stored[2].message, "third has no timestamp");
        assert_eq!(stored[2].timestamp, 500);

        // Each event went out as its own single-element batch.
        let puts: Vec<_> = api
            .call_log()
            .into_iter()
            .filter(|c| c.starts_with("put-events"))
            .collect();
        assert_eq!(puts, vec!["put-events:1"; 3]);
    }

    #[tokio::test]
    async fn unparseable_line_stops_the_pipeline() {
        let api = provisioned_api();
        let shipper = LogShipper::new(&api, "/containers/demo", "stdout");
        let parser = LineParser::new();
        let shutdown = Shutdown::new();

        let lines = stream::iter(vec![
            line(0, "2024-01-15T10:30:00Z fine"),
            line(0, ""),
            line(0, "2024-01-15T10:30:01Z never shipped"),
        ]);

        let err = pump(&shipper, &parser, lines, shutdown.subscribe())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));

        // Only the line before the failure was delivered; nothing after.
        let stored = api.stored_events.lock().unwrap().clone();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].message, "fine");
    }

    #[tokio::test]
    async fn tail_error_stops_the_pipeline() {
        let api = provisioned_api();
        let shipper = LogShipper::new(&api, "/containers/demo", "stdout");
        let parser = LineParser::new();
        let shutdown = Shutdown::new();

        let lines = stream::iter(vec![
            line(0, "2024-01-15T10:30:00Z fine"),
            Err(TailError::Stream("connection reset".to_string())),
        ]);

        let err = pump(&shipper, &parser, lines, shutdown.subscribe())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Tail(_)));
    }

    #[tokio::test]
    async fn shutdown_signal_is_a_clean_stop() {
        let api = provisioned_api();
        let shipper = LogShipper::new(&api, "/containers/demo", "stdout");
        let parser = LineParser::new();
        let shutdown = Shutdown::new();

        // A stream that never yields: the pipeline must still stop.
        let lines = stream::pending::<Result<RawLine, TailError>>();
        let rx = shutdown.subscribe();
        shutdown.trigger();

        let stop = pump(&shipper, &parser, lines, rx).await.unwrap();
        assert_eq!(stop, StopKind::Normal);
        assert!(api.stored_events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_stream_is_a_clean_stop() {
        let api = provisioned_api();
        let shipper = LogShipper::new(&api, "/containers/demo", "stdout");
        let parser = LineParser::new();
        let shutdown = Shutdown::new();

        let lines = stream::iter(Vec::<Result<RawLine, TailError>>::new());
        let stop = pump(&shipper, &parser, lines, shutdown.subscribe())
            .await
            .unwrap();
        assert_eq!(stop, StopKind::Normal);
    }
}
