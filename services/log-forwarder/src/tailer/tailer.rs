// External crates
use bollard::Docker;
use bollard::container::LogsOptions;
use chrono::Utc;
use futures::StreamExt;

#[derive(Debug, thiserror::Error)]
pub enum TailError {
    #[error("container log stream error: {0}")]
    Stream(String),
}

/// One decoded log line as it arrived from the container, tagged with its
/// wall-clock arrival time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub received_at_ms: i64,
    pub text: String,
}

/// Follow a container's log output as a pull-based stream of [`RawLine`]s.
///
/// The stream blocks until the next line is available, ends when the
/// container exits, and yields a terminal `Err` item if the underlying
/// transport fails. Docker prepends an RFC 3339 timestamp to each line
/// (`timestamps: true`), which the parser later extracts.
pub fn tail_lines(
    docker: Docker,
    container_id: String,
) -> impl futures::Stream<Item = Result<RawLine, TailError>> {
    async_stream::stream! {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            timestamps: true,
            ..Default::default()
        };

        let mut logs = docker.logs(&container_id, Some(options));

        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(output) => {
                    let text = output
                        .to_string()
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    yield Ok(RawLine {
                        received_at_ms: Utc::now().timestamp_millis(),
                        text,
                    });
                }
                Err(e) => {
                    yield Err(TailError::Stream(e.to_string()));
                    return;
                }
            }
        }
    }
}
