//! Shipper - responsibility and behavior
//!
//! The shipper owns the remote log-service client and the session's
//! destination pair (group + stream). It provides idempotent,
//! existence-cached provisioning (`ensure_group`, `ensure_stream`) and the
//! append/read operations (`put_events`, `get_events`).
//!
//! Important design notes:
//! - Existence is queried at most once per destination per session; a
//!   successful create marks the cache directly so no redundant round-trip
//!   follows.
//! - The check-then-create sequence is not atomic against the remote
//!   service: a create can race an out-of-band creation, which surfaces as
//!   `GroupAlreadyExists` / `StreamAlreadyExists` rather than being
//!   swallowed.
//! - Nothing here retries. Every remote failure is fatal to the operation
//!   that raised it; retry policy, if any, belongs to the caller.

// Local crates
use crate::cloudwatch::client::{CreateResult, LogsApi, PutEventsAck, RemoteError};
use crate::cloudwatch::models::{Event, Existence, Group, Stream};
use crate::helpers::names::is_valid_group_name;

// External crates
use std::sync::Arc;
use tracing::instrument;

/// Shipper error handling - clearly defined domain errors, allowing easier
/// upstream propagation and pattern-matching in the pipeline driver.
#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    #[error(
        "log group name '{0}' is incorrect; log group names consist of: a-z, A-Z, 0-9, '_', '-', '/', '.', and '#'"
    )]
    InvalidGroupName(String),
    #[error("log group '{0}' already exists")]
    GroupAlreadyExists(String),
    #[error("log stream '{0}' already exists")]
    StreamAlreadyExists(String),
    #[error("log group '{0}' not found")]
    GroupNotFound(String),
    #[error("log stream '{0}' not found")]
    StreamNotFound(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Ships events to one (group, stream) destination through an injected
/// [`LogsApi`] client.
pub struct LogShipper<C: LogsApi> {
    client: C,
    group: Arc<Group>,
    stream: Stream,
}

impl<C: LogsApi> LogShipper<C> {
    pub fn new(client: C, group_name: impl Into<String>, stream_name: impl Into<String>) -> Self {
        let group = Arc::new(Group::new(group_name));
        let stream = Stream::new(Arc::clone(&group), stream_name);
        Self {
            client,
            group,
            stream,
        }
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Whether the log group exists, from cache when known.
    ///
    /// The remote check is a prefix match: any group whose name starts with
    /// ours satisfies it, so a sibling sharing the prefix can produce a
    /// false positive.
    pub async fn group_exists(&self) -> Result<bool, ShipperError> {
        match self.group.existence() {
            Existence::Present => return Ok(true),
            Existence::Absent => return Ok(false),
            Existence::Unknown => {}
        }

        let count = self.client.count_groups_with_prefix(self.group.name()).await?;
        let present = count > 0;
        self.group.set_existence(if present {
            Existence::Present
        } else {
            Existence::Absent
        });
        Ok(present)
    }

    /// Whether the log stream exists under its group, from cache when known.
    /// The group must exist before a stream lookup makes sense.
    pub async fn stream_exists(&self) -> Result<bool, ShipperError> {
        match self.stream.existence() {
            Existence::Present => return Ok(true),
            Existence::Absent => return Ok(false),
            Existence::Unknown => {}
        }

        if !self.group_exists().await? {
            return Err(ShipperError::GroupNotFound(self.group.name().to_string()));
        }

        let count = self
            .client
            .count_streams_with_prefix(self.group.name(), self.stream.name())
            .await?;
        let present = count > 0;
        self.stream.set_existence(if present {
            Existence::Present
        } else {
            Existence::Absent
        });
        Ok(present)
    }

    /// Create the log group unless it already exists.
    ///
    /// Returns `true` if a creation happened, `false` if the group was
    /// already there. A remote-reported duplicate is surfaced as
    /// `GroupAlreadyExists`: the existence check and the create are two
    /// separate calls and can race an out-of-band creation.
    #[instrument(name = "shipper::ensure_group", skip_all, level = "debug")]
    pub async fn ensure_group(&self) -> Result<bool, ShipperError> {
        let name = self.group.name();
        if !is_valid_group_name(name) {
            return Err(ShipperError::InvalidGroupName(name.to_string()));
        }

        if self.group_exists().await? {
            tracing::debug!(group = %name, "Log group already present, nothing to create");
            return Ok(false);
        }

        match self.client.create_group(name).await? {
            CreateResult::AlreadyExists => {
                Err(ShipperError::GroupAlreadyExists(name.to_string()))
            }
            CreateResult::Created => {
                self.group.set_existence(Existence::Present);
                tracing::debug!(group = %name, "Log group created");
                Ok(true)
            }
        }
    }

    /// Create the log stream unless it already exists. The group must exist
    /// first. Returns `true` if a creation happened.
    #[instrument(name = "shipper::ensure_stream", skip_all, level = "debug")]
    pub async fn ensure_stream(&self) -> Result<bool, ShipperError> {
        if !self.group_exists().await? {
            return Err(ShipperError::GroupNotFound(self.group.name().to_string()));
        }
        if self.stream_exists().await? {
            tracing::debug!(stream = %self.stream.name(), "Log stream already present, nothing to create");
            return Ok(false);
        }

        match self
            .client
            .create_stream(self.group.name(), self.stream.name())
            .await?
        {
            CreateResult::AlreadyExists => Err(ShipperError::StreamAlreadyExists(
                self.stream.name().to_string(),
            )),
            CreateResult::Created => {
                self.stream.set_existence(Existence::Present);
                tracing::debug!(stream = %self.stream.name(), "Log stream created");
                Ok(true)
            }
        }
    }

    /// Append `events` to the stream in the given order. Both destinations
    /// must exist. The input order is preserved exactly; events are never
    /// reordered by timestamp.
    #[instrument(name = "shipper::put_events", skip_all, level = "debug", fields(count = events.len()))]
    pub async fn put_events(&self, events: &[Event]) -> Result<PutEventsAck, ShipperError> {
        if !self.group_exists().await? {
            return Err(ShipperError::GroupNotFound(self.group.name().to_string()));
        }
        if !self.stream_exists().await? {
            return Err(ShipperError::StreamNotFound(self.stream.name().to_string()));
        }

        Ok(self
            .client
            .put_events(self.group.name(), self.stream.name(), events)
            .await?)
    }

    /// Events currently held by the stream, in remote-reported order.
    #[instrument(name = "shipper::get_events", skip_all, level = "debug")]
    pub async fn get_events(&self) -> Result<Vec<Event>, ShipperError> {
        if !self.group_exists().await? {
            return Err(ShipperError::GroupNotFound(self.group.name().to_string()));
        }
        if !self.stream_exists().await? {
            return Err(ShipperError::StreamNotFound(self.stream.name().to_string()));
        }

        Ok(self
            .client
            .get_events(self.group.name(), self.stream.name())
            .await?)
    }
}
