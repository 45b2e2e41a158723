//! Change detection for reliability checks.
//!
//! Every probe is logged. Content is checksummed and, when the checksum moved,
//! stored as a new snapshot together with a unified diff against the previous
//! changed snapshot.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use sha2::{Digest, Sha256};
use similar::TextDiff;
use tracing::{info, warn};

use crate::checks::{Payload, Probe};
use crate::store::{
    CheckRecord, EndpointStore, LatestStateUpdate, SnapshotRef, StoreError, StoreSession,
};

/// What processing a probe did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// The probe brought no content, only the check was recorded
    NoContent,
    Unchanged { checksum: String },
    Changed {
        checksum: String,
        snapshot: SnapshotRef,
        /// Whether a diff file was written next to the snapshot
        diffed: bool,
    },
}

pub struct ChangeDetector {
    store: Arc<EndpointStore>,
}

impl ChangeDetector {
    pub fn new(store: Arc<EndpointStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<EndpointStore> {
        &self.store
    }

    /// Record a probe and track content changes.
    ///
    /// The whole sequence runs under the endpoint's write lock, so overlapping
    /// checks of the same endpoint are applied one after the other.
    pub async fn process(&self, probe: Probe) -> Result<Detection, StoreError> {
        let session = self.store.session().await;

        let Some(payload) = probe.payload.as_ref() else {
            session.append_check(&CheckRecord::from_probe(&probe, None)).await?;
            return Ok(Detection::NoContent);
        };

        let checksum = checksum(&payload.bytes);
        session
            .append_check(&CheckRecord::from_probe(&probe, Some(checksum.clone())))
            .await?;

        let state = session.latest_state().await?;
        let mut update = LatestStateUpdate::default().checksum(checksum.clone());

        let detection = if state.latest_checksum.as_deref() == Some(checksum.as_str()) {
            Detection::Unchanged { checksum }
        } else {
            let changed_at = next_change_time(probe.checked_at, state.latest_changed_timestamp);
            let snapshot = session
                .snapshots()
                .persist(changed_at, &payload.file_name, &payload.bytes)
                .await?;

            let diffed = match &state.latest_changed_snapshot {
                Some(previous) => {
                    let diff = describe_change(&session, &probe, payload, previous, &snapshot).await;
                    session.snapshots().write_diff(&snapshot, &diff).await?;
                    true
                }
                None => false,
            };

            info!(
                snapshot = %snapshot.id,
                file = %snapshot.file_name,
                %checksum,
                "content changed"
            );
            update = update.changed(changed_at, snapshot.clone());
            Detection::Changed { checksum, snapshot, diffed }
        };

        session.update_latest_state(update).await?;
        Ok(detection)
    }
}

/// Hex SHA-256 of the tracked content.
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// The check time, truncated to snapshot id precision and strictly after the
/// previous change.
fn next_change_time(checked_at: DateTime<Utc>, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let checked_at = checked_at.trunc_subsecs(6);
    match previous {
        Some(previous) if checked_at <= previous => previous + TimeDelta::microseconds(1),
        _ => checked_at,
    }
}

/// The text stored in the `diff` file: the probe's note when the content
/// cannot be diffed, a unified line diff otherwise.
async fn describe_change(
    session: &StoreSession<'_>,
    probe: &Probe,
    payload: &Payload,
    previous: &SnapshotRef,
    current: &SnapshotRef,
) -> String {
    if let (false, Some(note)) = (payload.diffable, probe.outcome.note()) {
        return format!("{note}\n");
    }

    match session.snapshots().read(previous).await {
        Ok(before) => unified_diff(&previous.id, &before, &current.id, &payload.bytes),
        Err(error) => {
            warn!(previous = %previous.id, %error, "previous snapshot unreadable, diff skipped");
            format!("diff_impossible: previous snapshot {} unavailable\n", previous.id)
        }
    }
}

pub fn unified_diff(before_name: &str, before: &[u8], after_name: &str, after: &[u8]) -> String {
    let before = String::from_utf8_lossy(before);
    let after = String::from_utf8_lossy(after);

    TextDiff::from_lines(&*before, &*after)
        .unified_diff()
        .context_radius(3)
        .header(before_name, after_name)
        .to_string()
}
