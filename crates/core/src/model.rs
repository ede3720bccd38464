//! The ceremony data model: `Ceremony`, `Circuit`, `Participant`,
//! `Contribution`, and the timeout record. The server owns and mutates
//! these documents; the client only reads and writes through the
//! coordination adapter's callables.

use serde::{Deserialize, Serialize};

/// Immutable-per-run ceremony record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ceremony {
    pub id: String,
    pub title: String,
    /// Storage-path namespace for this ceremony's artifacts.
    pub prefix: String,
    pub circuits: Vec<Circuit>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AvgTimings {
    /// Milliseconds; zero means "unknown".
    pub full_contribution_ms: u64,
    /// Milliseconds; zero means "unknown".
    pub verify_cloud_function_ms: u64,
}

impl AvgTimings {
    pub fn is_known(&self) -> bool {
        self.full_contribution_ms > 0 && self.verify_cloud_function_ms > 0
    }

    pub fn per_contributor_ms(&self) -> u64 {
        self.full_contribution_ms + self.verify_cloud_function_ms
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct WaitingQueue {
    pub current_contributor: Option<String>,
    pub contributors: Vec<String>,
    pub completed_contributions: u32,
}

impl WaitingQueue {
    /// 1-based position of `participant_id` in the queue, if present.
    pub fn position_of(&self, participant_id: &str) -> Option<usize> {
        self.contributors
            .iter()
            .position(|c| c == participant_id)
            .map(|idx| idx + 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Circuit {
    pub id: String,
    /// 1-based position within the ceremony's circuit list.
    pub sequence_position: u32,
    pub prefix: String,
    pub avg_timings: AvgTimings,
    pub waiting_queue: WaitingQueue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantStatus {
    Waiting,
    Contributing,
    Contributed,
    Done,
    TimedOut,
    Exhumed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContributionStep {
    Downloading,
    Computing,
    Uploading,
    Verifying,
    Completed,
}

impl ContributionStep {
    /// Steps from which a pipeline run may legitimately resume (§4.6
    /// `hasResumableStep`).
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            ContributionStep::Downloading | ContributionStep::Computing | ContributionStep::Uploading
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedPart {
    pub number: u32,
    pub etag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TempContributionData {
    pub parts: Vec<UploadedPart>,
}

impl TempContributionData {
    /// Same key-set and value-multiset as `other` — used by the
    /// `startingOrResumingContribution` predicate to detect an
    /// unchanged-across-redelivery upload checkpoint.
    pub fn same_checkpoint(&self, other: &TempContributionData) -> bool {
        let mut a: Vec<&UploadedPart> = self.parts.iter().collect();
        let mut b: Vec<&UploadedPart> = other.parts.iter().collect();
        a.sort_by_key(|p| p.number);
        b.sort_by_key(|p| p.number);
        a == b
    }

    pub fn highest_acknowledged_part(&self) -> u32 {
        self.parts.iter().map(|p| p.number).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    /// Completed-count at time of submission, formatted width 5 for
    /// artifact naming (see `naming::format_zkey_index`).
    pub zkey_index: u32,
    pub hash: String,
    pub time_ms: u64,
    pub valid: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub status: ParticipantStatus,
    /// 0..=circuits.len(); 0 means "not yet started". 1-based index of the
    /// circuit currently (or most recently) being contributed to.
    pub contribution_progress: u32,
    pub contribution_step: Option<ContributionStep>,
    pub contributions: Vec<Contribution>,
    pub temp_contribution_data: Option<TempContributionData>,
}

impl Participant {
    /// Bind the circuit this participant is currently on, per §4.6 step 2
    /// ("If 1 ≤ progress ≤ |circuits| bind circuit = circuits[progress-1]").
    pub fn current_circuit<'a>(&self, circuits: &'a [Circuit]) -> Option<&'a Circuit> {
        if self.contribution_progress == 0 {
            return None;
        }
        circuits.get((self.contribution_progress - 1) as usize)
    }
}

/// Absolute wall-clock end time of an active cool-down timeout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeoutRecord {
    pub end_date_ms: i64,
}
