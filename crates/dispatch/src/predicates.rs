//! Derived predicates (spec.md §4.6): a pure function of the previous and
//! current participant snapshot plus the circuit list. Materialized as a
//! struct of booleans rather than re-derived inline at each call site, so
//! the dispatch function reads as a flat list of rule checks.

use ceremony_core::{Circuit, Contribution, ContributionStep, Participant, ParticipantStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predicates {
    pub is_waiting: bool,
    pub is_current_contributor: bool,
    pub progress_to_next: bool,
    pub completed_contribution: bool,
    pub timeout_triggered_while_contributing: bool,
    pub timeout_expired: bool,
    pub already_contributed_to_every_circuit: bool,
    pub has_resumable_step: bool,
    pub starting_or_resuming_contribution: bool,
}

impl Predicates {
    pub fn compute(prev: Option<&Participant>, current: &Participant, circuits: &[Circuit]) -> Self {
        let circuit = current.current_circuit(circuits);

        let is_waiting = current.status == ParticipantStatus::Waiting;

        let is_current_contributor = current.status == ParticipantStatus::Contributing
            && circuit
                .map(|c| c.waiting_queue.current_contributor.as_deref() == Some(current.id.as_str()))
                .unwrap_or(false);

        let progress_to_next = current.contribution_step == Some(ContributionStep::Completed);
        let completed_contribution = progress_to_next && current.status == ParticipantStatus::Contributed;

        let timeout_triggered_while_contributing =
            current.status == ParticipantStatus::TimedOut && current.contribution_step != Some(ContributionStep::Completed);

        let timeout_expired = current.status == ParticipantStatus::Exhumed;

        let already_contributed_to_every_circuit = current.status == ParticipantStatus::Done
            && current.contribution_step == Some(ContributionStep::Completed)
            && current.contribution_progress as usize == circuits.len()
            && current.contributions.len() == circuits.len();

        let has_resumable_step = current.contribution_step.map(|s| s.is_resumable()).unwrap_or(false);

        let starting_or_resuming_contribution = starting_or_resuming(prev, current);

        Self {
            is_waiting,
            is_current_contributor,
            progress_to_next,
            completed_contribution,
            timeout_triggered_while_contributing,
            timeout_expired,
            already_contributed_to_every_circuit,
            has_resumable_step,
            starting_or_resuming_contribution,
        }
    }
}

fn starting_or_resuming(prev: Option<&Participant>, current: &Participant) -> bool {
    match current.contribution_step {
        Some(ContributionStep::Downloading) => true,
        Some(ContributionStep::Computing) => {
            let prev = match prev {
                Some(p) => p,
                None => return false,
            };
            prev.contribution_step == Some(ContributionStep::Computing)
                && contributions_unchanged(&prev.contributions, &current.contributions)
        }
        Some(ContributionStep::Uploading) => match prev {
            Some(prev) => {
                let no_change = prev.contribution_step == Some(ContributionStep::Uploading);
                let no_temp_either_side = prev.temp_contribution_data.is_none() && current.temp_contribution_data.is_none();
                let temp_match = match (&prev.temp_contribution_data, &current.temp_contribution_data) {
                    (Some(a), Some(b)) => a.same_checkpoint(b),
                    _ => false,
                };
                (no_change && no_temp_either_side) || temp_match
            }
            None => current.temp_contribution_data.is_none(),
        },
        _ => false,
    }
}

fn contributions_unchanged(prev: &[Contribution], current: &[Contribution]) -> bool {
    prev.len() == current.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ceremony_core::{AvgTimings, TempContributionData, UploadedPart, WaitingQueue};

    fn circuit(id: &str, current_contributor: Option<&str>) -> Circuit {
        Circuit {
            id: id.into(),
            sequence_position: 1,
            prefix: id.into(),
            avg_timings: AvgTimings::default(),
            waiting_queue: WaitingQueue {
                current_contributor: current_contributor.map(String::from),
                contributors: vec![],
                completed_contributions: 0,
            },
        }
    }

    fn participant(status: ParticipantStatus, progress: u32, step: Option<ContributionStep>) -> Participant {
        Participant {
            id: "self".into(),
            status,
            contribution_progress: progress,
            contribution_step: step,
            contributions: vec![],
            temp_contribution_data: None,
        }
    }

    #[test]
    fn current_contributor_requires_matching_circuit_owner() {
        let circuits = vec![circuit("c1", Some("self"))];
        let current = participant(ParticipantStatus::Contributing, 1, Some(ContributionStep::Downloading));
        let p = Predicates::compute(None, &current, &circuits);
        assert!(p.is_current_contributor);

        let circuits_other = vec![circuit("c1", Some("someone-else"))];
        let p2 = Predicates::compute(None, &current, &circuits_other);
        assert!(!p2.is_current_contributor);
    }

    #[test]
    fn already_contributed_to_every_circuit_requires_full_match() {
        let circuits = vec![circuit("c1", None)];
        let mut current = participant(ParticipantStatus::Done, 1, Some(ContributionStep::Completed));
        current.contributions = vec![Contribution { zkey_index: 1, hash: "h".into(), time_ms: 1, valid: Some(true) }];
        let p = Predicates::compute(None, &current, &circuits);
        assert!(p.already_contributed_to_every_circuit);
    }

    #[test]
    fn resuming_upload_with_matching_checkpoint_is_allowed() {
        let circuits = vec![circuit("c1", Some("self"))];
        let parts = vec![UploadedPart { number: 1, etag: "a".into() }, UploadedPart { number: 2, etag: "b".into() }];
        let mut prev = participant(ParticipantStatus::Contributing, 1, Some(ContributionStep::Uploading));
        prev.temp_contribution_data = Some(TempContributionData { parts: parts.clone() });
        let mut current = prev.clone();
        current.temp_contribution_data = Some(TempContributionData { parts });

        let p = Predicates::compute(Some(&prev), &current, &circuits);
        assert!(p.starting_or_resuming_contribution);
    }

    #[test]
    fn timeout_while_contributing_excludes_completed_step() {
        let circuits = vec![circuit("c1", None)];
        let current = participant(ParticipantStatus::TimedOut, 1, Some(ContributionStep::Computing));
        let p = Predicates::compute(None, &current, &circuits);
        assert!(p.timeout_triggered_while_contributing);

        let current_completed = participant(ParticipantStatus::TimedOut, 1, Some(ContributionStep::Completed));
        let p2 = Predicates::compute(None, &current_completed, &circuits);
        assert!(!p2.timeout_triggered_while_contributing);
    }
}
