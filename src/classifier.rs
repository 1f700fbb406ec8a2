//! Reconciles a student's submissions against a course's assignment list.
//!
//! Every assignment lands in exactly one [`SubmissionStatus`] bucket, so the
//! counters of the resulting [`SubmissionStats`] always sum to the number of
//! assignments. Submissions for assignments outside the list are ignored.

use crate::models::{
    Assignment, DueDate, DueTime, SubmissionRecord, SubmissionState, SubmissionStats,
    SubmissionStatus,
};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use std::collections::HashMap;

/// Resolve the instant an assignment is due.
///
/// Dates and times are read as UTC, which is how the classroom API reports them.
/// Missing date components are taken from `now`'s calendar date. Without a
/// due time the assignment is due at 23:59:59.999 of its due date. Returns
/// `None` when the components do not form a valid calendar date.
pub fn due_instant(date: &DueDate, time: Option<&DueTime>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let today = now.date_naive();
    let day = NaiveDate::from_ymd_opt(
        date.year.unwrap_or(today.year()),
        date.month.unwrap_or(today.month()),
        date.day.unwrap_or(today.day()),
    )?;

    let time = match time.and_then(|t| NaiveTime::from_hms_opt(t.hours, t.minutes, 0)) {
        Some(t) => t,
        None => NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?,
    };

    Some(day.and_time(time).and_utc())
}

/// An assignment is overdue only when `now` is strictly after its due instant.
pub fn is_overdue(assignment: &Assignment, now: DateTime<Utc>) -> bool {
    assignment
        .due_date
        .as_ref()
        .and_then(|date| due_instant(date, assignment.due_time.as_ref(), now))
        .is_some_and(|due| now > due)
}

fn pending(assignment: &Assignment, now: DateTime<Utc>) -> SubmissionStatus {
    if is_overdue(assignment, now) {
        SubmissionStatus::Missing
    } else {
        SubmissionStatus::Assigned
    }
}

/// Classify a single assignment given its authoritative submission, if any.
pub fn classify_one(
    assignment: &Assignment,
    submission: Option<&SubmissionRecord>,
    now: DateTime<Utc>,
) -> SubmissionStatus {
    let Some(submission) = submission else {
        return pending(assignment, now);
    };

    match &submission.state {
        SubmissionState::New | SubmissionState::Created | SubmissionState::ReclaimedByStudent => {
            pending(assignment, now)
        }
        SubmissionState::TurnedIn if submission.late => SubmissionStatus::TurnedInLate,
        SubmissionState::TurnedIn => SubmissionStatus::TurnedIn,
        SubmissionState::Returned => SubmissionStatus::Returned,
        SubmissionState::Other(_) => SubmissionStatus::Assigned,
    }
}

/// Classify every assignment, in assignment order.
///
/// When several submissions share an assignment id the last one wins.
pub fn classify_assignments<'a>(
    assignments: &'a [Assignment],
    submissions: &[SubmissionRecord],
    now: DateTime<Utc>,
) -> Vec<(&'a Assignment, SubmissionStatus)> {
    let latest: HashMap<&str, &SubmissionRecord> = submissions
        .iter()
        .map(|s| (s.assignment_id.as_str(), s))
        .collect();

    assignments
        .iter()
        .map(|a| {
            let status = classify_one(a, latest.get(a.id.as_str()).copied(), now);
            (a, status)
        })
        .collect()
}

/// Reduce a student's assignments and submissions to bucket counts.
pub fn classify(
    assignments: &[Assignment],
    submissions: &[SubmissionRecord],
    now: DateTime<Utc>,
) -> SubmissionStats {
    let mut stats = SubmissionStats::default();
    for (_, status) in classify_assignments(assignments, submissions, now) {
        stats.record(status);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CourseWorkPayload, DatePayload, TimeOfDayPayload};
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn due(id: &str, y: i32, m: u32, d: u32) -> Assignment {
        Assignment::new(id).due(DueDate::ymd(y, m, d), None)
    }

    fn sub(id: &str, state: SubmissionState, late: bool) -> SubmissionRecord {
        SubmissionRecord::new(id, state, late)
    }

    #[test]
    fn test_end_to_end_scenario() {
        let assignments = vec![
            Assignment::new("a1").due(
                DueDate::ymd(2024, 1, 1),
                Some(DueTime {
                    hours: 23,
                    minutes: 59,
                }),
            ),
            Assignment::new("a2"),
        ];
        let submissions = vec![sub("a1", SubmissionState::TurnedIn, false)];

        let stats = classify(&assignments, &submissions, at(2024, 2, 1, 0, 0, 0));
        assert_eq!(
            stats,
            SubmissionStats {
                assigned: 1,
                turned_in: 1,
                turned_in_late: 0,
                missing: 0,
                returned: 0,
            }
        );
        assert_eq!(stats.total(), 2);
    }

    #[test]
    fn test_no_submission_without_due_date_is_assigned() {
        let stats = classify(&[Assignment::new("a1")], &[], at(2030, 1, 1, 0, 0, 0));
        assert_eq!(stats.assigned, 1);
        assert_eq!(stats.total(), 1);
    }

    #[test]
    fn test_no_submission_past_due_is_missing() {
        let stats = classify(&[due("a1", 2024, 1, 1)], &[], at(2024, 1, 2, 0, 0, 0));
        assert_eq!(stats.missing, 1);
        assert_eq!(stats.total(), 1);
    }

    #[test]
    fn test_turned_in_on_time_only_touches_turned_in() {
        let assignments = vec![due("a1", 2024, 1, 1)];
        let submissions = vec![sub("a1", SubmissionState::TurnedIn, false)];
        let stats = classify(&assignments, &submissions, at(2025, 1, 1, 0, 0, 0));
        assert_eq!(
            stats,
            SubmissionStats {
                turned_in: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_turned_in_late_flag() {
        let assignments = vec![due("a1", 2024, 1, 1)];
        let submissions = vec![sub("a1", SubmissionState::TurnedIn, true)];
        let stats = classify(&assignments, &submissions, at(2023, 1, 1, 0, 0, 0));
        assert_eq!(
            stats,
            SubmissionStats {
                turned_in_late: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_returned_ignores_lateness() {
        let assignments = vec![due("a1", 2024, 1, 1), due("a2", 2024, 1, 1)];
        let submissions = vec![
            sub("a1", SubmissionState::Returned, true),
            sub("a2", SubmissionState::Returned, false),
        ];
        let stats = classify(&assignments, &submissions, at(2025, 1, 1, 0, 0, 0));
        assert_eq!(stats.returned, 2);
        assert_eq!(stats.total(), 2);
    }

    #[test]
    fn test_pending_states_follow_deadline() {
        let now = at(2024, 6, 1, 12, 0, 0);
        let assignments = vec![due("past", 2024, 5, 1), due("future", 2024, 7, 1)];

        for state in [
            SubmissionState::New,
            SubmissionState::Created,
            SubmissionState::ReclaimedByStudent,
        ] {
            let submissions = vec![sub("past", state.clone(), false), sub("future", state, true)];
            let stats = classify(&assignments, &submissions, now);
            assert_eq!(stats.missing, 1);
            assert_eq!(stats.assigned, 1);
        }
    }

    #[test]
    fn test_unknown_state_defaults_to_assigned() {
        let assignments = vec![due("a1", 2020, 1, 1)];
        let submissions = vec![sub(
            "a1",
            SubmissionState::Other("SUBMISSION_STATE_UNSPECIFIED".to_string()),
            true,
        )];
        let stats = classify(&assignments, &submissions, at(2024, 1, 1, 0, 0, 0));
        assert_eq!(stats.assigned, 1);
        assert_eq!(stats.total(), 1);
    }

    #[test]
    fn test_due_instant_equal_to_now_is_not_overdue() {
        let assignment = Assignment::new("a1").due(
            DueDate::ymd(2024, 3, 10),
            Some(DueTime {
                hours: 17,
                minutes: 30,
            }),
        );
        let due = at(2024, 3, 10, 17, 30, 0);
        assert!(!is_overdue(&assignment, due));
        assert!(is_overdue(&assignment, due + chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn test_missing_due_time_means_end_of_day() {
        let assignment = due("a1", 2024, 3, 10);
        let end_of_day = at(2024, 3, 10, 23, 59, 59) + chrono::Duration::milliseconds(999);
        assert!(!is_overdue(&assignment, at(2024, 3, 10, 23, 59, 59)));
        assert!(!is_overdue(&assignment, end_of_day));
        assert!(is_overdue(&assignment, at(2024, 3, 11, 0, 0, 0)));
    }

    #[test]
    fn test_empty_due_time_payload_is_due_at_end_of_day() {
        let payload = CourseWorkPayload {
            id: Some("a1".to_string()),
            due_date: Some(DatePayload {
                year: Some(2024),
                month: Some(3),
                day: Some(2),
            }),
            due_time: Some(TimeOfDayPayload::default()),
            ..Default::default()
        };
        let assignment = crate::parser::parse_course_work(&payload).unwrap();

        assert!(!is_overdue(&assignment, at(2024, 3, 2, 12, 0, 0)));
        assert!(!is_overdue(&assignment, at(2024, 3, 2, 23, 59, 0)));
        assert!(is_overdue(&assignment, at(2024, 3, 2, 23, 59, 1)));
    }

    #[test]
    fn test_partial_due_date_uses_current_date_components() {
        let now = at(2024, 5, 20, 12, 0, 0);
        let only_day = Assignment::new("a1").due(
            DueDate {
                year: None,
                month: None,
                day: Some(19),
            },
            None,
        );
        assert!(is_overdue(&only_day, now));

        let empty = Assignment::new("a2").due(DueDate::default(), None);
        assert!(!is_overdue(&empty, now));
    }

    #[test]
    fn test_invalid_due_date_is_never_overdue() {
        let assignment = due("a1", 2024, 13, 40);
        assert!(!is_overdue(&assignment, at(2030, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn test_invalid_due_time_falls_back_to_end_of_day() {
        let assignment = Assignment::new("a1").due(
            DueDate::ymd(2024, 3, 10),
            Some(DueTime {
                hours: 25,
                minutes: 0,
            }),
        );
        assert!(!is_overdue(&assignment, at(2024, 3, 10, 23, 0, 0)));
        assert!(is_overdue(&assignment, at(2024, 3, 11, 0, 0, 0)));
    }

    #[test]
    fn test_last_submission_wins() {
        let assignments = vec![due("a1", 2024, 1, 1)];
        let submissions = vec![
            sub("a1", SubmissionState::TurnedIn, false),
            sub("a1", SubmissionState::Returned, false),
        ];
        let stats = classify(&assignments, &submissions, at(2025, 1, 1, 0, 0, 0));
        assert_eq!(stats.returned, 1);
        assert_eq!(stats.turned_in, 0);

        let reversed: Vec<_> = submissions.into_iter().rev().collect();
        let stats = classify(&assignments, &reversed, at(2025, 1, 1, 0, 0, 0));
        assert_eq!(stats.turned_in, 1);
        assert_eq!(stats.returned, 0);
    }

    #[test]
    fn test_submissions_for_unknown_assignments_are_ignored() {
        let assignments = vec![Assignment::new("a1")];
        let submissions = vec![
            sub("other", SubmissionState::TurnedIn, false),
            sub("another", SubmissionState::Returned, false),
        ];
        let stats = classify(&assignments, &submissions, at(2025, 1, 1, 0, 0, 0));
        assert_eq!(stats.assigned, 1);
        assert_eq!(stats.total(), 1);
    }

    #[test]
    fn test_empty_course() {
        let stats = classify(&[], &[sub("a1", SubmissionState::TurnedIn, false)], Utc::now());
        assert_eq!(stats, SubmissionStats::default());
    }

    #[test]
    fn test_total_matches_assignment_count_for_every_combination() {
        let now = at(2024, 6, 15, 8, 0, 0);
        let states = [
            None,
            Some(SubmissionState::New),
            Some(SubmissionState::Created),
            Some(SubmissionState::TurnedIn),
            Some(SubmissionState::Returned),
            Some(SubmissionState::ReclaimedByStudent),
            Some(SubmissionState::Other("DRAFT".to_string())),
        ];
        let deadlines = [None, Some(DueDate::ymd(2024, 1, 1)), Some(DueDate::ymd(2025, 1, 1))];

        let mut assignments = Vec::new();
        let mut submissions = Vec::new();
        for (i, state) in states.iter().enumerate() {
            for (j, deadline) in deadlines.iter().enumerate() {
                for late in [false, true] {
                    let id = format!("a-{}-{}-{}", i, j, late);
                    let mut assignment = Assignment::new(id.clone());
                    assignment.due_date = *deadline;
                    assignments.push(assignment);
                    if let Some(state) = state {
                        submissions.push(sub(&id, state.clone(), late));
                    }
                }
            }
        }

        let first = classify(&assignments, &submissions, now);
        assert_eq!(first.total() as usize, assignments.len());

        // Pure: same inputs, same output
        let second = classify(&assignments, &submissions, now);
        assert_eq!(first, second);
    }

    #[test]
    fn test_classify_assignments_keeps_order() {
        let assignments = vec![Assignment::new("b"), due("a", 2020, 1, 1)];
        let statuses = classify_assignments(&assignments, &[], at(2024, 1, 1, 0, 0, 0));
        let ids: Vec<_> = statuses.iter().map(|(a, _)| a.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(statuses[0].1, SubmissionStatus::Assigned);
        assert_eq!(statuses[1].1, SubmissionStatus::Missing);
    }
}
