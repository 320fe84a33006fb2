use std::collections::{BTreeMap, HashSet};

use crate::error::{PayoutError, Result};
use crate::models::{AttendanceRecord, FellowProfile, PayoutDetail, PayoutPeriod, PayoutReport};
use crate::rates::{RateKind, RateTable};

pub const MISSING: &str = "N/A";

/// Folds attendance into one payout row per fellow.
///
/// A `(fellow, school, session type)` triple is credited at most once, so
/// duplicate attendance rows never pay twice. Any record whose session type
/// is not in `rates` fails the whole run. With `verify_eligibility` set,
/// records that did not occur or were not attended are rejected as well
/// instead of being trusted to the upstream query.
pub fn calculate_payouts(
    records: &[AttendanceRecord],
    period: PayoutPeriod,
    rates: &RateTable,
    verify_eligibility: bool,
) -> Result<PayoutReport> {
    let mut details: BTreeMap<&str, PayoutDetail> = BTreeMap::new();
    let mut credited: HashSet<(&str, &str, &str)> = HashSet::new();

    for record in records {
        if verify_eligibility {
            check_eligible(record)?;
        }

        let detail = details
            .entry(record.fellow_id.as_str())
            .or_insert_with(|| new_detail(&record.fellow_id, &record.fellow));

        let key = (
            record.fellow_id.as_str(),
            record.school_id.as_str(),
            record.session_type.as_str(),
        );
        if credited.contains(&key) {
            continue;
        }

        let rate = rates
            .lookup(&record.session_type)
            .ok_or_else(|| PayoutError::InvalidSessionType {
                fellow_id: record.fellow_id.clone(),
                session_type: record.session_type.clone(),
            })?;

        detail.total_amount += rate.amount;
        match rate.kind {
            RateKind::Presession => detail.presession_count += 1,
            RateKind::Session => detail.session_count += 1,
        }
        credited.insert(key);
    }

    Ok(PayoutReport::from_details(
        details.into_values().collect(),
        period,
    ))
}

fn check_eligible(record: &AttendanceRecord) -> Result<()> {
    if !record.occurred {
        return Err(PayoutError::InvalidArgument(format!(
            "fellow {} has attendance for a session that did not occur ({} at school {})",
            record.fellow_id, record.session_type, record.school_id
        )));
    }
    if !record.attended {
        return Err(PayoutError::InvalidArgument(format!(
            "fellow {} is marked absent for {} at school {}",
            record.fellow_id, record.session_type, record.school_id
        )));
    }
    Ok(())
}

fn new_detail(fellow_id: &str, fellow: &FellowProfile) -> PayoutDetail {
    PayoutDetail {
        fellow_id: or_missing(Some(fellow_id)),
        fellow_name: or_missing(fellow.name.as_deref()),
        supervisor_id: or_missing(fellow.supervisor_id.as_deref()),
        supervisor_name: or_missing(fellow.supervisor_name.as_deref()),
        payment_account_name: fellow.mpesa_name.clone(),
        payment_account_number: fellow.mpesa_number.clone(),
        total_amount: 0,
        presession_count: 0,
        session_count: 0,
    }
}

fn or_missing(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => MISSING.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn period() -> PayoutPeriod {
        PayoutPeriod {
            start: Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 6, 13, 0, 0, 0).unwrap(),
        }
    }

    fn paid_profile() -> FellowProfile {
        FellowProfile {
            name: Some("Wanjiru Kamau".to_string()),
            supervisor_id: Some("sup-1".to_string()),
            supervisor_name: Some("Otieno Odhiambo".to_string()),
            mpesa_name: Some("WANJIRU KAMAU".to_string()),
            mpesa_number: Some("0712345678".to_string()),
        }
    }

    fn record(fellow_id: &str, school_id: &str, session_type: &str) -> AttendanceRecord {
        AttendanceRecord {
            fellow_id: fellow_id.to_string(),
            school_id: school_id.to_string(),
            session_type: session_type.to_string(),
            attended: true,
            occurred: true,
            session_date: Utc.with_ymd_and_hms(2024, 6, 11, 9, 0, 0).unwrap(),
            fellow: paid_profile(),
        }
    }

    fn run(records: &[AttendanceRecord]) -> Result<PayoutReport> {
        calculate_payouts(records, period(), &RateTable::default(), true)
    }

    #[test]
    fn presession_then_session_accumulate() {
        let report = run(&[record("f1", "school-a", "s0")]).unwrap();
        let d = &report.payout_details[0];
        assert_eq!((d.total_amount, d.presession_count, d.session_count), (500, 1, 0));

        let report = run(&[record("f1", "school-a", "s0"), record("f1", "school-b", "s2")]).unwrap();
        assert_eq!(report.payout_details.len(), 1);
        let d = &report.payout_details[0];
        assert_eq!((d.total_amount, d.presession_count, d.session_count), (2000, 1, 1));
    }

    #[test]
    fn duplicate_attendance_is_credited_once() {
        let once = run(&[record("f1", "school-a", "s1")]).unwrap();
        let twice = run(&[record("f1", "school-a", "s1"), record("f1", "school-a", "s1")]).unwrap();
        assert_eq!(once.payout_details, twice.payout_details);
        assert_eq!(twice.total_payout_amount, 1500);
    }

    #[test]
    fn same_session_at_different_schools_is_paid_twice() {
        let report = run(&[record("f1", "school-a", "s3"), record("f1", "school-b", "s3")]).unwrap();
        let d = &report.payout_details[0];
        assert_eq!(d.session_count, 2);
        assert_eq!(d.total_amount, 3000);
    }

    #[test]
    fn totals_do_not_depend_on_input_order() {
        let mut records = vec![
            record("f1", "school-a", "s0"),
            record("f2", "school-a", "s1"),
            record("f1", "school-a", "s1"),
            record("f1", "school-a", "s1"),
            record("f2", "school-b", "s4"),
            record("f3", "school-c", "s2"),
            record("f2", "school-a", "s1"),
        ];
        let expected = run(&records).unwrap();
        for _ in 0..records.len() {
            records.rotate_left(1);
            assert_eq!(run(&records).unwrap(), expected);
        }
        records.reverse();
        assert_eq!(run(&records).unwrap(), expected);
        assert_eq!(expected.total_payout_amount, 500 + 1500 + 1500 + 1500 + 1500);
    }

    #[test]
    fn incomplete_payment_details_are_counted_and_excluded() {
        let mut unpaid = record("f2", "school-a", "s1");
        unpaid.fellow.mpesa_name = None;
        unpaid.fellow.mpesa_number = Some(String::new());

        let report = run(&[record("f1", "school-a", "s1"), unpaid]).unwrap();
        assert_eq!(report.incomplete_records.count_missing_payment_account_name, 1);
        assert_eq!(report.incomplete_records.count_missing_payment_account_number, 1);
        assert_eq!(report.total_payout_amount, 3000);
        assert_eq!(report.total_payout_amount_with_complete_payment_info, 1500);
    }

    #[test]
    fn unknown_session_type_aborts_the_run() {
        let err = run(&[record("f1", "school-a", "s1"), record("f2", "school-a", "s9")]).unwrap_err();
        assert_eq!(
            err,
            PayoutError::InvalidSessionType {
                fellow_id: "f2".to_string(),
                session_type: "s9".to_string(),
            }
        );
    }

    #[test]
    fn missing_identity_falls_back_but_payment_fields_stay_empty() {
        let mut bare = record("f1", "school-a", "s0");
        bare.fellow = FellowProfile::default();
        let report = run(&[bare]).unwrap();
        let d = &report.payout_details[0];
        assert_eq!(d.fellow_name, MISSING);
        assert_eq!(d.supervisor_id, MISSING);
        assert_eq!(d.supervisor_name, MISSING);
        assert_eq!(d.payment_account_name, None);
        assert_eq!(d.payment_account_number, None);
    }

    #[test]
    fn ineligible_records_are_rejected_when_verifying() {
        let mut absent = record("f1", "school-a", "s1");
        absent.attended = false;
        assert!(matches!(
            run(&[absent.clone()]),
            Err(PayoutError::InvalidArgument(_))
        ));

        let mut cancelled = record("f1", "school-a", "s1");
        cancelled.occurred = false;
        assert!(matches!(run(&[cancelled]), Err(PayoutError::InvalidArgument(_))));

        let trusted = calculate_payouts(&[absent], period(), &RateTable::default(), false).unwrap();
        assert_eq!(trusted.total_payout_amount, 1500);
    }

    #[test]
    fn empty_input_gives_empty_report() {
        let report = run(&[]).unwrap();
        assert!(report.payout_details.is_empty());
        assert_eq!(report.total_payout_amount, 0);
        assert_eq!(report.payout_period, period());
    }

    #[test]
    fn details_are_ordered_by_fellow() {
        let report = run(&[record("f3", "a", "s1"), record("f1", "a", "s1"), record("f2", "a", "s1")]).unwrap();
        let ids: Vec<_> = report.payout_details.iter().map(|d| d.fellow_id.as_str()).collect();
        assert_eq!(ids, ["f1", "f2", "f3"]);
    }
}
