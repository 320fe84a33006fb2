use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fellow profile fields joined onto each attendance row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FellowProfile {
    pub name: Option<String>,
    pub supervisor_id: Option<String>,
    pub supervisor_name: Option<String>,
    pub mpesa_name: Option<String>,
    pub mpesa_number: Option<String>,
}

/// One fellow's recorded attendance at one session occurrence.
#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub fellow_id: String,
    pub school_id: String,
    pub session_type: String,
    pub attended: bool,
    pub occurred: bool,
    pub session_date: DateTime<Utc>,
    pub fellow: FellowProfile,
}

/// Half-open window `[start, end)` of eligible session dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutDetail {
    pub fellow_id: String,
    pub fellow_name: String,
    pub supervisor_id: String,
    pub supervisor_name: String,
    pub payment_account_name: Option<String>,
    pub payment_account_number: Option<String>,
    pub total_amount: i64,
    pub presession_count: u32,
    pub session_count: u32,
}

impl PayoutDetail {
    pub fn has_payment_account_name(&self) -> bool {
        is_present(&self.payment_account_name)
    }

    pub fn has_payment_account_number(&self) -> bool {
        is_present(&self.payment_account_number)
    }

    pub fn has_complete_payment_info(&self) -> bool {
        self.has_payment_account_name() && self.has_payment_account_number()
    }
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteRecords {
    pub count_missing_payment_account_name: usize,
    pub count_missing_payment_account_number: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutReport {
    pub payout_details: Vec<PayoutDetail>,
    pub payout_period: PayoutPeriod,
    pub incomplete_records: IncompleteRecords,
    pub total_payout_amount: i64,
    pub total_payout_amount_with_complete_payment_info: i64,
}

impl PayoutReport {
    /// Builds a report from finished details, deriving every summary figure.
    pub fn from_details(payout_details: Vec<PayoutDetail>, payout_period: PayoutPeriod) -> Self {
        let incomplete_records = IncompleteRecords {
            count_missing_payment_account_name: payout_details
                .iter()
                .filter(|d| !d.has_payment_account_name())
                .count(),
            count_missing_payment_account_number: payout_details
                .iter()
                .filter(|d| !d.has_payment_account_number())
                .count(),
        };
        let total_payout_amount = payout_details.iter().map(|d| d.total_amount).sum();
        let total_payout_amount_with_complete_payment_info = payout_details
            .iter()
            .filter(|d| d.has_complete_payment_info())
            .map(|d| d.total_amount)
            .sum();

        Self {
            payout_details,
            payout_period,
            incomplete_records,
            total_payout_amount,
            total_payout_amount_with_complete_payment_info,
        }
    }

    pub fn fellows_missing_payment_info(&self) -> impl Iterator<Item = &PayoutDetail> {
        self.payout_details
            .iter()
            .filter(|d| !d.has_complete_payment_info())
    }
}
