use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PayoutError, Result};

pub const PRESESSION_RATE: i64 = 500;
pub const SESSION_RATE: i64 = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateKind {
    Presession,
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRate {
    pub kind: RateKind,
    pub amount: i64,
}

/// Session-type tag to payable rate, in whole currency units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateTable {
    rates: BTreeMap<String, SessionRate>,
}

impl RateTable {
    pub fn new(rates: BTreeMap<String, SessionRate>) -> Result<Self> {
        let table = Self { rates };
        table.validate()?;
        Ok(table)
    }

    pub fn lookup(&self, session_type: &str) -> Option<SessionRate> {
        self.rates.get(session_type).copied()
    }

    pub fn validate(&self) -> Result<()> {
        if self.rates.is_empty() {
            return Err(PayoutError::InvalidRateTable(
                "at least one session type must be configured".to_string(),
            ));
        }
        for (tag, rate) in &self.rates {
            if tag.trim().is_empty() {
                return Err(PayoutError::InvalidRateTable(
                    "session type tags cannot be blank".to_string(),
                ));
            }
            if rate.amount < 0 {
                return Err(PayoutError::InvalidRateTable(format!(
                    "rate for '{tag}' is negative ({})",
                    rate.amount
                )));
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SessionRate)> {
        self.rates.iter().map(|(tag, rate)| (tag.as_str(), rate))
    }
}

impl Default for RateTable {
    fn default() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert(
            "s0".to_string(),
            SessionRate {
                kind: RateKind::Presession,
                amount: PRESESSION_RATE,
            },
        );
        for tag in ["s1", "s2", "s3", "s4"] {
            rates.insert(
                tag.to_string(),
                SessionRate {
                    kind: RateKind::Session,
                    amount: SESSION_RATE,
                },
            );
        }
        Self { rates }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_matches_program_rates() {
        let table = RateTable::default();
        assert_eq!(
            table.lookup("s0"),
            Some(SessionRate {
                kind: RateKind::Presession,
                amount: 500
            })
        );
        for tag in ["s1", "s2", "s3", "s4"] {
            let rate = table.lookup(tag).unwrap();
            assert_eq!(rate.kind, RateKind::Session);
            assert_eq!(rate.amount, 1500);
        }
        assert_eq!(table.lookup("s5"), None);
        assert_eq!(table.lookup("S1"), None);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn rejects_empty_and_negative_tables() {
        assert!(matches!(
            RateTable::new(BTreeMap::new()),
            Err(PayoutError::InvalidRateTable(_))
        ));

        let mut rates = BTreeMap::new();
        rates.insert(
            "s1".to_string(),
            SessionRate {
                kind: RateKind::Session,
                amount: -1,
            },
        );
        assert!(RateTable::new(rates).is_err());
    }

    #[test]
    fn parses_from_toml() {
        let raw = r#"
            [s0]
            kind = "presession"
            amount = 750

            [s1]
            kind = "session"
            amount = 2000
        "#;
        let rates: BTreeMap<String, SessionRate> = toml::from_str(raw).unwrap();
        let table = RateTable::new(rates).unwrap();
        assert_eq!(table.lookup("s0").unwrap().amount, 750);
        assert_eq!(table.lookup("s1").unwrap().kind, RateKind::Session);
        assert_eq!(table.iter().count(), 2);
    }
}
