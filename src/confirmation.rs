//! Redemption of owned REGO against a consumer's energy usage.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConflictError, RegoError, RegoResult, ValidationError};
use crate::records::{BuyingRego, CertificationIssueRego, Consumer, RegoConfirmation};
use crate::service::RegoService;
use crate::store::{Tx, TxResult, abort, id_key};
use crate::types::{ConsumerId, HoldingStatus, TimeStamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSelection {
    pub buying_rego_id: u64,
    pub rego_usage_amount: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationReceipt {
    pub confirmation: RegoConfirmation,
    pub lines: Vec<CertificationIssueRego>,
    /// Holdings written by the redemption: shrunk originals, used splits and
    /// fully used originals, in selection order.
    pub holdings: Vec<BuyingRego>,
}

/// `P-<yyyy-mm-dd>-<id padded to 4 digits>`.
pub fn confirmation_number(created: TimeStamp, id: u64) -> String {
    format!("P-{}-{:04}", created.date_string(), id)
}

/// SHA-256 over the CBOR encoding of the unsealed confirmation and its lines.
///
/// Lines are hashed in storage key order (ascending buying REGO id), whatever
/// order they are passed in.
pub fn seal(confirmation: &RegoConfirmation, lines: &[CertificationIssueRego]) -> RegoResult<String> {
    let mut unsealed = confirmation.clone();
    unsealed.seal = String::new();
    let mut ordered = lines.to_vec();
    ordered.sort_by_key(|line| line.buying_rego_id);
    let cbor = minicbor::to_vec((&unsealed, ordered.as_slice()))?;
    Ok(sha256::digest(&cbor))
}

impl BuyingRego {
    /// Carve `amount` units off the front of this holding into a new, used holding.
    pub fn split_off_used(&mut self, new_id: u64, amount: u64, now: TimeStamp) -> BuyingRego {
        let start = self.identification_start_number;
        self.buying_amount -= amount;
        self.identification_start_number = start + amount;
        BuyingRego {
            buying_rego_id: new_id,
            rego_group_id: self.rego_group_id,
            consumer_id: self.consumer_id,
            rego_trade_info_id: self.rego_trade_info_id,
            buying_amount: amount,
            identification_number: self.identification_number.clone(),
            identification_start_number: start,
            identification_end_number: start + amount - 1,
            rego_status: HoldingStatus::Used,
            split_from: Some(self.buying_rego_id),
            created_time: now,
        }
    }

    pub fn use_up(&mut self) {
        self.buying_amount = 0;
        self.rego_status = HoldingStatus::Used;
    }
}

fn check_holding(tx: &Tx<'_>, consumer_id: ConsumerId, id: u64, requested: u64) -> TxResult<()> {
    let holding: BuyingRego = tx.require(id)?;
    if holding.consumer_id != consumer_id {
        return abort(RegoError::unauthorized(format!(
            "buying REGO {id} is not held by consumer {consumer_id}"
        )));
    }
    if holding.rego_status != HoldingStatus::Active {
        return abort(ConflictError::HoldingUsed(id));
    }
    if requested > holding.buying_amount {
        return abort(ConflictError::InsufficientHolding {
            buying_rego_id: id,
            held: holding.buying_amount,
            requested,
        });
    }
    Ok(())
}

impl RegoService {
    /// Issue a usage confirmation consuming the selected holdings.
    ///
    /// Every selection is checked before anything is written; a selection naming
    /// the same holding twice is checked against the combined amount.
    pub fn issue_confirmation(
        &self,
        consumer_id: ConsumerId,
        selections: &[UsageSelection],
        usage_recognition_period: &str,
    ) -> RegoResult<ConfirmationReceipt> {
        if selections.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }
        let period = usage_recognition_period.trim();
        if period.is_empty() {
            return Err(ValidationError::MissingUsagePeriod.into());
        }
        let mut requested: BTreeMap<u64, u64> = BTreeMap::new();
        for s in selections {
            if s.rego_usage_amount == 0 {
                return Err(ValidationError::ZeroUsage(s.buying_rego_id).into());
            }
            let total = requested.entry(s.buying_rego_id).or_default();
            *total = total.saturating_add(s.rego_usage_amount);
        }
        let total_usage = requested
            .values()
            .try_fold(0u64, |acc, v| acc.checked_add(*v))
            .ok_or_else(|| ValidationError::InvalidAmount("total usage overflows".into()))?;

        let receipt = self.store.transaction(|tx| {
            let now = TimeStamp::now();
            let _consumer: Consumer = tx.require(consumer_id)?;
            for (&id, &amount) in &requested {
                check_holding(tx, consumer_id, id, amount)?;
            }

            let confirmation_id = tx.next_id()?;
            let mut lines = Vec::with_capacity(selections.len());
            let mut holdings = Vec::with_capacity(selections.len() * 2);
            for selection in selections {
                let mut holding: BuyingRego = tx.require(selection.buying_rego_id)?;
                let usage = selection.rego_usage_amount;

                let used_id = if usage < holding.buying_amount {
                    let used = holding.split_off_used(tx.next_id()?, usage, now);
                    tx.put(&used)?;
                    tx.put(&holding)?;
                    let used_id = used.buying_rego_id;
                    holdings.push(holding);
                    holdings.push(used);
                    used_id
                } else {
                    holding.use_up();
                    tx.put(&holding)?;
                    let used_id = holding.buying_rego_id;
                    holdings.push(holding);
                    used_id
                };

                let line = CertificationIssueRego {
                    rego_confirmation_id: confirmation_id,
                    buying_rego_id: used_id,
                    usage_application_amount: usage,
                };
                tx.put(&line)?;
                lines.push(line);
            }

            lines.sort_by_key(|line| line.buying_rego_id);
            let mut confirmation = RegoConfirmation {
                rego_confirmation_id: confirmation_id,
                consumer_id,
                rego_usage_amount: total_usage,
                power_usage_amount: total_usage,
                usage_recognition_period: period.to_string(),
                confirmation_number: confirmation_number(now, confirmation_id),
                created_date: now,
                seal: String::new(),
            };
            confirmation.seal = match seal(&confirmation, &lines) {
                Ok(seal) => seal,
                Err(e) => return abort(e),
            };
            tx.put(&confirmation)?;

            Ok(ConfirmationReceipt {
                confirmation,
                lines,
                holdings,
            })
        });

        match receipt {
            Ok(receipt) => {
                tracing::info!(
                    consumer_id,
                    confirmation_id = receipt.confirmation.rego_confirmation_id,
                    confirmation_number = %receipt.confirmation.confirmation_number,
                    amount = total_usage,
                    "REGO usage confirmation issued"
                );
                Ok(receipt)
            }
            Err(e) => {
                tracing::warn!(consumer_id, error = %e, "REGO usage confirmation refused");
                Err(e)
            }
        }
    }

    /// Recompute the seal of a stored confirmation.
    pub fn verify_seal(&self, confirmation_id: u64) -> RegoResult<bool> {
        let confirmation: RegoConfirmation = self
            .store
            .fetch(&id_key(confirmation_id))?
            .ok_or_else(|| RegoError::not_found("REGO confirmation", confirmation_id))?;
        let lines: Vec<CertificationIssueRego> = self.store.scan_prefix(&id_key(confirmation_id))?;
        Ok(seal(&confirmation, &lines)? == confirmation.seal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(amount: u64, start: u64) -> BuyingRego {
        BuyingRego {
            buying_rego_id: 10,
            rego_group_id: 1,
            consumer_id: 2,
            rego_trade_info_id: Some(3),
            buying_amount: amount,
            identification_number: "HYD9abcdefghij".into(),
            identification_start_number: start,
            identification_end_number: start + amount - 1,
            rego_status: HoldingStatus::Active,
            split_from: None,
            created_time: TimeStamp::now(),
        }
    }

    #[test]
    fn split_conserves_amount_and_range() {
        let mut original = holding(5, 11);
        let used = original.split_off_used(20, 3, TimeStamp::now());

        assert_eq!(original.buying_amount + used.buying_amount, 5);
        assert_eq!(original.buying_amount, 2);
        assert_eq!(original.rego_status, HoldingStatus::Active);
        assert_eq!(
            (original.identification_start_number, original.identification_end_number),
            (14, 15)
        );
        assert_eq!(used.rego_status, HoldingStatus::Used);
        assert_eq!(
            (used.identification_start_number, used.identification_end_number),
            (11, 13)
        );
        assert_eq!(used.split_from, Some(10));
    }

    #[test]
    fn confirmation_number_pads_id() {
        let created = TimeStamp::new_with(2024, 5, 7, 12, 0, 0).unwrap();
        assert_eq!(confirmation_number(created, 42), "P-2024-05-07-0042");
        assert_eq!(confirmation_number(created, 123_456), "P-2024-05-07-123456");
    }

    #[test]
    fn seal_detects_tampering() {
        let confirmation = RegoConfirmation {
            rego_confirmation_id: 1,
            consumer_id: 2,
            rego_usage_amount: 3,
            power_usage_amount: 3,
            usage_recognition_period: "2024-01 ~ 2024-03".into(),
            confirmation_number: "P-2024-05-07-0001".into(),
            created_date: TimeStamp::now(),
            seal: String::new(),
        };
        let lines = vec![CertificationIssueRego {
            rego_confirmation_id: 1,
            buying_rego_id: 9,
            usage_application_amount: 3,
        }];
        let digest = seal(&confirmation, &lines).unwrap();
        assert_eq!(digest.len(), 64);

        let mut tampered = lines.clone();
        tampered[0].usage_application_amount = 4;
        assert_ne!(seal(&confirmation, &tampered).unwrap(), digest);
    }

    #[test]
    fn seal_ignores_line_order() {
        let confirmation = RegoConfirmation {
            rego_confirmation_id: 1,
            consumer_id: 2,
            rego_usage_amount: 7,
            power_usage_amount: 7,
            usage_recognition_period: "2024".into(),
            confirmation_number: "P-2024-05-07-0001".into(),
            created_date: TimeStamp::now(),
            seal: String::new(),
        };
        let line = |buying_rego_id, usage_application_amount| CertificationIssueRego {
            rego_confirmation_id: 1,
            buying_rego_id,
            usage_application_amount,
        };
        assert_eq!(
            seal(&confirmation, &[line(12, 5), line(9, 2)]).unwrap(),
            seal(&confirmation, &[line(9, 2), line(12, 5)]).unwrap()
        );
    }
}
