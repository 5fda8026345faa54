//! Trading state machine for REGO groups and buy applications.
//!
//! A group is sellable only as `active/before`, buyable only as
//! `active/trading` before its expiry date. A trade application leaves
//! `pending` exactly once, to `approve`, `rejected` or `canceled`.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{ConflictError, RegoError, RegoResult, ValidationError};
use crate::records::{
    BuyingRego, Consumer, Party, Rego, RegoGroup, RegoTradeInfo, TradeWitness, WitnessKind,
};
use crate::service::RegoService;
use crate::store::{Record, abort, pair_key};
use crate::types::{
    ConsumerId, HoldingStatus, ProviderId, RegoStatus, TimeStamp, TradingApplicationStatus,
    TradingStatus,
};

impl RegoGroup {
    pub fn is_sellable(&self) -> bool {
        self.status == RegoStatus::Active && self.trading_status == TradingStatus::Before
    }

    pub fn is_open_for_buying(&self, now: TimeStamp) -> bool {
        self.status == RegoStatus::Active
            && self.trading_status == TradingStatus::Trading
            && self.expired_date > now
    }

    pub fn list_for_sale(&mut self, now: TimeStamp) -> Result<(), ConflictError> {
        if !self.is_sellable() {
            return Err(ConflictError::NotSellable {
                group_id: self.rego_group_id,
                status: self.status,
                trading_status: self.trading_status,
            });
        }
        self.trading_status = TradingStatus::Trading;
        self.transaction_registration_date = Some(now);
        Ok(())
    }

    /// Check a group can still deliver `amount` units to a buyer.
    pub fn ensure_can_deliver(&self, amount: u64, now: TimeStamp) -> Result<(), ConflictError> {
        if !self.is_open_for_buying(now) {
            return Err(ConflictError::NotTradable {
                group_id: self.rego_group_id,
                status: self.status,
                trading_status: self.trading_status,
            });
        }
        if self.remaining_generation_amount < amount {
            return Err(ConflictError::InsufficientQuantity {
                group_id: self.rego_group_id,
                remaining: self.remaining_generation_amount,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Take `amount` units out of the group and return the unit range they cover.
    ///
    /// Units are handed out in order, so the range starts right after the ones
    /// already sold. A group that runs empty becomes `used/end`.
    pub fn deliver(&mut self, amount: u64, now: TimeStamp) -> Result<(u64, u64), ConflictError> {
        self.ensure_can_deliver(amount, now)?;
        let sold = self.issued_generation_amount - self.remaining_generation_amount;
        self.remaining_generation_amount -= amount;
        if self.remaining_generation_amount == 0 {
            self.status = RegoStatus::Used;
            self.trading_status = TradingStatus::End;
        }
        Ok((sold + 1, sold + amount))
    }
}

impl RegoTradeInfo {
    pub fn is_pending(&self) -> bool {
        self.trading_application_status == TradingApplicationStatus::Pending
    }

    /// Move out of `pending`, recording who did it.
    pub fn close(
        &mut self,
        to: TradingApplicationStatus,
        actor: Party,
        kind: WitnessKind,
        now: TimeStamp,
    ) -> Result<(), ConflictError> {
        if !self.is_pending() {
            return Err(ConflictError::TradeClosed {
                trade_id: self.rego_trade_info_id,
                status: self.trading_application_status,
            });
        }
        self.trading_application_status = to;
        self.trade_completed_date = Some(now);
        self.witnesses.push(TradeWitness {
            actor,
            timestamp: now,
            kind,
        });
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyRequest {
    pub rego_group_id: u64,
    pub buying_amount: u64,
    pub buying_price: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedTrade {
    pub trade: RegoTradeInfo,
    pub rego_group: RegoGroup,
    pub buying_rego: BuyingRego,
}

fn not_owner(provider_id: ProviderId, what: &str) -> RegoError {
    RegoError::unauthorized(format!("{what} is not owned by provider {provider_id}"))
}

impl RegoService {
    /// Put `active/before` groups of `provider_id` on the market.
    pub fn sell_rego(&self, provider_id: ProviderId, group_ids: &[u64]) -> RegoResult<Vec<RegoGroup>> {
        let mut seen = HashSet::new();
        let ids: Vec<u64> = group_ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if ids.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }

        let listed = self.store.transaction(|tx| {
            let now = TimeStamp::now();
            let mut listed = Vec::with_capacity(ids.len());
            for &id in &ids {
                let mut group: RegoGroup = tx.require(id)?;
                if group.provider_id != provider_id {
                    return abort(not_owner(provider_id, &format!("REGO group {id}")));
                }
                if let Err(e) = group.list_for_sale(now) {
                    return abort(e);
                }
                tx.put(&group)?;
                listed.push(group);
            }
            Ok(listed)
        });

        match listed {
            Ok(listed) => {
                tracing::info!(provider_id, groups = ?ids, "REGO listed for sale");
                Ok(listed)
            }
            Err(e) => {
                tracing::warn!(provider_id, groups = ?ids, error = %e, "REGO listing refused");
                Err(e)
            }
        }
    }

    /// Open a pending buy application against a listed group.
    pub fn request_buying(&self, consumer_id: ConsumerId, request: BuyRequest) -> RegoResult<RegoTradeInfo> {
        if request.buying_amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }

        let trade = self.store.transaction(|tx| {
            let now = TimeStamp::now();
            let _buyer: Consumer = tx.require(consumer_id)?;
            let group: RegoGroup = tx.require(request.rego_group_id)?;
            if let Err(e) = group.ensure_can_deliver(request.buying_amount, now) {
                return abort(e);
            }

            let trade = RegoTradeInfo {
                rego_trade_info_id: tx.next_id()?,
                provider_id: group.provider_id,
                consumer_id,
                plant_id: group.plant_id,
                rego_group_id: group.rego_group_id,
                identification_number: group.identification_number.clone(),
                trading_application_status: TradingApplicationStatus::Pending,
                buying_amount: request.buying_amount,
                buying_price: request.buying_price,
                buying_application_date: now,
                trade_completed_date: None,
                rejected_reason: None,
                identification_start_number: None,
                identification_end_number: None,
                witnesses: vec![TradeWitness {
                    actor: Party::Consumer(consumer_id),
                    timestamp: now,
                    kind: WitnessKind::Submit,
                }],
            };
            tx.put(&trade)?;
            Ok(trade)
        });

        match trade {
            Ok(trade) => {
                tracing::info!(
                    trade_id = trade.rego_trade_info_id,
                    consumer_id,
                    group_id = trade.rego_group_id,
                    amount = trade.buying_amount,
                    "buy application submitted"
                );
                Ok(trade)
            }
            Err(e) => {
                tracing::warn!(consumer_id, group_id = request.rego_group_id, error = %e, "buy application refused");
                Err(e)
            }
        }
    }

    /// Approve a pending trade: move units from the group to the buyer.
    ///
    /// The trade and the group are re-read inside the transaction, so two
    /// concurrent accepts of the same trade, or of trades draining the same
    /// group, serialise and the loser fails with a conflict.
    pub fn accept_trade(&self, provider_id: ProviderId, trade_id: u64) -> RegoResult<AcceptedTrade> {
        let accepted = self.store.transaction(|tx| {
            let now = TimeStamp::now();
            let mut trade: RegoTradeInfo = tx.require(trade_id)?;
            if trade.provider_id != provider_id {
                return abort(not_owner(provider_id, &format!("REGO trade {trade_id}")));
            }
            if !trade.is_pending() {
                return abort(ConflictError::TradeClosed {
                    trade_id,
                    status: trade.trading_application_status,
                });
            }

            let mut group: RegoGroup = tx.require(trade.rego_group_id)?;
            let (start, end) = match group.deliver(trade.buying_amount, now) {
                Ok(range) => range,
                Err(e) => return abort(e),
            };
            if let Err(e) = trade.close(
                TradingApplicationStatus::Approve,
                Party::Provider(provider_id),
                WitnessKind::Approve {
                    identification_start_number: start,
                    identification_end_number: end,
                },
                now,
            ) {
                return abort(e);
            }
            trade.identification_start_number = Some(start);
            trade.identification_end_number = Some(end);

            let holding = BuyingRego {
                buying_rego_id: tx.next_id()?,
                rego_group_id: group.rego_group_id,
                consumer_id: trade.consumer_id,
                rego_trade_info_id: Some(trade_id),
                buying_amount: trade.buying_amount,
                identification_number: group.identification_number.clone(),
                identification_start_number: start,
                identification_end_number: end,
                rego_status: HoldingStatus::Active,
                split_from: None,
                created_time: now,
            };

            for sequence in start..=end {
                let key = pair_key(group.rego_group_id, sequence);
                let Some(mut unit) = tx.get::<Rego>(&key)? else {
                    return abort(RegoError::Internal(format!(
                        "{} {} of group {} is missing",
                        Rego::ENTITY,
                        sequence,
                        group.rego_group_id
                    )));
                };
                unit.consumer_id = Some(trade.consumer_id);
                tx.put(&unit)?;
            }

            tx.put(&group)?;
            tx.put(&trade)?;
            tx.put(&holding)?;
            Ok(AcceptedTrade {
                trade,
                rego_group: group,
                buying_rego: holding,
            })
        });

        match accepted {
            Ok(accepted) => {
                tracing::info!(
                    trade_id,
                    provider_id,
                    group_id = accepted.rego_group.rego_group_id,
                    remaining = accepted.rego_group.remaining_generation_amount,
                    buying_rego_id = accepted.buying_rego.buying_rego_id,
                    "REGO trade approved"
                );
                Ok(accepted)
            }
            Err(e) => {
                tracing::warn!(trade_id, provider_id, error = %e, "REGO trade approval refused");
                Err(e)
            }
        }
    }

    pub fn refuse_trade(&self, provider_id: ProviderId, trade_id: u64, reason: &str) -> RegoResult<RegoTradeInfo> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::MissingReason.into());
        }

        let trade = self.store.transaction(|tx| {
            let now = TimeStamp::now();
            let mut trade: RegoTradeInfo = tx.require(trade_id)?;
            if trade.provider_id != provider_id {
                return abort(not_owner(provider_id, &format!("REGO trade {trade_id}")));
            }
            if let Err(e) = trade.close(
                TradingApplicationStatus::Rejected,
                Party::Provider(provider_id),
                WitnessKind::Reject {
                    reason: reason.to_string(),
                },
                now,
            ) {
                return abort(e);
            }
            trade.rejected_reason = Some(reason.to_string());
            tx.put(&trade)?;
            Ok(trade)
        });

        match trade {
            Ok(trade) => {
                tracing::info!(trade_id, provider_id, "REGO trade rejected");
                Ok(trade)
            }
            Err(e) => {
                tracing::warn!(trade_id, provider_id, error = %e, "REGO trade rejection refused");
                Err(e)
            }
        }
    }

    /// Withdraw a pending buy application. Only the applicant may do so.
    pub fn cancel_trade(&self, consumer_id: ConsumerId, trade_id: u64) -> RegoResult<RegoTradeInfo> {
        let trade = self.store.transaction(|tx| {
            let mut trade: RegoTradeInfo = tx.require(trade_id)?;
            if trade.consumer_id != consumer_id {
                return abort(RegoError::unauthorized(format!(
                    "REGO trade {trade_id} was not requested by consumer {consumer_id}"
                )));
            }
            if let Err(e) = trade.close(
                TradingApplicationStatus::Canceled,
                Party::Consumer(consumer_id),
                WitnessKind::Cancel,
                TimeStamp::now(),
            ) {
                return abort(e);
            }
            tx.put(&trade)?;
            Ok(trade)
        });

        match trade {
            Ok(trade) => {
                tracing::info!(trade_id, consumer_id, "REGO trade canceled");
                Ok(trade)
            }
            Err(e) => {
                tracing::warn!(trade_id, consumer_id, error = %e, "REGO trade cancellation refused");
                Err(e)
            }
        }
    }

    /// Mark every active group past its expiry date as expired.
    pub fn expire_due(&self, now: TimeStamp) -> RegoResult<Vec<u64>> {
        let candidates: Vec<u64> = self
            .store
            .scan::<RegoGroup>()?
            .into_iter()
            .filter(|g| g.status == RegoStatus::Active && g.expired_date <= now)
            .map(|g| g.rego_group_id)
            .collect();
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let expired = self.store.transaction(|tx| {
            let mut expired = Vec::with_capacity(candidates.len());
            for &id in &candidates {
                let mut group: RegoGroup = tx.require(id)?;
                // re-check, a trade may have used it up in the meantime
                if group.status == RegoStatus::Active && group.expired_date <= now {
                    group.status = RegoStatus::Expired;
                    tx.put(&group)?;
                    expired.push(id);
                }
            }
            Ok(expired)
        })?;

        tracing::info!(count = expired.len(), "REGO groups expired");
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProductionPeriod, Stakeholder};

    fn group(issued: u64, remaining: u64) -> RegoGroup {
        let issued_date = TimeStamp::now();
        RegoGroup {
            rego_group_id: 1,
            provider_id: 2,
            plant_id: 3,
            power_generation_id: 4,
            stakeholder: Stakeholder::Owner,
            identification_number: "SOL1abcdefghij".into(),
            status: RegoStatus::Active,
            trading_status: TradingStatus::Trading,
            electricity_production_period: ProductionPeriod::parse("2024-01").unwrap(),
            issued_generation_amount: issued,
            remaining_generation_amount: remaining,
            issued_date,
            expired_date: issued_date.plus_years(3),
            transaction_registration_date: Some(issued_date),
        }
    }

    #[test]
    fn delivering_everything_ends_the_group() {
        let mut g = group(5, 5);
        assert_eq!(g.deliver(5, TimeStamp::now()), Ok((1, 5)));
        assert_eq!(g.remaining_generation_amount, 0);
        assert_eq!((g.status, g.trading_status), (RegoStatus::Used, TradingStatus::End));
    }

    #[test]
    fn partial_delivery_keeps_trading() {
        let mut g = group(5, 5);
        assert_eq!(g.deliver(3, TimeStamp::now()), Ok((1, 3)));
        assert_eq!(g.remaining_generation_amount, 2);
        assert_eq!((g.status, g.trading_status), (RegoStatus::Active, TradingStatus::Trading));
        // next buyer continues after the units already sold
        assert_eq!(g.deliver(2, TimeStamp::now()), Ok((4, 5)));
    }

    #[test]
    fn overselling_is_a_distinct_conflict() {
        let mut g = group(5, 2);
        assert_eq!(
            g.deliver(3, TimeStamp::now()),
            Err(ConflictError::InsufficientQuantity {
                group_id: 1,
                remaining: 2,
                requested: 3
            })
        );
        g.trading_status = TradingStatus::Before;
        assert!(matches!(
            g.deliver(1, TimeStamp::now()),
            Err(ConflictError::NotTradable { .. })
        ));
    }

    #[test]
    fn expired_groups_cannot_be_bought() {
        let g = group(5, 5);
        let later = g.expired_date.plus_years(1);
        assert!(!g.is_open_for_buying(later));
    }

    #[test]
    fn listing_requires_before_state() {
        let mut g = group(5, 5);
        g.trading_status = TradingStatus::Before;
        assert!(g.list_for_sale(TimeStamp::now()).is_ok());
        assert_eq!(g.trading_status, TradingStatus::Trading);
        assert!(matches!(
            g.list_for_sale(TimeStamp::now()),
            Err(ConflictError::NotSellable { .. })
        ));
    }

    #[test]
    fn closed_trade_never_reopens() {
        let mut trade = RegoTradeInfo {
            rego_trade_info_id: 9,
            provider_id: 2,
            consumer_id: 5,
            plant_id: 3,
            rego_group_id: 1,
            identification_number: "SOL1abcdefghij".into(),
            trading_application_status: TradingApplicationStatus::Pending,
            buying_amount: 1,
            buying_price: 1,
            buying_application_date: TimeStamp::now(),
            trade_completed_date: None,
            rejected_reason: None,
            identification_start_number: None,
            identification_end_number: None,
            witnesses: vec![],
        };
        trade
            .close(
                TradingApplicationStatus::Canceled,
                Party::Consumer(5),
                WitnessKind::Cancel,
                TimeStamp::now(),
            )
            .unwrap();
        let again = trade.close(
            TradingApplicationStatus::Approve,
            Party::Provider(2),
            WitnessKind::Approve {
                identification_start_number: 1,
                identification_end_number: 1,
            },
            TimeStamp::now(),
        );
        assert_eq!(
            again,
            Err(ConflictError::TradeClosed {
                trade_id: 9,
                status: TradingApplicationStatus::Canceled
            })
        );
        assert_eq!(trade.witnesses.len(), 1);
    }
}
