//! Read paths. Nothing here writes.
use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::confirmation::ConfirmationReceipt;
use crate::error::{RegoError, RegoResult};
use crate::records::{
    BuyingRego, CarriedAmount, CertificationIssueRego, Plant, PowerGeneration, RegoConfirmation,
    RegoGroup, RegoTradeInfo,
};
use crate::registry::Directory;
use crate::service::RegoService;
use crate::splitter;
use crate::store::{Table, id_key, pair_key};
use crate::types::{
    ConsumerId, IssuedStatus, Milli, PlantId, ProductionPeriod, ProviderId, RegoStatus,
    Stakeholder, TradingApplicationStatus, TradingStatus,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupFilter {
    pub provider_id: Option<ProviderId>,
    pub plant_id: Option<PlantId>,
    pub electricity_production_period: Option<ProductionPeriod>,
    pub status: Option<RegoStatus>,
    pub trading_status: Option<TradingStatus>,
}

impl GroupFilter {
    fn matches(&self, group: &RegoGroup) -> bool {
        self.provider_id.is_none_or(|id| group.provider_id == id)
            && self.plant_id.is_none_or(|id| group.plant_id == id)
            && self
                .electricity_production_period
                .as_ref()
                .is_none_or(|p| group.electricity_production_period == *p)
            && self.status.is_none_or(|s| group.status == s)
            && self.trading_status.is_none_or(|s| group.trading_status == s)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeFilter {
    pub provider_id: Option<ProviderId>,
    pub consumer_id: Option<ConsumerId>,
    pub electricity_production_period: Option<ProductionPeriod>,
    pub trading_application_status: Option<TradingApplicationStatus>,
}

/// Generation record with what each stakeholder would get out of it alone.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationView {
    #[serde(flatten)]
    pub record: PowerGeneration,
    pub self_issuable: u64,
    pub nation_issuable: u64,
    pub local_government_issuable: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarriedOver {
    pub plant_id: PlantId,
    pub self_carried_over_power_gen_amount: Milli,
    pub nation_carried_over_power_gen_amount: Milli,
    pub local_government_carried_over_power_gen_amount: Milli,
}

impl RegoService {
    pub fn list_rego_groups(&self, filter: &GroupFilter) -> RegoResult<Vec<RegoGroup>> {
        let mut groups: Vec<RegoGroup> = self
            .store
            .scan::<RegoGroup>()?
            .into_iter()
            .filter(|g| filter.matches(g))
            .collect();
        groups.sort_by_key(|g| Reverse(g.rego_group_id));
        Ok(groups)
    }

    /// Trades newest first: by completion date when asking for approved
    /// trades, by application date otherwise.
    pub fn list_trades(&self, filter: &TradeFilter) -> RegoResult<Vec<RegoTradeInfo>> {
        let mut trades = Vec::new();
        for trade in self.store.scan::<RegoTradeInfo>()? {
            if filter.provider_id.is_some_and(|id| trade.provider_id != id)
                || filter.consumer_id.is_some_and(|id| trade.consumer_id != id)
                || filter
                    .trading_application_status
                    .is_some_and(|s| trade.trading_application_status != s)
            {
                continue;
            }
            if let Some(period) = &filter.electricity_production_period {
                let group: Option<RegoGroup> = self.store.fetch(&id_key(trade.rego_group_id))?;
                if group.is_none_or(|g| g.electricity_production_period != *period) {
                    continue;
                }
            }
            trades.push(trade);
        }

        if filter.trading_application_status == Some(TradingApplicationStatus::Approve) {
            trades.sort_by_key(|t| Reverse((t.trade_completed_date, t.rego_trade_info_id)));
        } else {
            trades.sort_by_key(|t| Reverse((t.buying_application_date, t.rego_trade_info_id)));
        }
        Ok(trades)
    }

    pub fn list_buying_regos(&self, consumer_id: ConsumerId) -> RegoResult<Vec<BuyingRego>> {
        let mut holdings: Vec<BuyingRego> = self
            .store
            .scan::<BuyingRego>()?
            .into_iter()
            .filter(|h| h.consumer_id == consumer_id)
            .collect();
        holdings.sort_by_key(|h| Reverse(h.buying_rego_id));
        Ok(holdings)
    }

    pub fn list_confirmations(&self, consumer_id: ConsumerId) -> RegoResult<Vec<RegoConfirmation>> {
        let mut confirmations: Vec<RegoConfirmation> = self
            .store
            .scan::<RegoConfirmation>()?
            .into_iter()
            .filter(|c| c.consumer_id == consumer_id)
            .collect();
        confirmations.sort_by_key(|c| Reverse((c.created_date, c.rego_confirmation_id)));
        Ok(confirmations)
    }

    /// A confirmation with its line items and the holdings they point at.
    pub fn confirmation_detail(
        &self,
        consumer_id: ConsumerId,
        confirmation_id: u64,
    ) -> RegoResult<ConfirmationReceipt> {
        let confirmation: RegoConfirmation = self
            .store
            .fetch(&id_key(confirmation_id))?
            .ok_or_else(|| RegoError::not_found("REGO confirmation", confirmation_id))?;
        if confirmation.consumer_id != consumer_id {
            return Err(RegoError::unauthorized(format!(
                "REGO confirmation {confirmation_id} belongs to another consumer"
            )));
        }
        let lines: Vec<CertificationIssueRego> =
            self.store.scan_prefix(&id_key(confirmation_id))?;
        let mut holdings = Vec::with_capacity(lines.len());
        for line in &lines {
            if let Some(holding) = self.store.fetch::<BuyingRego>(&id_key(line.buying_rego_id))? {
                holdings.push(holding);
            }
        }
        Ok(ConfirmationReceipt {
            confirmation,
            lines,
            holdings,
        })
    }

    /// Remainders the owner, the nation and the region carry for one plant.
    pub fn carried_over(&self, provider_id: ProviderId, plant_id: PlantId) -> RegoResult<CarriedOver> {
        let plant: Plant = self
            .store
            .fetch(&id_key(plant_id))?
            .ok_or_else(|| RegoError::not_found("Plant", plant_id))?;
        if plant.provider_id != provider_id {
            return Err(RegoError::unauthorized(format!(
                "plant {plant_id} is not owned by provider {provider_id}"
            )));
        }

        let carried = |holder: Option<ProviderId>| -> RegoResult<Milli> {
            let Some(holder) = holder else {
                return Ok(Milli::ZERO);
            };
            Ok(self
                .store
                .fetch::<CarriedAmount>(&pair_key(holder, plant_id))?
                .map(|row| row.carried_over_power_gen_amount)
                .unwrap_or_default())
        };
        let nation = self
            .store
            .lookup(Table::ProviderDirectory, &Directory::Nation.key())?;
        let local = self.store.lookup(
            Table::ProviderDirectory,
            &Directory::LocalGovernment {
                region: &plant.region,
            }
            .key(),
        )?;

        Ok(CarriedOver {
            plant_id,
            self_carried_over_power_gen_amount: carried(Some(provider_id))?,
            nation_carried_over_power_gen_amount: carried(nation)?,
            local_government_carried_over_power_gen_amount: carried(local)?,
        })
    }

    /// Generation records of the provider's plants, optionally only unissued ones.
    pub fn list_power_generations(
        &self,
        provider_id: ProviderId,
        issued_status: Option<IssuedStatus>,
    ) -> RegoResult<Vec<GenerationView>> {
        let plants: Vec<Plant> = self
            .store
            .scan::<Plant>()?
            .into_iter()
            .filter(|p| p.provider_id == provider_id)
            .collect();

        let mut views = Vec::new();
        for record in self.store.scan::<PowerGeneration>()? {
            let Some(plant) = plants.iter().find(|p| p.plant_id == record.plant_id) else {
                continue;
            };
            if issued_status.is_some_and(|s| record.issued_status != s) {
                continue;
            }
            let issuable = |who: Stakeholder| {
                splitter::split_share(who, record.power_generation_amount, plant.rate_of(who), Milli::ZERO)
                    .allocated
            };
            views.push(GenerationView {
                self_issuable: issuable(Stakeholder::Owner),
                nation_issuable: issuable(Stakeholder::Nation),
                local_government_issuable: issuable(Stakeholder::LocalGovernment),
                record,
            });
        }
        views.sort_by(|a, b| {
            b.record
                .electricity_production_period
                .cmp(&a.record.electricity_production_period)
                .then(a.record.plant_id.cmp(&b.record.plant_id))
        });
        Ok(views)
    }
}
