//! Provisioning of the parties, plants and metered generation the engines work on.
use serde::Deserialize;

use crate::error::{ConflictError, RegoError, RegoResult, ValidationError};
use crate::identification::is_valid_plant_code;
use crate::records::{Consumer, Plant, PowerGeneration, Provider};
use crate::service::RegoService;
use crate::store::{Table, Tx, TxResult, abort, id_key};
use crate::types::{
    AccountType, FULL_RATE, IssuedStatus, Milli, PlantId, ProductionPeriod, ProviderId, TimeStamp,
};

/// Well-known providers that receive a share of every plant.
#[derive(Debug, Clone, Copy)]
pub enum Directory<'a> {
    Nation,
    LocalGovernment { region: &'a str },
}

impl Directory<'_> {
    pub fn key(&self) -> Vec<u8> {
        match self {
            Directory::Nation => b"nation".to_vec(),
            Directory::LocalGovernment { region } => format!("region:{region}").into_bytes(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Directory::Nation => "of account type nation".to_string(),
            Directory::LocalGovernment { region } => {
                format!("of account type localGovernment for region {region}")
            }
        }
    }

    /// Resolve inside a transaction, aborting when nobody is registered.
    pub fn resolve(&self, tx: &Tx<'_>) -> TxResult<ProviderId> {
        match tx.lookup(Table::ProviderDirectory, &self.key())? {
            Some(id) => Ok(id),
            None => abort(RegoError::not_found("Provider", self.describe())),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProvider {
    pub account_name: String,
    pub account_type: AccountType,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlant {
    pub plant_code: String,
    pub plant_name: String,
    pub energy_source: String,
    pub generation_purpose: String,
    pub location: String,
    pub region: String,
    pub inspection_date_before_usage: Option<String>,
    pub self_supply_price_percent: Milli,
    pub nation_supply_price_percent: Milli,
    pub local_gov_supply_price_percent: Milli,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplyPrices {
    pub self_supply_price: u64,
    pub nation_supply_price: u64,
    pub local_government_supply_price: u64,
}

impl SupplyPrices {
    /// Each price as a percentage of the total, cut at the third decimal.
    pub fn rates(&self) -> Result<[Milli; 3], ValidationError> {
        let prices = [
            self.self_supply_price,
            self.nation_supply_price,
            self.local_government_supply_price,
        ];
        let total: u128 = prices.iter().map(|p| *p as u128).sum();
        if total == 0 {
            return Err(ValidationError::ZeroSupplyPrice);
        }
        Ok(prices.map(|p| Milli::from_raw((p as u128 * FULL_RATE.raw() as u128 / total) as u64)))
    }
}

impl RegoService {
    pub fn register_provider(&self, new: NewProvider) -> RegoResult<Provider> {
        let region = new
            .region
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        if new.account_type == AccountType::LocalGovernment && region.is_none() {
            return Err(ValidationError::MissingRegion.into());
        }

        let provider = self.store.transaction(|tx| {
            let directory = match new.account_type {
                AccountType::Generator => None,
                AccountType::Nation => Some(Directory::Nation),
                AccountType::LocalGovernment => region
                    .as_deref()
                    .map(|region| Directory::LocalGovernment { region }),
            };
            if let Some(entry) = directory {
                if tx.lookup(Table::ProviderDirectory, &entry.key())?.is_some() {
                    return match entry {
                        Directory::Nation => abort(ConflictError::NationExists),
                        Directory::LocalGovernment { region } => {
                            abort(ConflictError::LocalGovernmentExists(region.to_string()))
                        }
                    };
                }
            }

            let provider = Provider {
                provider_id: tx.next_id()?,
                account_name: new.account_name.trim().to_string(),
                account_type: new.account_type,
                region: region.clone(),
                created_time: TimeStamp::now(),
            };
            tx.put(&provider)?;
            if let Some(entry) = directory {
                tx.link(Table::ProviderDirectory, &entry.key(), provider.provider_id)?;
            }
            Ok(provider)
        })?;

        tracing::info!(
            provider_id = provider.provider_id,
            account_type = %provider.account_type,
            "provider registered"
        );
        Ok(provider)
    }

    pub fn register_consumer(&self, corporation_name: &str) -> RegoResult<Consumer> {
        let consumer = self.store.transaction(|tx| {
            let consumer = Consumer {
                consumer_id: tx.next_id()?,
                corporation_name: corporation_name.trim().to_string(),
                created_time: TimeStamp::now(),
            };
            tx.put(&consumer)?;
            Ok(consumer)
        })?;
        tracing::info!(consumer_id = consumer.consumer_id, "consumer registered");
        Ok(consumer)
    }

    pub fn register_plant(&self, provider_id: ProviderId, new: NewPlant) -> RegoResult<Plant> {
        if !is_valid_plant_code(&new.plant_code) {
            return Err(ValidationError::InvalidPlantCode(new.plant_code.clone()).into());
        }
        for rate in [
            new.self_supply_price_percent,
            new.nation_supply_price_percent,
            new.local_gov_supply_price_percent,
        ] {
            if rate > FULL_RATE {
                return Err(ValidationError::RateOutOfRange(rate.to_string()).into());
            }
        }

        let plant = self.store.transaction(|tx| {
            let owner: Provider = tx.require(provider_id)?;
            if owner.account_type != AccountType::Generator {
                return abort(RegoError::unauthorized(format!(
                    "provider {provider_id} is a {} account and cannot own plants",
                    owner.account_type
                )));
            }
            let plant = Plant {
                plant_id: tx.next_id()?,
                provider_id,
                plant_code: new.plant_code.clone(),
                plant_name: new.plant_name.clone(),
                energy_source: new.energy_source.clone(),
                generation_purpose: new.generation_purpose.clone(),
                location: new.location.clone(),
                region: new.region.trim().to_string(),
                inspection_date_before_usage: new.inspection_date_before_usage.clone(),
                self_supply_price: None,
                nation_supply_price: None,
                local_government_supply_price: None,
                self_supply_price_percent: new.self_supply_price_percent,
                nation_supply_price_percent: new.nation_supply_price_percent,
                local_gov_supply_price_percent: new.local_gov_supply_price_percent,
                updated_time: TimeStamp::now(),
            };
            tx.put(&plant)?;
            Ok(plant)
        })?;

        tracing::info!(plant_id = plant.plant_id, provider_id, "plant registered");
        Ok(plant)
    }

    /// Store new supply prices and derive the stakeholder rates from them.
    ///
    /// Rates are truncated, so they can end up summing to slightly less than
    /// 100 (1/1/1 gives 99.999). Issuance refuses such a plant until it is edited.
    pub fn update_plant_supply_prices(
        &self,
        provider_id: ProviderId,
        plant_id: PlantId,
        prices: SupplyPrices,
    ) -> RegoResult<Plant> {
        let [owner, nation, local] = prices.rates()?;

        let plant = self.store.transaction(|tx| {
            let mut plant: Plant = tx.require(plant_id)?;
            if plant.provider_id != provider_id {
                return abort(RegoError::unauthorized(format!(
                    "plant {plant_id} is not owned by provider {provider_id}"
                )));
            }
            plant.self_supply_price = Some(prices.self_supply_price);
            plant.nation_supply_price = Some(prices.nation_supply_price);
            plant.local_government_supply_price = Some(prices.local_government_supply_price);
            plant.self_supply_price_percent = owner;
            plant.nation_supply_price_percent = nation;
            plant.local_gov_supply_price_percent = local;
            plant.updated_time = TimeStamp::now();
            tx.put(&plant)?;
            Ok(plant)
        })?;

        if plant.rate_sum() != Some(FULL_RATE) {
            tracing::warn!(plant_id, "supply rates no longer sum to 100, issuance will be refused");
        }
        Ok(plant)
    }

    /// Ingest one metered month of generation for a plant.
    pub fn record_power_generation(
        &self,
        plant_id: PlantId,
        period: ProductionPeriod,
        amount: Milli,
    ) -> RegoResult<PowerGeneration> {
        let mut index_key = id_key(plant_id);
        index_key.extend_from_slice(period.as_str().as_bytes());

        if amount.units() > self.max_issuance_units {
            return Err(ValidationError::TooManyUnits {
                units: amount.units(),
                max: self.max_issuance_units,
            }
            .into());
        }

        let record = self.store.transaction(|tx| {
            let _plant: Plant = tx.require(plant_id)?;
            if tx.lookup(Table::GenerationPeriods, &index_key)?.is_some() {
                return abort(ConflictError::DuplicateGeneration {
                    plant_id,
                    period: period.to_string(),
                });
            }
            let record = PowerGeneration {
                power_generation_id: tx.next_id()?,
                plant_id,
                electricity_production_period: period.clone(),
                power_generation_amount: amount,
                issued_status: IssuedStatus::N,
                issued_date: None,
                info_collection_date: TimeStamp::now(),
            };
            tx.put(&record)?;
            tx.link(Table::GenerationPeriods, &index_key, record.power_generation_id)?;
            Ok(record)
        })?;

        tracing::debug!(
            power_generation_id = record.power_generation_id,
            plant_id,
            period = %record.electricity_production_period,
            "power generation recorded"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_follow_prices() {
        let prices = SupplyPrices {
            self_supply_price: 60,
            nation_supply_price: 30,
            local_government_supply_price: 10,
        };
        assert_eq!(
            prices.rates().unwrap(),
            [Milli::from_units(60), Milli::from_units(30), Milli::from_units(10)]
        );
    }

    #[test]
    fn equal_prices_truncate_below_one_hundred() {
        let prices = SupplyPrices {
            self_supply_price: 1,
            nation_supply_price: 1,
            local_government_supply_price: 1,
        };
        let rates = prices.rates().unwrap();
        assert!(rates.iter().all(|r| *r == Milli::from_raw(33_333)));
    }

    #[test]
    fn zero_prices_are_rejected() {
        let prices = SupplyPrices {
            self_supply_price: 0,
            nation_supply_price: 0,
            local_government_supply_price: 0,
        };
        assert_eq!(prices.rates(), Err(ValidationError::ZeroSupplyPrice));
    }
}
