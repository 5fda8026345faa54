//! Shared fixture: a fresh on-disk store with the three kinds of provider,
//! one consumer and one plant split 60/30/10.
#![allow(dead_code)]

use rego_exchange::{
    RegoService,
    records::{Consumer, Plant, Provider},
    registry::{NewPlant, NewProvider},
    types::{AccountType, Milli, ProductionPeriod},
};
use tempfile::TempDir;

pub const REGION: &str = "Jeju";

pub struct Fixture {
    // keeps the database directory alive for the duration of the test
    pub dir: TempDir,
    pub service: RegoService,
    pub generator: Provider,
    pub nation: Provider,
    pub local: Provider,
    pub consumer: Consumer,
    pub plant: Plant,
}

impl Fixture {
    pub fn new() -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let service = RegoService::open(dir.path().join("rego.db"))?;

        let generator = service.register_provider(provider("Hallasan Hydro", AccountType::Generator, None))?;
        let nation = service.register_provider(provider("Energy Agency", AccountType::Nation, None))?;
        let local = service.register_provider(provider(
            "Jeju Province",
            AccountType::LocalGovernment,
            Some(REGION),
        ))?;
        let consumer = service.register_consumer("Green Steel Co")?;
        let plant = service.register_plant(generator.provider_id, plant("HYD9", REGION, (60, 30, 10)))?;

        Ok(Self {
            dir,
            service,
            generator,
            nation,
            local,
            consumer,
            plant,
        })
    }

    /// Record one month of generation at the fixture plant and return its id.
    pub fn generation(&self, period: &str, amount: &str) -> anyhow::Result<u64> {
        let record = self.service.record_power_generation(
            self.plant.plant_id,
            ProductionPeriod::parse(period)?,
            Milli::parse(amount)?,
        )?;
        Ok(record.power_generation_id)
    }

    /// Issue one month and return the owner's group id.
    pub fn owner_group(&self, period: &str, amount: &str) -> anyhow::Result<u64> {
        let id = self.generation(period, amount)?;
        let report = self.service.issue_rego(self.generator.provider_id, &[id])?;
        report.issued[0].shares[0]
            .rego_group_id
            .ok_or_else(|| anyhow::anyhow!("owner share produced no group"))
    }

    /// Issue and list the owner's share of one month.
    pub fn listed_group(&self, period: &str, amount: &str) -> anyhow::Result<u64> {
        let group_id = self.owner_group(period, amount)?;
        self.service.sell_rego(self.generator.provider_id, &[group_id])?;
        Ok(group_id)
    }
}

pub fn provider(name: &str, account_type: AccountType, region: Option<&str>) -> NewProvider {
    NewProvider {
        account_name: name.to_string(),
        account_type,
        region: region.map(str::to_string),
    }
}

pub fn plant(code: &str, region: &str, (owner, nation, local): (u64, u64, u64)) -> NewPlant {
    NewPlant {
        plant_code: code.to_string(),
        plant_name: format!("{code} plant"),
        energy_source: "hydro".to_string(),
        generation_purpose: "commercial".to_string(),
        location: "Seogwipo".to_string(),
        region: region.to_string(),
        inspection_date_before_usage: Some("2021-03-02".to_string()),
        self_supply_price_percent: Milli::from_units(owner),
        nation_supply_price_percent: Milli::from_units(nation),
        local_gov_supply_price_percent: Milli::from_units(local),
    }
}
