//! Issuance: metered generation in, REGO groups and units out.
use std::collections::HashSet;

use serde::Serialize;

use crate::error::{ConflictError, RegoError, RegoResult, ValidationError};
use crate::identification;
use crate::records::{CarriedAmount, Plant, PowerGeneration, Rego, RegoGroup};
use crate::registry::Directory;
use crate::service::RegoService;
use crate::splitter::{self, Rates, Remainders, Share};
use crate::store::{Table, Tx, TxResult, abort, pair_key};
use crate::types::{
    IssuedStatus, Milli, PlantId, ProductionPeriod, ProviderId, RegoStatus, Stakeholder,
    TimeStamp, TradingStatus,
};

/// How long an issued certificate stays valid.
pub const VALIDITY_YEARS: u32 = 3;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedShare {
    pub stakeholder: Stakeholder,
    pub provider_id: ProviderId,
    pub issued_generation_amount: u64,
    pub carried_before: Milli,
    pub carried_after: Milli,
    /// `None` when the share produced no whole unit this time.
    pub rego_group_id: Option<u64>,
    pub identification_number: Option<String>,
    #[serde(skip)]
    pub truncated: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedGeneration {
    pub power_generation_id: u64,
    pub plant_id: PlantId,
    pub electricity_production_period: ProductionPeriod,
    pub power_generation_amount: Milli,
    pub shares: Vec<IssuedShare>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceReport {
    pub issued: Vec<IssuedGeneration>,
}

impl IssuanceReport {
    pub fn rego_group_ids(&self) -> Vec<u64> {
        self.issued
            .iter()
            .flat_map(|g| g.shares.iter().filter_map(|s| s.rego_group_id))
            .collect()
    }

    pub fn total_units(&self) -> u64 {
        self.issued
            .iter()
            .flat_map(|g| g.shares.iter())
            .map(|s| s.issued_generation_amount)
            .sum()
    }
}

impl RegoService {
    /// Issue REGO for the given power generation records of `provider_id`.
    ///
    /// All or nothing: a record of another provider, an already issued record or
    /// a plant with rates not summing to 100 aborts the whole request.
    pub fn issue_rego(
        &self,
        provider_id: ProviderId,
        power_generation_ids: &[u64],
    ) -> RegoResult<IssuanceReport> {
        if power_generation_ids.is_empty() {
            return Err(ValidationError::EmptyIssuance.into());
        }
        let mut seen = HashSet::new();
        if let Some(dup) = power_generation_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(ValidationError::DuplicateGeneration(*dup).into());
        }

        let report = self.store.transaction(|tx| {
            let now = TimeStamp::now();
            let mut rng = rand::thread_rng();

            let mut records = Vec::with_capacity(power_generation_ids.len());
            for &id in power_generation_ids {
                let generation: PowerGeneration = tx.require(id)?;
                let plant: Plant = tx.require(generation.plant_id)?;
                if plant.provider_id != provider_id {
                    return abort(RegoError::unauthorized(format!(
                        "power generation record {id} belongs to plant {} of another provider",
                        plant.plant_id
                    )));
                }
                if generation.issued_status == IssuedStatus::Y {
                    return abort(ConflictError::AlreadyIssued(id));
                }
                records.push((generation, plant));
            }
            let units = records
                .iter()
                .try_fold(0u64, |acc, (g, _)| acc.checked_add(g.power_generation_amount.units()))
                .unwrap_or(u64::MAX);
            if units > self.max_issuance_units {
                return abort(ValidationError::TooManyUnits {
                    units,
                    max: self.max_issuance_units,
                });
            }
            // oldest month first so remainders carry forward deterministically
            records.sort_by(|a, b| {
                a.0.electricity_production_period
                    .cmp(&b.0.electricity_production_period)
            });

            let mut issued = Vec::with_capacity(records.len());
            for (mut generation, plant) in records {
                let shares = issue_generation(tx, &mut rng, &plant, &generation, now)?;

                generation.issued_status = IssuedStatus::Y;
                generation.issued_date = Some(now);
                tx.put(&generation)?;

                issued.push(IssuedGeneration {
                    power_generation_id: generation.power_generation_id,
                    plant_id: plant.plant_id,
                    electricity_production_period: generation.electricity_production_period,
                    power_generation_amount: generation.power_generation_amount,
                    shares,
                });
            }
            Ok(IssuanceReport { issued })
        });

        match report {
            Ok(report) => {
                tracing::info!(
                    provider_id,
                    records = report.issued.len(),
                    groups = report.rego_group_ids().len(),
                    units = report.total_units(),
                    "REGO issued"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(provider_id, records = ?power_generation_ids, error = %e, "REGO issuance refused");
                Err(e)
            }
        }
    }
}

fn issue_generation<R: rand::Rng>(
    tx: &Tx<'_>,
    rng: &mut R,
    plant: &Plant,
    generation: &PowerGeneration,
    now: TimeStamp,
) -> TxResult<Vec<IssuedShare>> {
    let holders = [
        (Stakeholder::Owner, plant.provider_id),
        (Stakeholder::Nation, Directory::Nation.resolve(tx)?),
        (
            Stakeholder::LocalGovernment,
            Directory::LocalGovernment {
                region: &plant.region,
            }
            .resolve(tx)?,
        ),
    ];

    let carried = |holder: ProviderId| -> TxResult<Milli> {
        Ok(tx
            .get::<CarriedAmount>(&pair_key(holder, plant.plant_id))?
            .map(|row| row.carried_over_power_gen_amount)
            .unwrap_or_default())
    };
    let remainders = Remainders {
        owner: carried(holders[0].1)?,
        nation: carried(holders[1].1)?,
        local_government: carried(holders[2].1)?,
    };
    let rates = Rates {
        owner: plant.rate_of(Stakeholder::Owner),
        nation: plant.rate_of(Stakeholder::Nation),
        local_government: plant.rate_of(Stakeholder::LocalGovernment),
    };
    let split = splitter::split(
        plant.plant_id,
        generation.power_generation_amount,
        rates,
        remainders,
    )?;

    let mut issued = Vec::with_capacity(3);
    for (share, (_, holder)) in split.shares().into_iter().zip(holders) {
        tx.put(&CarriedAmount {
            provider_id: holder,
            plant_id: plant.plant_id,
            carried_over_power_gen_amount: share.remainder_after,
            updated_time: now,
        })?;

        let group = if share.allocated > 0 {
            Some(create_group(tx, rng, plant, generation, holder, &share, now)?)
        } else {
            None
        };

        issued.push(IssuedShare {
            stakeholder: share.stakeholder,
            provider_id: holder,
            issued_generation_amount: share.allocated,
            carried_before: share.remainder_before,
            carried_after: share.remainder_after,
            rego_group_id: group.as_ref().map(|g| g.rego_group_id),
            identification_number: group.map(|g| g.identification_number),
            truncated: share.truncated,
        });
    }
    Ok(issued)
}

fn create_group<R: rand::Rng>(
    tx: &Tx<'_>,
    rng: &mut R,
    plant: &Plant,
    generation: &PowerGeneration,
    holder: ProviderId,
    share: &Share,
    now: TimeStamp,
) -> TxResult<RegoGroup> {
    let identification_number = identification::allocate(&plant.plant_code, rng, |candidate| {
        tx.lookup(Table::IdentificationNumbers, candidate.as_bytes())
            .map(|hit| hit.is_some())
    })?;

    let group = RegoGroup {
        rego_group_id: tx.next_id()?,
        provider_id: holder,
        plant_id: plant.plant_id,
        power_generation_id: generation.power_generation_id,
        stakeholder: share.stakeholder,
        identification_number,
        status: RegoStatus::Active,
        trading_status: TradingStatus::Before,
        electricity_production_period: generation.electricity_production_period.clone(),
        issued_generation_amount: share.allocated,
        remaining_generation_amount: share.allocated,
        issued_date: now,
        expired_date: now.plus_years(VALIDITY_YEARS),
        transaction_registration_date: None,
    };
    tx.put(&group)?;
    tx.link(
        Table::IdentificationNumbers,
        group.identification_number.as_bytes(),
        group.rego_group_id,
    )?;

    // units can only be written once the group id is known
    for sequence in 1..=share.allocated {
        tx.put(&Rego {
            rego_group_id: group.rego_group_id,
            sequence,
            identification_number: identification::unit_identifier(
                &group.identification_number,
                sequence,
            ),
            consumer_id: None,
        })?;
    }
    Ok(group)
}
