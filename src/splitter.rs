//! Splits metered generation into whole certificate units per stakeholder.
//!
//! A share is `amount * rate / 100`, cut at the third decimal. Its integer part
//! is issued right away, the fraction is added to the stakeholder's carried
//! remainder and only becomes a unit once the remainder passes a whole one.

use crate::error::ValidationError;
use crate::types::{FULL_RATE, MILLI_PER_UNIT, Milli, Stakeholder};

/// `amount (thousandths) * rate (thousandths of a percent)` is in units of 1e-8.
const SHARE_SCALE: u128 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Share {
    pub stakeholder: Stakeholder,
    /// Whole units issued for this event.
    pub allocated: u64,
    pub remainder_before: Milli,
    pub remainder_after: Milli,
    /// Part of the share below a thousandth, dropped by truncation. In 1e-8 units.
    pub truncated: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub owner: Share,
    pub nation: Share,
    pub local_government: Share,
}

impl Split {
    pub fn shares(&self) -> [Share; 3] {
        [self.owner, self.nation, self.local_government]
    }

    pub fn total_allocated(&self) -> u64 {
        self.shares().iter().map(|s| s.allocated).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rates {
    pub owner: Milli,
    pub nation: Milli,
    pub local_government: Milli,
}

impl Rates {
    pub fn validate(&self, plant_id: u64) -> Result<(), ValidationError> {
        let sum = self.owner.raw() as u128
            + self.nation.raw() as u128
            + self.local_government.raw() as u128;
        if sum != FULL_RATE.raw() as u128 {
            let sum = u64::try_from(sum)
                .map(|s| Milli::from_raw(s).to_string())
                .unwrap_or_else(|_| sum.to_string());
            return Err(ValidationError::RatesDoNotSum { plant_id, sum });
        }
        Ok(())
    }
}

/// Carried remainders going into a split, one per stakeholder.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Remainders {
    pub owner: Milli,
    pub nation: Milli,
    pub local_government: Milli,
}

pub fn split(
    plant_id: u64,
    amount: Milli,
    rates: Rates,
    carried: Remainders,
) -> Result<Split, ValidationError> {
    rates.validate(plant_id)?;

    Ok(Split {
        owner: split_share(Stakeholder::Owner, amount, rates.owner, carried.owner),
        nation: split_share(Stakeholder::Nation, amount, rates.nation, carried.nation),
        local_government: split_share(
            Stakeholder::LocalGovernment,
            amount,
            rates.local_government,
            carried.local_government,
        ),
    })
}

pub fn split_share(stakeholder: Stakeholder, amount: Milli, rate: Milli, carried: Milli) -> Share {
    let exact = amount.raw() as u128 * rate.raw() as u128;
    // rate <= 100%, so the share never exceeds the amount and fits in u64
    let share = Milli::from_raw((exact / SHARE_SCALE) as u64);
    let truncated = (exact % SHARE_SCALE) as u64;

    let base = share.units();
    let pooled = carried.raw().saturating_add(share.fraction());
    let (allocated, remainder_after) = if pooled >= MILLI_PER_UNIT {
        (
            base + pooled / MILLI_PER_UNIT,
            Milli::from_raw(pooled % MILLI_PER_UNIT),
        )
    } else {
        (base, Milli::from_raw(pooled))
    };

    Share {
        stakeholder,
        allocated,
        remainder_before: carried,
        remainder_after,
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates(owner: u64, nation: u64, local: u64) -> Rates {
        Rates {
            owner: Milli::from_units(owner),
            nation: Milli::from_units(nation),
            local_government: Milli::from_units(local),
        }
    }

    #[test]
    fn sixty_thirty_ten_from_nothing_carried() {
        let split = split(
            1,
            Milli::parse("100.555").unwrap(),
            rates(60, 30, 10),
            Remainders::default(),
        )
        .unwrap();

        assert_eq!(split.owner.allocated, 60);
        assert_eq!(split.owner.remainder_after, Milli::parse("0.333").unwrap());
        assert_eq!(split.nation.allocated, 30);
        assert_eq!(split.nation.remainder_after, Milli::parse("0.166").unwrap());
        assert_eq!(split.local_government.allocated, 10);
        assert_eq!(
            split.local_government.remainder_after,
            Milli::parse("0.055").unwrap()
        );
        // 30.1665 and 10.0555 each lose half a ten-thousandth
        assert_eq!(split.owner.truncated, 0);
        assert_eq!(split.nation.truncated, 50_000);
        assert_eq!(split.local_government.truncated, 50_000);
    }

    #[test]
    fn remainder_rolls_over_into_a_unit() {
        let share = split_share(
            Stakeholder::Owner,
            Milli::parse("10.7").unwrap(),
            Milli::from_units(100),
            Milli::parse("0.5").unwrap(),
        );
        assert_eq!(share.allocated, 11);
        assert_eq!(share.remainder_after, Milli::parse("0.2").unwrap());
    }

    #[test]
    fn remainder_accumulates_below_a_unit() {
        let share = split_share(
            Stakeholder::Nation,
            Milli::parse("3.25").unwrap(),
            Milli::from_units(100),
            Milli::parse("0.5").unwrap(),
        );
        assert_eq!(share.allocated, 3);
        assert_eq!(share.remainder_after, Milli::parse("0.75").unwrap());
    }

    #[test]
    fn zero_generation_changes_nothing() {
        let carried = Milli::parse("0.42").unwrap();
        let share = split_share(
            Stakeholder::LocalGovernment,
            Milli::ZERO,
            Milli::from_units(10),
            carried,
        );
        assert_eq!(share.allocated, 0);
        assert_eq!(share.remainder_after, carried);
    }

    #[test]
    fn rates_must_sum_to_one_hundred() {
        let truncated_thirds = Rates {
            owner: Milli::parse("33.333").unwrap(),
            nation: Milli::parse("33.333").unwrap(),
            local_government: Milli::parse("33.333").unwrap(),
        };
        let err = split(7, Milli::from_units(10), truncated_thirds, Remainders::default())
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::RatesDoNotSum {
                plant_id: 7,
                sum: "99.999".into()
            }
        );
    }
}
