//! Value types shared by records, engines and the http layer.
use std::fmt;

use chrono::{DateTime, Months, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub type ProviderId = u64;
pub type ConsumerId = u64;
pub type PlantId = u64;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    /// Same instant `years` later, clamped to the end of month when needed.
    pub fn plus_years(&self, years: u32) -> Self {
        self.0
            .checked_add_months(Months::new(years * 12))
            .map(Self)
            .unwrap_or(*self)
    }
    pub fn date_string(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl Serialize for TimeStamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

/// Fixed point quantity with three decimals, stored as thousandths.
///
/// Used for metered generation amounts, carried over remainders and supply rates
/// (a rate of `60.000` percent is `Milli(60_000)`). Parsing truncates anything past
/// the third decimal, it never rounds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Milli(u64);

pub const MILLI_PER_UNIT: u64 = 1_000;
/// `100.000` percent.
pub const FULL_RATE: Milli = Milli(100 * MILLI_PER_UNIT);

impl Milli {
    pub const ZERO: Milli = Milli(0);

    pub const fn from_raw(thousandths: u64) -> Self {
        Self(thousandths)
    }
    pub const fn from_units(units: u64) -> Self {
        Self(units * MILLI_PER_UNIT)
    }
    pub const fn raw(self) -> u64 {
        self.0
    }
    /// Integer part.
    pub const fn units(self) -> u64 {
        self.0 / MILLI_PER_UNIT
    }
    /// Fractional part, in thousandths.
    pub const fn fraction(self) -> u64 {
        self.0 % MILLI_PER_UNIT
    }
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
    pub fn checked_add(self, other: Milli) -> Option<Milli> {
        self.0.checked_add(other.0).map(Milli)
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidAmount(input.to_string());
        let text = input.trim();
        let text = text.strip_prefix('+').unwrap_or(text);
        let (whole, frac) = match text.split_once('.') {
            Some((w, f)) => (w, f),
            None => (text, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        // round down at the fourth decimal
        let mut thousandths = 0u64;
        for (i, digit) in frac.chars().take(3).enumerate() {
            let d = u64::from(digit as u8 - b'0');
            thousandths += d * 10u64.pow(2 - i as u32);
        }

        whole
            .checked_mul(MILLI_PER_UNIT)
            .and_then(|w| w.checked_add(thousandths))
            .map(Milli)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Milli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.units(), self.fraction())
    }
}

impl<C> minicbor::Encode<C> for Milli {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.u64(self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Milli {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Milli(d.u64()?))
    }
}

impl Serialize for Milli {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Milli {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MilliVisitor;

        impl serde::de::Visitor<'_> for MilliVisitor {
            type Value = Milli;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a non-negative number with up to three decimals")
            }
            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Milli, E> {
                v.checked_mul(MILLI_PER_UNIT)
                    .map(Milli)
                    .ok_or_else(|| E::custom(ValidationError::InvalidAmount(v.to_string())))
            }
            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Milli, E> {
                u64::try_from(v)
                    .map_err(|_| E::custom(ValidationError::InvalidAmount(v.to_string())))
                    .and_then(|v| self.visit_u64(v))
            }
            fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Milli, E> {
                // shortest round-trip representation, so 100.555 stays "100.555"
                Milli::parse(&v.to_string()).map_err(E::custom)
            }
            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Milli, E> {
                Milli::parse(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(MilliVisitor)
    }
}

/// Month of electricity production, `YYYY-MM`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductionPeriod(String);

impl ProductionPeriod {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();
        let valid = value.len() == 7
            && NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").is_ok();
        if !valid {
            return Err(ValidationError::InvalidPeriod(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProductionPeriod {
    type Error = ValidationError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        ProductionPeriod::parse(&value)
    }
}

impl From<ProductionPeriod> for String {
    fn from(value: ProductionPeriod) -> Self {
        value.0
    }
}

impl fmt::Display for ProductionPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<C> minicbor::Encode<C> for ProductionPeriod {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for ProductionPeriod {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        ProductionPeriod::parse(d.str()?)
            .map_err(|_| minicbor::decode::Error::message("stored production period is malformed"))
    }
}

/// Declares a closed status enum with its wire spelling.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $n:literal => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[n($n)]
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum!(
    /// Lifecycle status of a REGO group.
    RegoStatus {
        Active = 0 => "active",
        Used = 1 => "used",
        Expired = 2 => "expired",
    }
);

wire_enum!(
    /// Market status of a REGO group.
    TradingStatus {
        Before = 0 => "before",
        Trading = 1 => "trading",
        End = 2 => "end",
    }
);

wire_enum!(
    TradingApplicationStatus {
        Pending = 0 => "pending",
        Approve = 1 => "approve",
        Rejected = 2 => "rejected",
        Canceled = 3 => "canceled",
    }
);

wire_enum!(
    /// Status of a consumer holding.
    HoldingStatus {
        Active = 0 => "active",
        Used = 1 => "used",
    }
);

wire_enum!(
    AccountType {
        Generator = 0 => "generator",
        Nation = 1 => "nation",
        LocalGovernment = 2 => "localGovernment",
    }
);

wire_enum!(
    /// Whether REGO has been issued for a power generation record.
    IssuedStatus {
        Y = 0 => "y",
        N = 1 => "n",
    }
);

wire_enum!(
    /// Who a share of a plant's generation belongs to.
    Stakeholder {
        Owner = 0 => "owner",
        Nation = 1 => "nation",
        LocalGovernment = 2 => "localGovernment",
    }
);

impl TradingApplicationStatus {
    /// Past tense used in messages about closed trades.
    pub fn verdict(&self) -> &'static str {
        match self {
            TradingApplicationStatus::Pending => "left pending",
            TradingApplicationStatus::Approve => "approved",
            TradingApplicationStatus::Rejected => "rejected",
            TradingApplicationStatus::Canceled => "canceled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::now();

        let encoding = minicbor::to_vec(original).unwrap();
        let decode: TimeStamp = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn milli_truncates_at_fourth_decimal() {
        assert_eq!(Milli::parse("100.5559").unwrap(), Milli::from_raw(100_555));
        assert_eq!(Milli::parse("0.0009").unwrap(), Milli::ZERO);
        assert_eq!(Milli::parse("7").unwrap(), Milli::from_units(7));
        assert_eq!(Milli::parse(".5").unwrap(), Milli::from_raw(500));
        assert!(Milli::parse("-1").is_err());
        assert!(Milli::parse("1e3").is_err());
        assert!(Milli::parse("").is_err());
    }

    #[test]
    fn milli_reads_json_numbers_and_strings() {
        let a: Milli = serde_json::from_str("100.555").unwrap();
        let b: Milli = serde_json::from_str("\"100.555\"").unwrap();
        let c: Milli = serde_json::from_str("12").unwrap();
        assert_eq!(a, Milli::from_raw(100_555));
        assert_eq!(a, b);
        assert_eq!(c, Milli::from_units(12));
        assert!(serde_json::from_str::<Milli>("-3").is_err());
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"100.555\"");
    }

    #[test]
    fn production_period_is_year_month() {
        assert!(ProductionPeriod::parse("2024-03").is_ok());
        assert!(ProductionPeriod::parse("2024-13").is_err());
        assert!(ProductionPeriod::parse("2024-3").is_err());
        assert!(ProductionPeriod::parse("2024-03-01").is_err());
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&AccountType::LocalGovernment).unwrap(),
            "\"localGovernment\""
        );
        let status: TradingApplicationStatus = serde_json::from_str("\"approve\"").unwrap();
        assert_eq!(status, TradingApplicationStatus::Approve);
        assert!(serde_json::from_str::<RegoStatus>("\"sold\"").is_err());
    }

    #[test]
    fn expiry_is_three_years_out() {
        let issued = TimeStamp::new_with(2024, 2, 29, 0, 0, 0).unwrap();
        assert_eq!(issued.plus_years(3).date_string(), "2027-02-28");
    }
}
