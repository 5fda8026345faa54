//! Persisted rows. One sled tree per record type, values encoded as CBOR.
use serde::Serialize;

use crate::store::{Record, Table, id_key, pair_key};
use crate::types::{
    AccountType, ConsumerId, HoldingStatus, IssuedStatus, Milli, PlantId, ProductionPeriod,
    ProviderId, RegoStatus, Stakeholder, TimeStamp, TradingApplicationStatus, TradingStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    #[n(0)]
    pub provider_id: ProviderId,
    #[n(1)]
    pub account_name: String,
    #[n(2)]
    pub account_type: AccountType,
    #[n(3)]
    pub region: Option<String>,
    #[n(4)]
    pub created_time: TimeStamp,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Consumer {
    #[n(0)]
    pub consumer_id: ConsumerId,
    #[n(1)]
    pub corporation_name: String,
    #[n(2)]
    pub created_time: TimeStamp,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plant {
    #[n(0)]
    pub plant_id: PlantId,
    #[n(1)]
    pub provider_id: ProviderId,
    #[n(2)]
    pub plant_code: String,
    #[n(3)]
    pub plant_name: String,
    #[n(4)]
    pub energy_source: String,
    #[n(5)]
    pub generation_purpose: String,
    #[n(6)]
    pub location: String,
    #[n(7)]
    pub region: String,
    #[n(8)]
    pub inspection_date_before_usage: Option<String>,
    #[n(9)]
    pub self_supply_price: Option<u64>,
    #[n(10)]
    pub nation_supply_price: Option<u64>,
    #[n(11)]
    pub local_government_supply_price: Option<u64>,
    #[n(12)]
    pub self_supply_price_percent: Milli,
    #[n(13)]
    pub nation_supply_price_percent: Milli,
    #[n(14)]
    pub local_gov_supply_price_percent: Milli,
    #[n(15)]
    pub updated_time: TimeStamp,
}

impl Plant {
    pub fn rate_of(&self, stakeholder: Stakeholder) -> Milli {
        match stakeholder {
            Stakeholder::Owner => self.self_supply_price_percent,
            Stakeholder::Nation => self.nation_supply_price_percent,
            Stakeholder::LocalGovernment => self.local_gov_supply_price_percent,
        }
    }

    pub fn rate_sum(&self) -> Option<Milli> {
        self.self_supply_price_percent
            .checked_add(self.nation_supply_price_percent)?
            .checked_add(self.local_gov_supply_price_percent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerGeneration {
    #[n(0)]
    pub power_generation_id: u64,
    #[n(1)]
    pub plant_id: PlantId,
    #[n(2)]
    pub electricity_production_period: ProductionPeriod,
    #[n(3)]
    pub power_generation_amount: Milli,
    #[n(4)]
    pub issued_status: IssuedStatus,
    #[n(5)]
    pub issued_date: Option<TimeStamp>,
    #[n(6)]
    pub info_collection_date: TimeStamp,
}

/// Fractional generation a stakeholder is owed for a plant, carried between issuances.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarriedAmount {
    #[n(0)]
    pub provider_id: ProviderId,
    #[n(1)]
    pub plant_id: PlantId,
    #[n(2)]
    pub carried_over_power_gen_amount: Milli,
    #[n(3)]
    pub updated_time: TimeStamp,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegoGroup {
    #[n(0)]
    pub rego_group_id: u64,
    #[n(1)]
    pub provider_id: ProviderId,
    #[n(2)]
    pub plant_id: PlantId,
    #[n(3)]
    pub power_generation_id: u64,
    #[n(4)]
    pub stakeholder: Stakeholder,
    #[n(5)]
    pub identification_number: String,
    #[n(6)]
    pub status: RegoStatus,
    #[n(7)]
    pub trading_status: TradingStatus,
    #[n(8)]
    pub electricity_production_period: ProductionPeriod,
    #[n(9)]
    pub issued_generation_amount: u64,
    #[n(10)]
    pub remaining_generation_amount: u64,
    #[n(11)]
    pub issued_date: TimeStamp,
    #[n(12)]
    pub expired_date: TimeStamp,
    #[n(13)]
    pub transaction_registration_date: Option<TimeStamp>,
}

/// A single certificate unit of a group.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rego {
    #[n(0)]
    pub rego_group_id: u64,
    #[n(1)]
    pub sequence: u64,
    #[n(2)]
    pub identification_number: String,
    #[n(3)]
    pub consumer_id: Option<ConsumerId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(tag = "role", content = "id", rename_all = "camelCase")]
pub enum Party {
    #[n(0)]
    Provider(#[n(0)] ProviderId),
    #[n(1)]
    Consumer(#[n(0)] ConsumerId),
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WitnessKind {
    #[n(0)]
    Submit,
    #[n(1)]
    #[serde(rename_all = "camelCase")]
    Approve {
        #[n(0)]
        identification_start_number: u64,
        #[n(1)]
        identification_end_number: u64,
    },
    #[n(2)]
    #[serde(rename_all = "camelCase")]
    Reject {
        #[n(0)]
        reason: String,
    },
    #[n(3)]
    Cancel,
}

/// One transition of a trade application, appended and never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeWitness {
    #[n(0)]
    pub actor: Party,
    #[n(1)]
    pub timestamp: TimeStamp,
    #[n(2)]
    pub kind: WitnessKind,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegoTradeInfo {
    #[n(0)]
    pub rego_trade_info_id: u64,
    #[n(1)]
    pub provider_id: ProviderId,
    #[n(2)]
    pub consumer_id: ConsumerId,
    #[n(3)]
    pub plant_id: PlantId,
    #[n(4)]
    pub rego_group_id: u64,
    #[n(5)]
    pub identification_number: String,
    #[n(6)]
    pub trading_application_status: TradingApplicationStatus,
    #[n(7)]
    pub buying_amount: u64,
    #[n(8)]
    pub buying_price: u64,
    #[n(9)]
    pub buying_application_date: TimeStamp,
    #[n(10)]
    pub trade_completed_date: Option<TimeStamp>,
    #[n(11)]
    pub rejected_reason: Option<String>,
    #[n(12)]
    pub identification_start_number: Option<u64>,
    #[n(13)]
    pub identification_end_number: Option<u64>,
    #[n(14)]
    pub witnesses: Vec<TradeWitness>,
}

impl RegoTradeInfo {
    pub fn total_price(&self) -> u64 {
        self.buying_amount.saturating_mul(self.buying_price)
    }
}

/// Certificates a consumer owns out of one group.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyingRego {
    #[n(0)]
    pub buying_rego_id: u64,
    #[n(1)]
    pub rego_group_id: u64,
    #[n(2)]
    pub consumer_id: ConsumerId,
    #[n(3)]
    pub rego_trade_info_id: Option<u64>,
    #[n(4)]
    pub buying_amount: u64,
    #[n(5)]
    pub identification_number: String,
    #[n(6)]
    pub identification_start_number: u64,
    #[n(7)]
    pub identification_end_number: u64,
    #[n(8)]
    pub rego_status: HoldingStatus,
    // holding this row was carved out of by a partial redemption
    #[n(9)]
    pub split_from: Option<u64>,
    #[n(10)]
    pub created_time: TimeStamp,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegoConfirmation {
    #[n(0)]
    pub rego_confirmation_id: u64,
    #[n(1)]
    pub consumer_id: ConsumerId,
    #[n(2)]
    pub rego_usage_amount: u64,
    #[n(3)]
    pub power_usage_amount: u64,
    #[n(4)]
    pub usage_recognition_period: String,
    #[n(5)]
    pub confirmation_number: String,
    #[n(6)]
    pub created_date: TimeStamp,
    #[n(7)]
    pub seal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificationIssueRego {
    #[n(0)]
    pub rego_confirmation_id: u64,
    #[n(1)]
    pub buying_rego_id: u64,
    #[n(2)]
    pub usage_application_amount: u64,
}

impl Record for Provider {
    const TABLE: Table = Table::Providers;
    const ENTITY: &'static str = "Provider";
    fn key(&self) -> Vec<u8> {
        id_key(self.provider_id)
    }
}

impl Record for Consumer {
    const TABLE: Table = Table::Consumers;
    const ENTITY: &'static str = "Consumer";
    fn key(&self) -> Vec<u8> {
        id_key(self.consumer_id)
    }
}

impl Record for Plant {
    const TABLE: Table = Table::Plants;
    const ENTITY: &'static str = "Plant";
    fn key(&self) -> Vec<u8> {
        id_key(self.plant_id)
    }
}

impl Record for PowerGeneration {
    const TABLE: Table = Table::PowerGenerations;
    const ENTITY: &'static str = "Power generation record";
    fn key(&self) -> Vec<u8> {
        id_key(self.power_generation_id)
    }
}

impl Record for CarriedAmount {
    const TABLE: Table = Table::CarriedAmounts;
    const ENTITY: &'static str = "Carried over amount";
    fn key(&self) -> Vec<u8> {
        pair_key(self.provider_id, self.plant_id)
    }
}

impl Record for RegoGroup {
    const TABLE: Table = Table::RegoGroups;
    const ENTITY: &'static str = "REGO group";
    fn key(&self) -> Vec<u8> {
        id_key(self.rego_group_id)
    }
}

impl Record for Rego {
    const TABLE: Table = Table::Regos;
    const ENTITY: &'static str = "REGO";
    fn key(&self) -> Vec<u8> {
        pair_key(self.rego_group_id, self.sequence)
    }
}

impl Record for RegoTradeInfo {
    const TABLE: Table = Table::TradeInfos;
    const ENTITY: &'static str = "REGO trade";
    fn key(&self) -> Vec<u8> {
        id_key(self.rego_trade_info_id)
    }
}

impl Record for BuyingRego {
    const TABLE: Table = Table::BuyingRegos;
    const ENTITY: &'static str = "Buying REGO";
    fn key(&self) -> Vec<u8> {
        id_key(self.buying_rego_id)
    }
}

impl Record for RegoConfirmation {
    const TABLE: Table = Table::Confirmations;
    const ENTITY: &'static str = "REGO confirmation";
    fn key(&self) -> Vec<u8> {
        id_key(self.rego_confirmation_id)
    }
}

impl Record for CertificationIssueRego {
    const TABLE: Table = Table::CertificationIssueRegos;
    const ENTITY: &'static str = "Certification line";
    fn key(&self) -> Vec<u8> {
        pair_key(self.rego_confirmation_id, self.buying_rego_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_witness_log_survives_encoding() {
        let trade = RegoTradeInfo {
            rego_trade_info_id: 4,
            provider_id: 1,
            consumer_id: 2,
            plant_id: 3,
            rego_group_id: 9,
            identification_number: "PLT01abcdefghij".into(),
            trading_application_status: TradingApplicationStatus::Rejected,
            buying_amount: 5,
            buying_price: 70_000,
            buying_application_date: TimeStamp::now(),
            trade_completed_date: Some(TimeStamp::now()),
            rejected_reason: Some("price too low".into()),
            identification_start_number: None,
            identification_end_number: None,
            witnesses: vec![
                TradeWitness {
                    actor: Party::Consumer(2),
                    timestamp: TimeStamp::now(),
                    kind: WitnessKind::Submit,
                },
                TradeWitness {
                    actor: Party::Provider(1),
                    timestamp: TimeStamp::now(),
                    kind: WitnessKind::Reject {
                        reason: "price too low".into(),
                    },
                },
            ],
        };

        let bytes = minicbor::to_vec(&trade).unwrap();
        let decoded: RegoTradeInfo = minicbor::decode(&bytes).unwrap();
        assert_eq!(decoded, trade);
        assert_eq!(decoded.total_price(), 350_000);
    }

    #[test]
    fn unit_keys_sort_by_group_then_sequence() {
        let a = Rego {
            rego_group_id: 1,
            sequence: 2,
            identification_number: String::new(),
            consumer_id: None,
        };
        let b = Rego {
            rego_group_id: 1,
            sequence: 10,
            ..a.clone()
        };
        let c = Rego {
            rego_group_id: 2,
            sequence: 1,
            ..a.clone()
        };
        assert!(a.key() < b.key());
        assert!(b.key() < c.key());
    }
}
