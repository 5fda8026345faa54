//! Error taxonomy shared by every engine.

use crate::types::{RegoStatus, TradingApplicationStatus, TradingStatus};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("At least one power generation record must be selected for issuance")]
    EmptyIssuance,
    #[error("Power generation record {0} was selected more than once")]
    DuplicateGeneration(u64),
    #[error("Supply rates of plant {plant_id} sum to {sum} instead of 100.000")]
    RatesDoNotSum { plant_id: u64, sum: String },
    #[error("Supply prices must not all be zero")]
    ZeroSupplyPrice,
    #[error("Amount must be greater than zero")]
    ZeroAmount,
    #[error("Invalid amount '{0}'. Use a non-negative number with up to three decimals")]
    InvalidAmount(String),
    #[error("{units} units exceed the limit of {max} units per issuance")]
    TooManyUnits { units: u64, max: u64 },
    #[error("Supply rate {0} is above 100.000")]
    RateOutOfRange(String),
    #[error("Invalid production period '{0}'. Expected YYYY-MM")]
    InvalidPeriod(String),
    #[error("Plant code '{0}' must be non-empty and alphanumeric")]
    InvalidPlantCode(String),
    #[error("A local government provider must name its region")]
    MissingRegion,
    #[error("A rejection reason is required")]
    MissingReason,
    #[error("A usage recognition period is required")]
    MissingUsagePeriod,
    #[error("Select at least one REGO group")]
    EmptySelection,
    #[error("Usage amount for buying REGO {0} must be greater than zero")]
    ZeroUsage(u64),
    #[error("Could not allocate a unique identification number for plant '{0}'")]
    IdentifierExhausted(String),
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidConfig { key: String, value: String },
}

/// A state machine precondition that does not hold for the current row.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("REGO has already been issued for power generation record {0}")]
    AlreadyIssued(u64),
    #[error("Power generation for plant {plant_id} in {period} has already been recorded")]
    DuplicateGeneration { plant_id: u64, period: String },
    #[error("REGO group {group_id} is {status}/{trading_status} and cannot be listed for sale")]
    NotSellable {
        group_id: u64,
        status: RegoStatus,
        trading_status: TradingStatus,
    },
    #[error("REGO group {group_id} is {status}/{trading_status} and is not open for buying")]
    NotTradable {
        group_id: u64,
        status: RegoStatus,
        trading_status: TradingStatus,
    },
    #[error(
        "REGO group {group_id} has {remaining} units remaining, {requested} were requested"
    )]
    InsufficientQuantity {
        group_id: u64,
        remaining: u64,
        requested: u64,
    },
    #[error("Trade {trade_id} is no longer pending, it was already {}", .status.verdict())]
    TradeClosed {
        trade_id: u64,
        status: TradingApplicationStatus,
    },
    #[error("Buying REGO {0} is already used and cannot be redeemed")]
    HoldingUsed(u64),
    #[error("Buying REGO {buying_rego_id} holds {held} units, {requested} were requested for redemption")]
    InsufficientHolding {
        buying_rego_id: u64,
        held: u64,
        requested: u64,
    },
    #[error("A nation provider is already registered")]
    NationExists,
    #[error("Region {0} already has a local government provider")]
    LocalGovernmentExists(String),
}

#[derive(thiserror::Error, Debug)]
pub enum RegoError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error("Not authorized: {0}")]
    Authorization(String),
    #[error("{entity} {id} does not exist")]
    NotFound { entity: &'static str, id: String },
    #[error("No database session available, retry later")]
    ResourceExhausted,
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("record codec failure: {0}")]
    Codec(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type RegoResult<T> = Result<T, RegoError>;

impl RegoError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        RegoError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        RegoError::Authorization(message.into())
    }

    /// Whether the caller may simply retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegoError::ResourceExhausted)
    }
}

impl From<minicbor::decode::Error> for RegoError {
    fn from(value: minicbor::decode::Error) -> Self {
        RegoError::Codec(value.to_string())
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for RegoError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        RegoError::Codec(value.to_string())
    }
}

impl From<sled::transaction::TransactionError<RegoError>> for RegoError {
    fn from(value: sled::transaction::TransactionError<RegoError>) -> Self {
        match value {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => RegoError::Storage(e),
        }
    }
}
