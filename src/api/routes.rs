//! Route handlers. Each one pulls the caller out of the request, runs one
//! engine call on the blocking pool and wraps the outcome in the envelope.
use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::auth::{ConsumerCaller, ProviderCaller};
use crate::api::dto::{
    ApiResponse, Body, CarriedOverQuery, ExpireRequest, IssueConfirmationRequest,
    IssueRegoRequest, NewConsumerRequest, NewPowerGenerationRequest, Params,
    PowerGenerationQuery, RefuseTradeRequest, SellRegoRequest, TradeRequest,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::confirmation::ConfirmationReceipt;
use crate::error::RegoError;
use crate::issuance::IssuanceReport;
use crate::queries::{CarriedOver, GenerationView, GroupFilter, TradeFilter};
use crate::records::{
    BuyingRego, Consumer, Plant, PowerGeneration, Provider, RegoConfirmation, RegoGroup,
    RegoTradeInfo,
};
use crate::registry::{NewPlant, NewProvider, SupplyPrices};
use crate::store::id_key;
use crate::trading::{AcceptedTrade, BuyRequest};
use crate::types::{PlantId, TimeStamp};

type Reply<T> = ApiResult<Json<ApiResponse<T>>>;

pub async fn health() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::ok("OK"))
}

pub async fn register_provider(
    State(state): State<AppState>,
    Body(body): Body<NewProvider>,
) -> Reply<Provider> {
    let provider = state.run(move |svc| svc.register_provider(body)).await?;
    Ok(Json(ApiResponse::ok(provider)))
}

pub async fn register_consumer(
    State(state): State<AppState>,
    Body(body): Body<NewConsumerRequest>,
) -> Reply<Consumer> {
    let consumer = state
        .run(move |svc| svc.register_consumer(&body.corporation_name))
        .await?;
    Ok(Json(ApiResponse::ok(consumer)))
}

pub async fn register_plant(
    State(state): State<AppState>,
    ProviderCaller(provider_id): ProviderCaller,
    Body(body): Body<NewPlant>,
) -> Reply<Plant> {
    let plant = state
        .run(move |svc| svc.register_plant(provider_id, body))
        .await?;
    Ok(Json(ApiResponse::ok(plant)))
}

pub async fn update_plant(
    State(state): State<AppState>,
    ProviderCaller(provider_id): ProviderCaller,
    Path(plant_id): Path<PlantId>,
    Body(prices): Body<SupplyPrices>,
) -> Reply<Plant> {
    let plant = state
        .run(move |svc| svc.update_plant_supply_prices(provider_id, plant_id, prices))
        .await?;
    Ok(Json(ApiResponse::ok_with(plant, "Supply prices updated")))
}

pub async fn record_power_generation(
    State(state): State<AppState>,
    ProviderCaller(provider_id): ProviderCaller,
    Body(body): Body<NewPowerGenerationRequest>,
) -> Reply<PowerGeneration> {
    let record = state
        .run(move |svc| {
            let plant: Plant = svc
                .store()
                .fetch(&id_key(body.plant_id))?
                .ok_or_else(|| RegoError::not_found("Plant", body.plant_id))?;
            if plant.provider_id != provider_id {
                return Err(RegoError::unauthorized(format!(
                    "plant {} is not owned by provider {provider_id}",
                    body.plant_id
                )));
            }
            svc.record_power_generation(
                body.plant_id,
                body.electricity_production_period,
                body.power_generation_amount,
            )
        })
        .await?;
    Ok(Json(ApiResponse::ok(record)))
}

pub async fn list_power_generations(
    State(state): State<AppState>,
    ProviderCaller(provider_id): ProviderCaller,
    Params(query): Params<PowerGenerationQuery>,
) -> Reply<Vec<GenerationView>> {
    let views = state
        .run(move |svc| svc.list_power_generations(provider_id, query.issued_status))
        .await?;
    Ok(Json(ApiResponse::ok(views)))
}

pub async fn carried_over(
    State(state): State<AppState>,
    ProviderCaller(provider_id): ProviderCaller,
    Params(query): Params<CarriedOverQuery>,
) -> Reply<CarriedOver> {
    let carried = state
        .run(move |svc| svc.carried_over(provider_id, query.plant_id))
        .await?;
    Ok(Json(ApiResponse::ok(carried)))
}

pub async fn list_rego(
    State(state): State<AppState>,
    Params(filter): Params<GroupFilter>,
) -> Reply<Vec<RegoGroup>> {
    let groups = state.run(move |svc| svc.list_rego_groups(&filter)).await?;
    Ok(Json(ApiResponse::ok(groups)))
}

pub async fn issue_rego(
    State(state): State<AppState>,
    ProviderCaller(provider_id): ProviderCaller,
    Body(body): Body<IssueRegoRequest>,
) -> Reply<IssuanceReport> {
    let report = state
        .run(move |svc| svc.issue_rego(provider_id, &body.power_generation_ids))
        .await?;
    Ok(Json(ApiResponse::ok_with(report, "REGO issued")))
}

pub async fn sell_rego(
    State(state): State<AppState>,
    ProviderCaller(provider_id): ProviderCaller,
    Body(body): Body<SellRegoRequest>,
) -> Reply<Vec<RegoGroup>> {
    let listed = state
        .run(move |svc| svc.sell_rego(provider_id, &body.rego_ids))
        .await?;
    Ok(Json(ApiResponse::ok_with(listed, "REGO listed for sale")))
}

pub async fn expire_rego(
    State(state): State<AppState>,
    body: Option<Body<ExpireRequest>>,
) -> Reply<Vec<u64>> {
    let as_of = body
        .and_then(|Body(req)| req.as_of)
        .map(TimeStamp::from)
        .unwrap_or_else(TimeStamp::now);
    let expired = state.run(move |svc| svc.expire_due(as_of)).await?;
    Ok(Json(ApiResponse::ok(expired)))
}

/// Trades visible to the caller: a provider sees trades on its groups, a
/// consumer sees its own applications.
pub async fn list_trades(
    State(state): State<AppState>,
    provider: Option<ProviderCaller>,
    consumer: Option<ConsumerCaller>,
    Params(mut filter): Params<TradeFilter>,
) -> Reply<Vec<RegoTradeInfo>> {
    match (provider, consumer) {
        (Some(ProviderCaller(id)), _) => filter.provider_id = Some(id),
        (None, Some(ConsumerCaller(id))) => filter.consumer_id = Some(id),
        (None, None) => {
            return Err(ApiError::Rego(RegoError::unauthorized(
                "a provider or consumer identity is required",
            )));
        }
    }
    let trades = state.run(move |svc| svc.list_trades(&filter)).await?;
    Ok(Json(ApiResponse::ok(trades)))
}

pub async fn request_buying(
    State(state): State<AppState>,
    ConsumerCaller(consumer_id): ConsumerCaller,
    Body(request): Body<BuyRequest>,
) -> Reply<RegoTradeInfo> {
    let trade = state
        .run(move |svc| svc.request_buying(consumer_id, request))
        .await?;
    Ok(Json(ApiResponse::ok_with(trade, "Buy application submitted")))
}

pub async fn accept_trade(
    State(state): State<AppState>,
    ProviderCaller(provider_id): ProviderCaller,
    Body(body): Body<TradeRequest>,
) -> Reply<AcceptedTrade> {
    let accepted = state
        .run(move |svc| svc.accept_trade(provider_id, body.rego_trade_info_id))
        .await?;
    Ok(Json(ApiResponse::ok_with(accepted, "Trade approved")))
}

pub async fn refuse_trade(
    State(state): State<AppState>,
    ProviderCaller(provider_id): ProviderCaller,
    Body(body): Body<RefuseTradeRequest>,
) -> Reply<RegoTradeInfo> {
    let trade = state
        .run(move |svc| {
            svc.refuse_trade(provider_id, body.rego_trade_info_id, &body.rejected_reason)
        })
        .await?;
    Ok(Json(ApiResponse::ok_with(trade, "Trade rejected")))
}

pub async fn cancel_trade(
    State(state): State<AppState>,
    ConsumerCaller(consumer_id): ConsumerCaller,
    Body(body): Body<TradeRequest>,
) -> Reply<RegoTradeInfo> {
    let trade = state
        .run(move |svc| svc.cancel_trade(consumer_id, body.rego_trade_info_id))
        .await?;
    Ok(Json(ApiResponse::ok_with(trade, "Trade canceled")))
}

pub async fn list_buying_rego(
    State(state): State<AppState>,
    ConsumerCaller(consumer_id): ConsumerCaller,
) -> Reply<Vec<BuyingRego>> {
    let holdings = state
        .run(move |svc| svc.list_buying_regos(consumer_id))
        .await?;
    Ok(Json(ApiResponse::ok(holdings)))
}

pub async fn issue_confirmation(
    State(state): State<AppState>,
    ConsumerCaller(consumer_id): ConsumerCaller,
    Body(body): Body<IssueConfirmationRequest>,
) -> Reply<ConfirmationReceipt> {
    let receipt = state
        .run(move |svc| {
            svc.issue_confirmation(
                consumer_id,
                &body.selected_regos,
                &body.usage_recognition_period,
            )
        })
        .await?;
    Ok(Json(ApiResponse::ok_with(receipt, "REGO usage confirmation issued")))
}

pub async fn list_confirmations(
    State(state): State<AppState>,
    ConsumerCaller(consumer_id): ConsumerCaller,
) -> Reply<Vec<RegoConfirmation>> {
    let confirmations = state
        .run(move |svc| svc.list_confirmations(consumer_id))
        .await?;
    Ok(Json(ApiResponse::ok(confirmations)))
}

pub async fn confirmation_detail(
    State(state): State<AppState>,
    ConsumerCaller(consumer_id): ConsumerCaller,
    Path(confirmation_id): Path<u64>,
) -> Reply<ConfirmationReceipt> {
    let receipt = state
        .run(move |svc| svc.confirmation_detail(consumer_id, confirmation_id))
        .await?;
    Ok(Json(ApiResponse::ok(receipt)))
}
