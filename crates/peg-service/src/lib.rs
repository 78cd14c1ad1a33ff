#![deny(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use peg_adapters::{InMemoryToken, MockPriceFeed, UnitToken};
use peg_core::{
    serde_amount, AccountId, AccountingEngine, Amount, AssetId, Clock, CollateralListing,
    CollateralPosition, EngineConfig, EngineDeployment, EngineError, ErrorCategory, EventRecord,
    FungibleToken, LiquidationOutcome, PriceQuote, PriceSource, SystemClock, TokenError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Collateral asset seeded into the sandbox deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxAsset {
    pub symbol: String,
    pub feed_decimals: u8,
    /// Initial feed answer in `feed_decimals` fixed point.
    pub initial_answer: i128,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub engine: EngineConfig,
    pub custody_account: String,
    pub unit_symbol: String,
    pub assets: Vec<SandboxAsset>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            custody_account: "peg-engine".to_string(),
            unit_symbol: "pUSD".to_string(),
            assets: vec![
                SandboxAsset {
                    symbol: "WETH".to_string(),
                    feed_decimals: 8,
                    initial_answer: 2_000_0000_0000,
                },
                SandboxAsset {
                    symbol: "WBTC".to_string(),
                    feed_decimals: 8,
                    initial_answer: 1_000_0000_0000,
                },
            ],
        }
    }
}

/// Handles on the in-memory collaborators so the sandbox endpoints can drive them.
pub struct Sandbox {
    pub tokens: HashMap<AssetId, Arc<InMemoryToken>>,
    pub feeds: HashMap<AssetId, Arc<MockPriceFeed>>,
    pub unit: Arc<UnitToken>,
}

#[derive(Clone)]
pub struct ServiceState {
    pub engine: Arc<AccountingEngine>,
    pub sandbox: Arc<Sandbox>,
}

impl ServiceState {
    pub fn bootstrap(config: ServiceConfig) -> Result<Self, ServiceError> {
        let ServiceConfig {
            engine: engine_config,
            custody_account,
            unit_symbol,
            assets,
        } = config;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let unit = Arc::new(UnitToken::new(unit_symbol));
        let mut tokens = HashMap::new();
        let mut feeds = HashMap::new();
        let mut listings = Vec::with_capacity(assets.len());
        let mut sources: Vec<Arc<dyn PriceSource>> = Vec::with_capacity(assets.len());

        for asset in assets {
            let id = AssetId::new(asset.symbol.clone());
            let token = Arc::new(InMemoryToken::new(asset.symbol.clone()));
            let feed = Arc::new(MockPriceFeed::new(
                asset.feed_decimals,
                asset.initial_answer,
                Arc::clone(&clock),
            ));
            listings.push(CollateralListing::new(asset.symbol, token.clone()));
            sources.push(feed.clone());
            tokens.insert(id.clone(), token);
            feeds.insert(id, feed);
        }

        let engine = AccountingEngine::new(EngineDeployment {
            config: engine_config,
            custody_account: AccountId::new(custody_account),
            collateral: listings,
            price_sources: sources,
            unit_token: unit.clone(),
            clock,
        })?;

        Ok(Self {
            engine: Arc::new(engine),
            sandbox: Arc::new(Sandbox {
                tokens,
                feeds,
                unit,
            }),
        })
    }

    /// Run blocking engine work off the async executor.
    async fn run<T, F>(&self, work: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&ServiceState) -> Result<T, ApiError> + Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || work(&state))
            .await
            .map_err(|e| ApiError::internal(format!("engine task failed: {e}")))?
    }

    fn collateral_token(&self, asset: &AssetId) -> Result<&Arc<InMemoryToken>, ApiError> {
        self.sandbox
            .tokens
            .get(asset)
            .ok_or_else(|| ApiError::from(EngineError::NotAllowedToken(asset.clone())))
    }

    fn feed(&self, asset: &AssetId) -> Result<&Arc<MockPriceFeed>, ApiError> {
        self.sandbox
            .feeds
            .get(asset)
            .ok_or_else(|| ApiError::from(EngineError::NotAllowedToken(asset.clone())))
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/assets", get(list_assets))
        .route("/v1/accounts/:account", get(get_account))
        .route("/v1/collateral/deposit", post(deposit_collateral))
        .route("/v1/collateral/redeem", post(redeem_collateral))
        .route("/v1/debt/mint", post(mint))
        .route("/v1/debt/burn", post(burn))
        .route("/v1/positions/deposit-and-mint", post(deposit_and_mint))
        .route("/v1/positions/redeem-for-burn", post(redeem_for_burn))
        .route("/v1/liquidations", post(liquidate))
        .route("/v1/prices/:asset/usd-value", get(usd_value))
        .route("/v1/prices/:asset/token-amount", get(token_amount))
        .route("/v1/events", get(list_events))
        .route("/v1/sandbox/faucet", post(sandbox_faucet))
        .route("/v1/sandbox/approve", post(sandbox_approve))
        .route("/v1/sandbox/price", post(sandbox_price))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Http { status, .. } => *status,
            ApiError::Engine(EngineError::ReentrantCall) => StatusCode::CONFLICT,
            ApiError::Engine(err) => match err.category() {
                ErrorCategory::Validation => StatusCode::BAD_REQUEST,
                ErrorCategory::Invariant => StatusCode::CONFLICT,
                ErrorCategory::External => StatusCode::BAD_GATEWAY,
                ErrorCategory::Oracle => StatusCode::SERVICE_UNAVAILABLE,
                ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Token(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

// ----- Views -----

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    custody_account: String,
    collateral_assets: usize,
}

#[derive(Debug, Clone, Serialize)]
struct AssetView {
    asset: AssetId,
    quote: Option<PriceQuote>,
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub account: AccountId,
    #[serde(with = "serde_amount")]
    pub total_debt: Amount,
    #[serde(with = "serde_amount")]
    pub collateral_value_usd: Amount,
    #[serde(with = "serde_amount")]
    pub health_factor: Amount,
    #[serde(with = "serde_amount")]
    pub unit_balance: Amount,
    pub positions: Vec<CollateralPosition>,
}

fn account_view(state: &ServiceState, account: &AccountId) -> Result<AccountView, ApiError> {
    let info = state.engine.get_account_information(account)?;
    Ok(AccountView {
        account: account.clone(),
        total_debt: info.total_debt,
        collateral_value_usd: info.collateral_value_usd,
        health_factor: state
            .engine
            .calculate_health_factor(info.collateral_value_usd, info.total_debt)?,
        unit_balance: state.sandbox.unit.balance_of(account),
        positions: state.engine.positions(account)?,
    })
}

#[derive(Debug, Clone, Serialize)]
struct ConversionResponse {
    asset: AssetId,
    #[serde(with = "serde_amount")]
    input: Amount,
    #[serde(with = "serde_amount")]
    output: Amount,
}

#[derive(Debug, Clone, Serialize)]
struct EventsResponse {
    total: usize,
    verified: bool,
    items: Vec<EventRecord>,
}

// ----- Requests -----

#[derive(Debug, Clone, Deserialize)]
struct CollateralRequest {
    account: String,
    asset: String,
    #[serde(with = "serde_amount")]
    amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
struct DebtRequest {
    account: String,
    #[serde(with = "serde_amount")]
    amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
struct DepositAndMintRequest {
    account: String,
    asset: String,
    #[serde(with = "serde_amount")]
    collateral_amount: Amount,
    #[serde(with = "serde_amount")]
    mint_amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
struct RedeemForBurnRequest {
    account: String,
    asset: String,
    #[serde(with = "serde_amount")]
    collateral_amount: Amount,
    #[serde(with = "serde_amount")]
    burn_amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
struct LiquidationRequest {
    liquidator: String,
    account: String,
    asset: String,
    #[serde(with = "serde_amount")]
    debt_to_cover: Amount,
}

#[derive(Debug, Clone, Deserialize)]
struct AmountQuery {
    #[serde(with = "serde_amount")]
    amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
struct UsdQuery {
    #[serde(with = "serde_amount")]
    usd: Amount,
}

#[derive(Debug, Clone, Deserialize)]
struct FaucetRequest {
    account: String,
    asset: String,
    #[serde(with = "serde_amount")]
    amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
struct ApproveRequest {
    owner: String,
    /// Collateral asset symbol, or the unit-of-account symbol.
    token: String,
    #[serde(with = "serde_amount")]
    amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
struct PriceRequest {
    asset: String,
    answer: i128,
    updated_at: Option<DateTime<Utc>>,
}

fn account_id(raw: String) -> Result<AccountId, ApiError> {
    let account = AccountId::new(raw);
    if account.is_null() {
        return Err(ApiError::bad_request("account is required"));
    }
    Ok(account)
}

// ----- Handlers -----

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "peg-service",
        custody_account: state.engine.custody_account().to_string(),
        collateral_assets: state.engine.collateral_assets().len(),
    })
}

async fn list_assets(State(state): State<ServiceState>) -> Result<Json<Vec<AssetView>>, ApiError> {
    let views: Vec<AssetView> = state
        .run(|state| {
            Ok(state
                .engine
                .collateral_assets()
                .into_iter()
                .map(|asset| match state.engine.price_quote(&asset) {
                    Ok(quote) => AssetView {
                        asset,
                        quote: Some(quote),
                        error: None,
                    },
                    Err(err) => AssetView {
                        asset,
                        quote: None,
                        error: Some(err.to_string()),
                    },
                })
                .collect())
        })
        .await?;
    Ok(Json(views))
}

async fn get_account(
    Path(account): Path<String>,
    State(state): State<ServiceState>,
) -> Result<Json<AccountView>, ApiError> {
    let account = account_id(account)?;
    Ok(Json(
        state.run(move |state| account_view(state, &account)).await?,
    ))
}

async fn deposit_collateral(
    State(state): State<ServiceState>,
    Json(request): Json<CollateralRequest>,
) -> Result<Json<AccountView>, ApiError> {
    let account = account_id(request.account)?;
    let view = state
        .run(move |state| {
            state.engine.deposit_collateral(
                &account,
                &AssetId::new(request.asset),
                request.amount,
            )?;
            account_view(state, &account)
        })
        .await?;
    Ok(Json(view))
}

async fn redeem_collateral(
    State(state): State<ServiceState>,
    Json(request): Json<CollateralRequest>,
) -> Result<Json<AccountView>, ApiError> {
    let account = account_id(request.account)?;
    let view = state
        .run(move |state| {
            state.engine.redeem_collateral(
                &account,
                &AssetId::new(request.asset),
                request.amount,
            )?;
            account_view(state, &account)
        })
        .await?;
    Ok(Json(view))
}

async fn mint(
    State(state): State<ServiceState>,
    Json(request): Json<DebtRequest>,
) -> Result<Json<AccountView>, ApiError> {
    let account = account_id(request.account)?;
    let view = state
        .run(move |state| {
            state.engine.mint(&account, request.amount)?;
            account_view(state, &account)
        })
        .await?;
    Ok(Json(view))
}

async fn burn(
    State(state): State<ServiceState>,
    Json(request): Json<DebtRequest>,
) -> Result<Json<AccountView>, ApiError> {
    let account = account_id(request.account)?;
    let view = state
        .run(move |state| {
            state.engine.burn(&account, request.amount)?;
            account_view(state, &account)
        })
        .await?;
    Ok(Json(view))
}

async fn deposit_and_mint(
    State(state): State<ServiceState>,
    Json(request): Json<DepositAndMintRequest>,
) -> Result<Json<AccountView>, ApiError> {
    let account = account_id(request.account)?;
    let view = state
        .run(move |state| {
            state.engine.deposit_and_mint(
                &account,
                &AssetId::new(request.asset),
                request.collateral_amount,
                request.mint_amount,
            )?;
            account_view(state, &account)
        })
        .await?;
    Ok(Json(view))
}

async fn redeem_for_burn(
    State(state): State<ServiceState>,
    Json(request): Json<RedeemForBurnRequest>,
) -> Result<Json<AccountView>, ApiError> {
    let account = account_id(request.account)?;
    let view = state
        .run(move |state| {
            state.engine.redeem_for_burn(
                &account,
                &AssetId::new(request.asset),
                request.collateral_amount,
                request.burn_amount,
            )?;
            account_view(state, &account)
        })
        .await?;
    Ok(Json(view))
}

async fn liquidate(
    State(state): State<ServiceState>,
    Json(request): Json<LiquidationRequest>,
) -> Result<Json<LiquidationOutcome>, ApiError> {
    let liquidator = account_id(request.liquidator)?;
    let account = account_id(request.account)?;
    let outcome = state
        .run(move |state| {
            Ok(state.engine.liquidate(
                &liquidator,
                &AssetId::new(request.asset),
                &account,
                request.debt_to_cover,
            )?)
        })
        .await?;
    Ok(Json(outcome))
}

async fn usd_value(
    Path(asset): Path<String>,
    Query(query): Query<AmountQuery>,
    State(state): State<ServiceState>,
) -> Result<Json<ConversionResponse>, ApiError> {
    let asset = AssetId::new(asset);
    let output = state.engine.usd_value(&asset, query.amount)?;
    Ok(Json(ConversionResponse {
        asset,
        input: query.amount,
        output,
    }))
}

async fn token_amount(
    Path(asset): Path<String>,
    Query(query): Query<UsdQuery>,
    State(state): State<ServiceState>,
) -> Result<Json<ConversionResponse>, ApiError> {
    let asset = AssetId::new(asset);
    let output = state.engine.token_amount_from_usd(&asset, query.usd)?;
    Ok(Json(ConversionResponse {
        asset,
        input: query.usd,
        output,
    }))
}

async fn list_events(State(state): State<ServiceState>) -> Result<Json<EventsResponse>, ApiError> {
    let items = state.engine.events()?;
    Ok(Json(EventsResponse {
        total: items.len(),
        verified: state.engine.verify_event_chain()?,
        items,
    }))
}

async fn sandbox_faucet(
    State(state): State<ServiceState>,
    Json(request): Json<FaucetRequest>,
) -> Result<StatusCode, ApiError> {
    let account = account_id(request.account)?;
    let asset = AssetId::new(request.asset);
    state
        .collateral_token(&asset)?
        .faucet(&account, request.amount)?;
    info!(account = %account, asset = %asset, amount = request.amount, "Sandbox faucet");
    Ok(StatusCode::NO_CONTENT)
}

async fn sandbox_approve(
    State(state): State<ServiceState>,
    Json(request): Json<ApproveRequest>,
) -> Result<StatusCode, ApiError> {
    let owner = account_id(request.owner)?;
    let spender = state.engine.custody_account();
    if request.token == state.sandbox.unit.symbol() {
        state.sandbox.unit.approve(&owner, spender, request.amount)?;
    } else {
        state
            .collateral_token(&AssetId::new(request.token))?
            .approve(&owner, spender, request.amount)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn sandbox_price(
    State(state): State<ServiceState>,
    Json(request): Json<PriceRequest>,
) -> Result<StatusCode, ApiError> {
    let asset = AssetId::new(request.asset);
    let feed = state.feed(&asset)?;
    match request.updated_at {
        Some(updated_at) => {
            let round_id = feed.latest_round().map(|q| q.round_id + 1).unwrap_or(1);
            feed.update_round_data(round_id, request.answer, updated_at);
        }
        None => feed.update_answer(request.answer),
    }
    info!(asset = %asset, answer = request.answer, "Sandbox price update");
    Ok(StatusCode::NO_CONTENT)
}
