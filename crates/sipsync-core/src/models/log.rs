//! Drink log payloads

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::LogKind;
use crate::util::normalize_text_option;

/// Ethanol density in g/ml.
const ETHANOL_DENSITY: f64 = 0.789;

/// Catalog reference for a drink, resolved by the caller before logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrinkRef {
    pub drink_id: String,
    /// Volume of one serving in millilitres
    pub serving_ml: u32,
    /// Alcohol by volume, 0..=100
    pub abv_percent: f64,
}

impl DrinkRef {
    pub fn new(drink_id: impl Into<String>, serving_ml: u32, abv_percent: f64) -> Self {
        Self {
            drink_id: drink_id.into(),
            serving_ml,
            abv_percent,
        }
    }
}

/// Grams of pure alcohol in `quantity` servings, rounded to 0.1 g.
pub fn pure_alcohol_grams(quantity: u32, serving_ml: u32, abv_percent: f64) -> f64 {
    let millilitres = f64::from(quantity) * f64::from(serving_ml) * abv_percent / 100.0;
    (millilitres * ETHANOL_DENSITY * 10.0).round() / 10.0
}

/// A single consumption entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrinkLog {
    pub user_id: String,
    pub drink_id: String,
    pub quantity: u32,
    pub serving_ml: u32,
    pub abv_percent: f64,
    pub pure_alcohol_grams: f64,
    /// Consumption timestamp (Unix ms)
    pub consumed_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl DrinkLog {
    /// Build a validated log, computing the pure alcohol amount.
    pub fn new(
        user_id: impl Into<String>,
        drink: &DrinkRef,
        quantity: u32,
        consumed_at: i64,
        memo: Option<String>,
    ) -> Result<Self> {
        let user_id = normalize_text_option(Some(user_id.into()))
            .ok_or_else(|| Error::InvalidInput("user id must not be empty".into()))?;
        let drink_id = normalize_text_option(Some(drink.drink_id.clone()))
            .ok_or_else(|| Error::InvalidInput("drink id must not be empty".into()))?;

        if quantity == 0 {
            return Err(Error::InvalidInput("quantity must be at least 1".into()));
        }
        if drink.serving_ml == 0 {
            return Err(Error::InvalidInput(
                "serving volume must be greater than 0 ml".into(),
            ));
        }
        if !(0.0..=100.0).contains(&drink.abv_percent) {
            return Err(Error::InvalidInput(format!(
                "abv must be between 0 and 100, got {}",
                drink.abv_percent
            )));
        }

        Ok(Self {
            user_id,
            drink_id,
            quantity,
            serving_ml: drink.serving_ml,
            abv_percent: drink.abv_percent,
            pure_alcohol_grams: pure_alcohol_grams(quantity, drink.serving_ml, drink.abv_percent),
            consumed_at,
            memo: normalize_text_option(memo),
        })
    }
}

/// A consumption entry scoped to a shared event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    #[serde(flatten)]
    pub log: DrinkLog,
    pub event_id: String,
    /// Whether peers must approve the entry before it counts toward event totals
    pub approval_required: bool,
}

impl EventLog {
    pub fn new(log: DrinkLog, event_id: impl Into<String>, approval_required: bool) -> Result<Self> {
        let event_id = normalize_text_option(Some(event_id.into()))
            .ok_or_else(|| Error::InvalidInput("event id must not be empty".into()))?;
        Ok(Self {
            log,
            event_id,
            approval_required,
        })
    }
}

/// Payload of a queued record; the variant decides which queue it lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogPayload {
    Personal(DrinkLog),
    Event(EventLog),
}

impl LogPayload {
    pub const fn kind(&self) -> LogKind {
        match self {
            Self::Personal(_) => LogKind::Personal,
            Self::Event(_) => LogKind::Event,
        }
    }

    pub const fn drink_log(&self) -> &DrinkLog {
        match self {
            Self::Personal(log) => log,
            Self::Event(event) => &event.log,
        }
    }
}
