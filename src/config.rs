use std::env;
use std::str::FromStr;

use chrono::{Duration, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Point the geo search is centred on when dispatching an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchCenter {
    /// Agents near the pickup, since every delivery starts there.
    #[default]
    Restaurant,
    DeliveryAddress,
}

impl FromStr for DispatchCenter {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "restaurant" => Ok(DispatchCenter::Restaurant),
            "delivery_address" => Ok(DispatchCenter::DeliveryAddress),
            other => Err(format!(
                "unknown dispatch center {other}, expected restaurant or delivery_address"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub radius_km: f64,
    pub candidate_limit: usize,
    pub center: DispatchCenter,
    /// Agents whose last heartbeat is older than this are never offered work.
    pub location_max_age: Duration,
}

#[derive(Debug, Clone)]
pub struct PricingSettings {
    pub delivery_fee: Decimal,
    pub tax_rate: Decimal,
    pub delivery_buffer: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub dispatch_queue_size: usize,
    pub event_buffer_size: usize,
    pub dispatch: DispatchSettings,
    pub pricing: PricingSettings,
    pub earnings_offset: FixedOffset,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let staleness_secs: i64 = required("LOCATION_STALENESS_SECS")?;
        if staleness_secs <= 0 {
            return Err(AppError::Internal(
                "LOCATION_STALENESS_SECS must be positive".to_string(),
            ));
        }

        let offset_minutes: i32 = parse_or_default("EARNINGS_UTC_OFFSET_MINUTES", 0)?;
        let earnings_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            AppError::Internal(format!(
                "invalid EARNINGS_UTC_OFFSET_MINUTES: {offset_minutes}"
            ))
        })?;

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            dispatch_queue_size: parse_or_default("DISPATCH_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            dispatch: DispatchSettings {
                radius_km: parse_or_default("DISPATCH_RADIUS_KM", 5.0)?,
                candidate_limit: parse_or_default("DISPATCH_CANDIDATE_LIMIT", 10)?,
                center: parse_or_default("DISPATCH_CENTER", DispatchCenter::Restaurant)?,
                location_max_age: Duration::seconds(staleness_secs),
            },
            pricing: PricingSettings {
                delivery_fee: parse_or_default("DELIVERY_FEE", Decimal::new(299, 2))?,
                tax_rate: parse_or_default("TAX_RATE", Decimal::ZERO)?,
                delivery_buffer: Duration::minutes(parse_or_default(
                    "DELIVERY_BUFFER_MINUTES",
                    15,
                )?),
            },
            earnings_offset,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

fn required<T>(key: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).map_err(|_| AppError::Internal(format!("{key} must be set")))?;
    raw.parse::<T>()
        .map_err(|err| AppError::Internal(format!("invalid {key}: {err}")))
}
