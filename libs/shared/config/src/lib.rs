use std::env;
use std::str::FromStr;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Supabase,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub redis_url: Option<String>,
    pub store_backend: StoreBackend,
    pub bind_addr: String,
    pub scheduling: SchedulingConfig,
    pub billing: BillingConfig,
}

/// Clinic-wide default weekly rule and workflow timing.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingConfig {
    pub slot_minutes: u32,
    pub day_start: NaiveTime,
    pub day_end: NaiveTime,
    pub rest_day: Weekday,
    pub conflict_debounce_ms: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            slot_minutes: 30,
            day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            day_end: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            rest_day: Weekday::Sun,
            conflict_debounce_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BillingConfig {
    pub capacity_threshold: u64,
    pub standard_rate: f64,
    pub finalize_retries: u32,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            capacity_threshold: 500,
            standard_rate: 40.0,
            finalize_retries: 3,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = SchedulingConfig::default();
        let billing_defaults = BillingConfig::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            redis_url: env::var("REDIS_URL").ok(),
            store_backend: match env::var("STORE_BACKEND").as_deref() {
                Ok("supabase") => StoreBackend::Supabase,
                Ok("memory") | Err(_) => StoreBackend::Memory,
                Ok(other) => {
                    warn!("Unknown STORE_BACKEND '{}', falling back to memory", other);
                    StoreBackend::Memory
                }
            },
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            scheduling: SchedulingConfig {
                slot_minutes: parse_var("SLOT_MINUTES", defaults.slot_minutes),
                day_start: parse_time_var("DAY_START", defaults.day_start),
                day_end: parse_time_var("DAY_END", defaults.day_end),
                rest_day: parse_var("REST_DAY", defaults.rest_day),
                conflict_debounce_ms: parse_var("CONFLICT_DEBOUNCE_MS", defaults.conflict_debounce_ms),
            },
            billing: BillingConfig {
                capacity_threshold: parse_var("SESSION_CAPACITY_THRESHOLD", billing_defaults.capacity_threshold),
                standard_rate: parse_var("SESSION_STANDARD_RATE", billing_defaults.standard_rate),
                finalize_retries: parse_var("BILLING_FINALIZE_RETRIES", billing_defaults.finalize_retries),
            },
        };

        if config.store_backend == StoreBackend::Supabase && !config.is_configured() {
            warn!("Supabase backend selected but not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn parse_time_var(key: &str, default: NaiveTime) -> NaiveTime {
    match env::var(key) {
        Ok(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M").unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', expected HH:MM, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
