//! Data models for Sonae.
//!
//! Persisted records ([`InventoryItem`], [`Team`], [`TeamStockSettings`]) and
//! the derived, never-persisted results computed from them ([`StockStatus`],
//! [`AggregateReport`], [`LevelProgress`]).
//!
//! Settings are stored as a JSON document on the team record. Every field has a
//! serde default, so defaults are applied exactly once, when the document is
//! loaded, and downstream computation never has to re-derive them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Category, StockLevel};

/// Stock-day targets a team may choose from.
pub const ALLOWED_STOCK_DAYS: [u32; 4] = [3, 7, 14, 30];

/// A single tracked supply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub category: Category,
    pub quantity: u32,
    pub unit: String,
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub archived: bool,
}

/// Headcount per age band, used instead of `household_size` when
/// `use_detailed_composition` is on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HouseholdComposition {
    pub adults: u32,
    pub children: u32,
    pub infants: u32,
    pub elderly: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PetSettings {
    pub has_pets: bool,
    pub dogs: u32,
    pub cats: u32,
}

/// Which alerts a team wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub out_of_stock: bool,
    pub low_stock: bool,
    pub expiry: bool,
    pub weekly_report: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            out_of_stock: true,
            low_stock: true,
            expiry: true,
            weekly_report: true,
        }
    }
}

/// Household settings that drive every recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamStockSettings {
    pub household_size: u32,
    pub stock_days: u32,
    pub pets: PetSettings,
    pub use_detailed_composition: bool,
    pub composition: Option<HouseholdComposition>,
    pub stock_level: StockLevel,
    pub notifications: NotificationSettings,
}

impl Default for TeamStockSettings {
    fn default() -> Self {
        Self {
            household_size: 1,
            stock_days: 7,
            pets: PetSettings::default(),
            use_detailed_composition: false,
            composition: None,
            stock_level: StockLevel::default(),
            notifications: NotificationSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("household size must be at least 1")]
    EmptyHousehold,
    #[error("stock days must be 3, 7, 14 or 30, got {0}")]
    UnsupportedStockDays(u32),
    #[error("detailed composition is enabled but no composition was given")]
    MissingComposition,
}

impl TeamStockSettings {
    /// Check the settings before they are written.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.household_size < 1 {
            return Err(SettingsError::EmptyHousehold);
        }
        if !ALLOWED_STOCK_DAYS.contains(&self.stock_days) {
            return Err(SettingsError::UnsupportedStockDays(self.stock_days));
        }
        if self.use_detailed_composition && self.composition.is_none() {
            return Err(SettingsError::MissingComposition);
        }
        Ok(())
    }
}

/// A household team and its notification watermark.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub settings: TeamStockSettings,
    pub last_notified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
}

impl MemberRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }
}

/// Adequacy judgment for one item, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusTier {
    Sufficient,
    BelowRecommended,
    Low,
    Critical,
    Out,
}

impl StatusTier {
    /// Fixed alert priority carried by each tier.
    pub fn priority(self) -> AlertPriority {
        match self {
            StatusTier::Out | StatusTier::Critical | StatusTier::Low => AlertPriority::High,
            StatusTier::BelowRecommended => AlertPriority::Medium,
            StatusTier::Sufficient => AlertPriority::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    High,
    Medium,
    Low,
}

/// Derived stock status for one item. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockStatus {
    pub recommended: u32,
    pub current: u32,
    pub status: StatusTier,
    pub days_remaining: f64,
    pub need_to_buy: u32,
    pub priority: AlertPriority,
    pub message: String,
    pub daily_consumption: f64,
}

/// Progress towards one stock-level preset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelProgress {
    pub level: StockLevel,
    pub stocked_count: usize,
    pub total_required: usize,
    pub progress_percentage: u32,
    pub is_complete: bool,
    /// Only set once the current level is complete and a higher level exists.
    pub next_level: Option<StockLevel>,
}

/// Team-wide summary of per-item statuses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub total_items: usize,
    pub sufficient_count: usize,
    pub below_recommended_count: usize,
    pub low_count: usize,
    pub critical_count: usize,
    pub out_count: usize,
    pub total_current: u64,
    pub total_recommended: u64,
    /// `current / recommended` as a rounded percentage. Not clamped, so it can
    /// exceed 100.
    pub overall_percentage: u32,
    pub level_progress: LevelProgress,
}

/// Required-but-unstocked categories, grouped by catalog priority.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MissingByPriority {
    pub essential: Vec<Category>,
    pub important: Vec<Category>,
    pub recommended: Vec<Category>,
}

/// Response for GET /teams/:team_id/report.
#[derive(Debug, Clone, Serialize)]
pub struct TeamReportResponse {
    pub team_id: String,
    pub report: AggregateReport,
    pub missing: MissingByPriority,
}

/// One row of GET /teams/:team_id/statuses.
#[derive(Debug, Clone, Serialize)]
pub struct ItemStatus {
    pub item_id: String,
    pub name: String,
    pub category: Category,
    pub status: StockStatus,
}

/// Response for GET /teams/:team_id/statuses.
#[derive(Debug, Clone, Serialize)]
pub struct ItemStatusesResponse {
    pub team_id: String,
    pub items: Vec<ItemStatus>,
}

/// Response for the weekly report trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyReportResponse {
    pub message: String,
    #[serde(rename = "teamsSent")]
    pub teams_sent: usize,
}

/// JSON error body shared by every handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
