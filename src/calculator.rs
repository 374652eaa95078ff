//! Per-item stock status.
//!
//! Turns one [`InventoryItem`] plus the team's [`TeamStockSettings`] into a
//! [`StockStatus`]: how much the household should keep, how many days the
//! current quantity lasts, and which [`StatusTier`] that puts the item in.

use crate::catalog::{self, RecommendationEntry};
use crate::model::{InventoryItem, StatusTier, StockStatus, TeamStockSettings};

/// Below this many days of supply an item is critical.
const CRITICAL_DAYS: f64 = 1.0;

/// Below this many days of supply an item is low.
const LOW_DAYS: f64 = 3.0;

/// Compute the stock status of a single item.
///
/// Uncataloged categories only get an in/out judgment: `out` when the quantity
/// is zero, `sufficient` otherwise, with every derived number left at zero.
pub fn compute_status(item: &InventoryItem, settings: &TeamStockSettings) -> StockStatus {
    let quantity = item.quantity;

    let Some(entry) = catalog::lookup(&item.category) else {
        let status = if quantity == 0 {
            StatusTier::Out
        } else {
            StatusTier::Sufficient
        };
        return StockStatus {
            recommended: 0,
            current: quantity,
            status,
            days_remaining: 0.0,
            need_to_buy: 0,
            priority: status.priority(),
            message: String::new(),
            daily_consumption: 0.0,
        };
    };

    let daily_consumption = daily_consumption(&entry, settings);
    let recommended = recommended_quantity(daily_consumption, settings.stock_days);
    let days_remaining = if daily_consumption > 0.0 {
        f64::from(quantity) / daily_consumption
    } else {
        0.0
    };
    let need_to_buy = recommended.saturating_sub(quantity);
    let status = classify(quantity, days_remaining, recommended);

    StockStatus {
        recommended,
        current: quantity,
        status,
        days_remaining,
        need_to_buy,
        priority: status.priority(),
        message: status_message(status, &entry, settings, recommended, need_to_buy, days_remaining),
        daily_consumption,
    }
}

/// Daily consumption of a category for the whole household, pets included.
pub fn daily_consumption(entry: &RecommendationEntry, settings: &TeamStockSettings) -> f64 {
    let people = match (settings.use_detailed_composition, settings.composition, entry.age_bands) {
        (true, Some(composition), Some(rates)) => {
            rates.adult * f64::from(composition.adults)
                + rates.child * f64::from(composition.children)
                + rates.infant * f64::from(composition.infants)
                + rates.elderly * f64::from(composition.elderly)
        }
        _ => entry.per_person_per_day * f64::from(settings.household_size),
    };

    let pets = if settings.pets.has_pets {
        entry.per_dog_per_day.unwrap_or(0.0) * f64::from(settings.pets.dogs)
            + entry.per_cat_per_day.unwrap_or(0.0) * f64::from(settings.pets.cats)
    } else {
        0.0
    };

    people + pets
}

/// `ceil(daily_consumption * stock_days)`.
pub fn recommended_quantity(daily_consumption: f64, stock_days: u32) -> u32 {
    (daily_consumption * f64::from(stock_days)).ceil().max(0.0) as u32
}

/// Pick the status tier. The first matching condition wins.
pub fn classify(quantity: u32, days_remaining: f64, recommended: u32) -> StatusTier {
    if quantity == 0 {
        StatusTier::Out
    } else if days_remaining < CRITICAL_DAYS {
        StatusTier::Critical
    } else if days_remaining < LOW_DAYS {
        StatusTier::Low
    } else if quantity < recommended {
        StatusTier::BelowRecommended
    } else {
        StatusTier::Sufficient
    }
}

fn status_message(
    status: StatusTier,
    entry: &RecommendationEntry,
    settings: &TeamStockSettings,
    recommended: u32,
    need_to_buy: u32,
    days_remaining: f64,
) -> String {
    let unit = entry.unit;
    match status {
        StatusTier::Out => format!(
            "在庫がありません。{}日分として{}{}の備蓄をおすすめします",
            settings.stock_days, recommended, unit
        ),
        StatusTier::Critical => format!(
            "残り{:.1}日分です。至急{}{}を補充してください",
            days_remaining, need_to_buy, unit
        ),
        StatusTier::Low => format!(
            "残り{:.1}日分です。{}{}の補充をおすすめします",
            days_remaining, need_to_buy, unit
        ),
        StatusTier::BelowRecommended => format!(
            "推奨量（{}日分: {}{}）まであと{}{}です",
            settings.stock_days, recommended, unit, need_to_buy, unit
        ),
        StatusTier::Sufficient => format!("十分な備蓄があります（約{:.0}日分）", days_remaining),
    }
}
