//! Team-wide stock reports.
//!
//! Rolls per-item [`StockStatus`](crate::model::StockStatus) judgments up into
//! an [`AggregateReport`], and measures how far a team is towards each
//! [`StockLevel`] preset.
//!
//! Everything here is pure: callers load items and settings from storage and
//! hand them in.

use std::collections::HashSet;

use crate::calculator::compute_status;
use crate::catalog::{self, Category, PriorityTier, StockLevel};
use crate::model::{
    AggregateReport, InventoryItem, LevelProgress, MissingByPriority, StatusTier,
    TeamStockSettings,
};

/// Summarize every non-archived item of a team.
///
/// `overall_percentage` is `round(100 * current / recommended)` summed over
/// every item, and 100 when nothing is recommended at all. Uncataloged items
/// add their stock with a recommendation of zero. The value is not clamped.
pub fn aggregate(items: &[InventoryItem], settings: &TeamStockSettings) -> AggregateReport {
    let mut total_items = 0;
    let mut sufficient_count = 0;
    let mut below_recommended_count = 0;
    let mut low_count = 0;
    let mut critical_count = 0;
    let mut out_count = 0;
    let mut total_current: u64 = 0;
    let mut total_recommended: u64 = 0;

    for item in items.iter().filter(|item| !item.archived) {
        let status = compute_status(item, settings);

        total_items += 1;
        match status.status {
            StatusTier::Sufficient => sufficient_count += 1,
            StatusTier::BelowRecommended => below_recommended_count += 1,
            StatusTier::Low => low_count += 1,
            StatusTier::Critical => critical_count += 1,
            StatusTier::Out => out_count += 1,
        }

        total_current += u64::from(status.current);
        total_recommended += u64::from(status.recommended);
    }

    AggregateReport {
        total_items,
        sufficient_count,
        below_recommended_count,
        low_count,
        critical_count,
        out_count,
        total_current,
        total_recommended,
        overall_percentage: percentage(total_current, total_recommended),
        level_progress: level_progress(items, settings.stock_level),
    }
}

/// Progress towards a stock-level preset.
///
/// A required category counts as stocked once any non-archived item of that
/// category has a positive quantity.
pub fn level_progress(items: &[InventoryItem], level: StockLevel) -> LevelProgress {
    let stocked = stocked_categories(items);
    let required = level.required_categories();

    let stocked_count = required.iter().filter(|c| stocked.contains(c)).count();
    let total_required = required.len();
    let progress_percentage = percentage(stocked_count as u64, total_required as u64);
    let is_complete = stocked_count == total_required;

    LevelProgress {
        level,
        stocked_count,
        total_required,
        progress_percentage,
        is_complete,
        next_level: if is_complete { level.next() } else { None },
    }
}

/// Required categories not yet stocked, split by catalog priority.
///
/// Each list keeps the level's declared category order.
pub fn missing_by_priority(items: &[InventoryItem], level: StockLevel) -> MissingByPriority {
    let stocked = stocked_categories(items);
    let mut missing = MissingByPriority::default();

    for category in level.required_categories() {
        if stocked.contains(&category) {
            continue;
        }
        let Some(entry) = catalog::lookup(&category) else {
            continue;
        };
        match entry.priority {
            PriorityTier::Essential => missing.essential.push(category),
            PriorityTier::Important => missing.important.push(category),
            PriorityTier::Recommended => missing.recommended.push(category),
        }
    }

    missing
}

fn stocked_categories(items: &[InventoryItem]) -> HashSet<Category> {
    items
        .iter()
        .filter(|item| !item.archived && item.quantity > 0)
        .map(|item| item.category.clone())
        .collect()
}

/// Rounded percentage, 100 when the denominator is zero.
fn percentage(numerator: u64, denominator: u64) -> u32 {
    if denominator == 0 {
        return 100;
    }
    (numerator as f64 * 100.0 / denominator as f64).round() as u32
}
