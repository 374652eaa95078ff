//! Weekly digest notifications.
//!
//! # Overview
//!
//! [`Notifier::run_weekly_report`] is the batch job behind the cron trigger.
//! For every team it:
//!
//! 1. Checks the skip conditions (notifications off, weekly report off, still
//!    inside the 7-day cooldown, no linked recipients, nothing to report).
//! 2. Re-derives the out-of-stock, low-stock and expiring-soon lists from the
//!    team's non-archived items, and counts recent system auto-archives.
//! 3. Composes one text digest and pushes it to every recipient.
//!
//! Teams are processed one after another. Sends to the recipients of one team
//! run concurrently and each comes back as a [`DeliveryOutcome`] value, so one
//! failing recipient never stops the others.
//!
//! After every team has been processed, all teams that got a digest have their
//! watermark written in a single batch. A team is watermarked once a digest was
//! attempted, whether or not every send succeeded.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calculator::compute_status;
use crate::catalog::{Category, ExpiryClass};
use crate::model::{InventoryItem, StatusTier, Team};
use crate::push::{PushClient, PushError};
use crate::storage::Storage;

/// Minimum time between two digests for the same team.
pub const COOLDOWN_DAYS: i64 = 7;

/// How far back auto-archived items are counted.
pub const ARCHIVE_LOOKBACK_DAYS: i64 = 7;

/// Entries shown per capped section before the "more" line.
const SECTION_PREVIEW: usize = 3;

/// Expiry dates are judged against the calendar day in JST.
const REPORT_UTC_OFFSET_HOURS: i64 = 9;

/// Why a team was left out of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotificationsDisabled,
    WeeklyReportDisabled,
    CoolingDown,
    NoRecipients,
    NothingToReport,
}

/// An item that is out of stock or running low.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockAlert {
    pub item_id: String,
    pub name: String,
    pub category: Category,
    pub status: StatusTier,
    pub days_remaining: f64,
}

/// An item whose expiry date falls inside its category's lead time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpiryAlert {
    pub item_id: String,
    pub name: String,
    pub category: Category,
    pub expiry_date: NaiveDate,
    pub days_remaining: i64,
}

/// Everything one team's digest is built from. Built fresh every run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamNotificationBatch {
    pub team_id: String,
    pub team_name: String,
    pub recipients: Vec<String>,
    pub out_of_stock: Vec<StockAlert>,
    pub low_stock: Vec<StockAlert>,
    /// Sorted by `days_remaining`, soonest first.
    pub expiring: Vec<ExpiryAlert>,
    pub auto_archived: i64,
}

impl TeamNotificationBatch {
    pub fn has_content(&self) -> bool {
        !self.out_of_stock.is_empty()
            || !self.low_stock.is_empty()
            || !self.expiring.is_empty()
            || self.auto_archived > 0
    }
}

/// Result of pushing a digest to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub recipient: String,
    pub result: DeliveryResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered,
    /// The recipient has not accepted messages from the provider.
    NotAccepting,
    Failed(String),
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub teams_evaluated: usize,
    pub teams_sent: usize,
    pub teams_skipped: usize,
    pub delivered: usize,
    pub not_accepting: usize,
    pub failed: usize,
}

impl DispatchSummary {
    fn record_deliveries(&mut self, outcomes: &[DeliveryOutcome]) {
        for outcome in outcomes {
            match outcome.result {
                DeliveryResult::Delivered => self.delivered += 1,
                DeliveryResult::NotAccepting => self.not_accepting += 1,
                DeliveryResult::Failed(_) => self.failed += 1,
            }
        }
    }
}

/// Check the settings-only skip conditions.
pub fn check_eligibility(team: &Team, now: DateTime<Utc>) -> Result<(), SkipReason> {
    let notifications = &team.settings.notifications;

    if !notifications.enabled {
        return Err(SkipReason::NotificationsDisabled);
    }
    if !notifications.weekly_report {
        return Err(SkipReason::WeeklyReportDisabled);
    }
    if let Some(last) = team.last_notified_at {
        if now - last < Duration::days(COOLDOWN_DAYS) {
            return Err(SkipReason::CoolingDown);
        }
    }

    Ok(())
}

/// The calendar day expiry dates are compared against.
pub fn report_date(now: DateTime<Utc>) -> NaiveDate {
    (now + Duration::hours(REPORT_UTC_OFFSET_HOURS)).date_naive()
}

/// Classify an item as expiring soon.
///
/// The item qualifies when it is in stock and its expiry date falls strictly
/// between `today` and `today + lead time` for its category.
pub fn expiry_alert(item: &InventoryItem, today: NaiveDate) -> Option<ExpiryAlert> {
    if item.quantity == 0 {
        return None;
    }
    let expiry_date = item.expiry_date?;
    let lead_days = ExpiryClass::classify(&item.category).lead_days()?;

    let days_remaining = (expiry_date - today).num_days();
    if days_remaining <= 0 || days_remaining >= lead_days {
        return None;
    }

    Some(ExpiryAlert {
        item_id: item.id.clone(),
        name: item.name.clone(),
        category: item.category.clone(),
        expiry_date,
        days_remaining,
    })
}

/// Derive one team's digest content from its items.
pub fn build_batch(
    team: &Team,
    recipients: Vec<String>,
    items: &[InventoryItem],
    auto_archived: i64,
    today: NaiveDate,
) -> TeamNotificationBatch {
    let settings = &team.settings;
    let toggles = settings.notifications;

    let mut out_of_stock = Vec::new();
    let mut low_stock = Vec::new();
    let mut expiring = Vec::new();

    for item in items.iter().filter(|item| !item.archived) {
        let status = compute_status(item, settings);
        let alert = || StockAlert {
            item_id: item.id.clone(),
            name: item.name.clone(),
            category: item.category.clone(),
            status: status.status,
            days_remaining: status.days_remaining,
        };

        match status.status {
            StatusTier::Out if toggles.out_of_stock => out_of_stock.push(alert()),
            StatusTier::Critical | StatusTier::Low if toggles.low_stock => low_stock.push(alert()),
            _ => {}
        }

        if toggles.expiry {
            if let Some(alert) = expiry_alert(item, today) {
                expiring.push(alert);
            }
        }
    }

    expiring.sort_by_key(|alert| alert.days_remaining);

    TeamNotificationBatch {
        team_id: team.id.clone(),
        team_name: team.name.clone(),
        recipients,
        out_of_stock,
        low_stock,
        expiring,
        auto_archived,
    }
}

/// Urgency marker for an expiring item.
pub fn urgency_marker(days_remaining: i64) -> &'static str {
    if days_remaining <= 3 {
        "🔴"
    } else if days_remaining <= 7 {
        "🟡"
    } else {
        "🟢"
    }
}

/// Render the digest text for one team.
pub fn compose_digest(batch: &TeamNotificationBatch, app_url: &str) -> String {
    let mut sections = vec![format!("【備蓄レポート】{}", batch.team_name)];

    if !batch.out_of_stock.is_empty() {
        let mut lines = vec![format!("■ 在庫切れ（{}件）", batch.out_of_stock.len())];
        lines.extend(
            batch
                .out_of_stock
                .iter()
                .take(SECTION_PREVIEW)
                .map(|alert| format!("・{}（{}）", alert.name, alert.category)),
        );
        push_more_line(&mut lines, batch.out_of_stock.len());
        sections.push(lines.join("\n"));
    }

    if !batch.low_stock.is_empty() {
        let mut lines = vec![format!("■ 残りわずか（{}件）", batch.low_stock.len())];
        lines.extend(
            batch
                .low_stock
                .iter()
                .take(SECTION_PREVIEW)
                .map(|alert| format!("・{}: 残り{:.1}日分", alert.name, alert.days_remaining)),
        );
        push_more_line(&mut lines, batch.low_stock.len());
        sections.push(lines.join("\n"));
    }

    if !batch.expiring.is_empty() {
        let mut lines = vec![format!("■ 期限が近いもの（{}件）", batch.expiring.len())];
        lines.extend(batch.expiring.iter().take(SECTION_PREVIEW).map(|alert| {
            format!(
                "{} {}: あと{}日（{}）",
                urgency_marker(alert.days_remaining),
                alert.name,
                alert.days_remaining,
                alert.expiry_date.format("%m/%d")
            )
        }));
        push_more_line(&mut lines, batch.expiring.len());
        sections.push(lines.join("\n"));
    }

    if batch.auto_archived > 0 {
        sections.push(format!(
            "■ 自動アーカイブ\n過去{}日間に{}件のアイテムが自動でアーカイブされました",
            ARCHIVE_LOOKBACK_DAYS, batch.auto_archived
        ));
    }

    sections.push(format!(
        "▼ 詳しくはこちら\n{}/teams/{}/inventory",
        app_url,
        urlencoding::encode(&batch.team_id)
    ));

    sections.join("\n\n")
}

fn push_more_line(lines: &mut Vec<String>, total: usize) {
    if total > SECTION_PREVIEW {
        lines.push(format!("・ほか{}件", total - SECTION_PREVIEW));
    }
}

/// Runs the weekly digest over every team.
#[derive(Clone)]
pub struct Notifier {
    storage: Storage,
    push: Arc<dyn PushClient>,
    app_url: String,
}

impl Notifier {
    pub fn new(storage: Storage, push: Arc<dyn PushClient>, app_url: &str) -> Self {
        Self {
            storage,
            push,
            app_url: app_url.trim_end_matches('/').to_string(),
        }
    }

    /// Run one weekly digest batch.
    ///
    /// Fails only when the run cannot start: listing teams or authorizing with
    /// the push provider. In that case nothing is sent and no watermark is
    /// written. Per-team and per-recipient failures are logged and skipped.
    pub async fn run_weekly_report(&self, now: DateTime<Utc>) -> anyhow::Result<DispatchSummary> {
        let teams = self.storage.list_teams().await?;
        self.push.prepare().await?;

        let today = report_date(now);
        let mut summary = DispatchSummary::default();
        let mut notified = Vec::new();

        for team in &teams {
            summary.teams_evaluated += 1;

            let batch = match self.evaluate_team(team, now, today).await {
                Ok(Ok(batch)) => batch,
                Ok(Err(reason)) => {
                    debug!(team_id = %team.id, reason = ?reason, "Team skipped");
                    summary.teams_skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(team_id = %team.id, error = %e, "Failed to evaluate team");
                    summary.teams_skipped += 1;
                    continue;
                }
            };

            let message = compose_digest(&batch, &self.app_url);
            let outcomes = self.deliver(&batch.recipients, &message).await;
            log_outcomes(&team.id, &outcomes);
            summary.record_deliveries(&outcomes);

            info!(
                team_id = %team.id,
                recipients = batch.recipients.len(),
                out_of_stock = batch.out_of_stock.len(),
                low_stock = batch.low_stock.len(),
                expiring = batch.expiring.len(),
                auto_archived = batch.auto_archived,
                "Weekly digest dispatched"
            );
            notified.push(team.id.clone());
        }

        self.storage.mark_notified(&notified, now).await?;
        summary.teams_sent = notified.len();

        info!(
            teams_evaluated = summary.teams_evaluated,
            teams_sent = summary.teams_sent,
            teams_skipped = summary.teams_skipped,
            delivered = summary.delivered,
            not_accepting = summary.not_accepting,
            failed = summary.failed,
            "Weekly report run complete"
        );

        Ok(summary)
    }

    /// Build a team's batch, or say why the team is skipped.
    async fn evaluate_team(
        &self,
        team: &Team,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> anyhow::Result<Result<TeamNotificationBatch, SkipReason>> {
        if let Err(reason) = check_eligibility(team, now) {
            return Ok(Err(reason));
        }

        let recipients = self.storage.recipients_for_team(&team.id).await?;
        if recipients.is_empty() {
            return Ok(Err(SkipReason::NoRecipients));
        }

        let items = self.storage.list_active_items(&team.id).await?;
        let auto_archived = self
            .storage
            .count_auto_archived_since(&team.id, now - Duration::days(ARCHIVE_LOOKBACK_DAYS))
            .await?;

        let batch = build_batch(team, recipients, &items, auto_archived, today);
        if !batch.has_content() {
            return Ok(Err(SkipReason::NothingToReport));
        }

        Ok(Ok(batch))
    }

    /// Push `message` to every recipient concurrently.
    async fn deliver(&self, recipients: &[String], message: &str) -> Vec<DeliveryOutcome> {
        let message: Arc<str> = Arc::from(message);

        let handles: Vec<_> = recipients
            .iter()
            .map(|recipient| {
                let push = Arc::clone(&self.push);
                let message = Arc::clone(&message);
                let to = recipient.clone();
                let handle = tokio::spawn(async move {
                    match push.push_text(&to, &message).await {
                        Ok(()) => DeliveryResult::Delivered,
                        Err(PushError::NotAccepting(_)) => DeliveryResult::NotAccepting,
                        Err(e) => DeliveryResult::Failed(e.to_string()),
                    }
                });
                (recipient.clone(), handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (recipient, handle) in handles {
            let result = handle
                .await
                .unwrap_or_else(|e| DeliveryResult::Failed(e.to_string()));
            outcomes.push(DeliveryOutcome { recipient, result });
        }
        outcomes
    }
}

fn log_outcomes(team_id: &str, outcomes: &[DeliveryOutcome]) {
    for outcome in outcomes {
        match &outcome.result {
            DeliveryResult::Delivered => {}
            DeliveryResult::NotAccepting => info!(
                team_id = %team_id,
                recipient = %outcome.recipient,
                "Recipient has not accepted messages"
            ),
            DeliveryResult::Failed(error) => warn!(
                team_id = %team_id,
                recipient = %outcome.recipient,
                error = %error,
                "Failed to push weekly digest"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::model::{MemberRole, NotificationSettings, TeamStockSettings};
    use crate::storage::{ACTION_AUTO_ARCHIVED, ACTOR_SYSTEM};

    #[derive(Default)]
    struct RecordingPush {
        sent: Mutex<Vec<(String, String)>>,
        fail_prepare: bool,
    }

    #[async_trait]
    impl PushClient for RecordingPush {
        async fn prepare(&self) -> Result<(), PushError> {
            if self.fail_prepare {
                return Err(PushError::Unauthorized("bad credentials".to_string()));
            }
            Ok(())
        }

        async fn push_text(&self, recipient: &str, text: &str) -> Result<(), PushError> {
            match recipient {
                "U-blocked" => Err(PushError::NotAccepting(recipient.to_string())),
                "U-broken" => Err(PushError::Rejected {
                    status: 500,
                    message: "internal".to_string(),
                }),
                _ => {
                    self.sent
                        .lock()
                        .unwrap()
                        .push((recipient.to_string(), text.to_string()));
                    Ok(())
                }
            }
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap()
    }

    fn today() -> NaiveDate {
        report_date(now())
    }

    fn team(id: &str) -> Team {
        Team {
            id: id.to_string(),
            name: format!("{id}家"),
            settings: TeamStockSettings {
                household_size: 4,
                ..TeamStockSettings::default()
            },
            last_notified_at: None,
        }
    }

    fn item(id: &str, category: Category, quantity: u32) -> InventoryItem {
        InventoryItem {
            id: id.to_string(),
            team_id: "team-a".to_string(),
            name: id.to_string(),
            category,
            quantity,
            unit: "個".to_string(),
            expiry_date: None,
            archived: false,
        }
    }

    fn expiring(id: &str, category: Category, days: i64) -> InventoryItem {
        InventoryItem {
            expiry_date: Some(today() + Duration::days(days)),
            ..item(id, category, 1)
        }
    }

    #[test]
    fn test_cooldown() {
        let mut recent = team("team-a");
        recent.last_notified_at = Some(now() - Duration::days(3));
        assert_eq!(check_eligibility(&recent, now()), Err(SkipReason::CoolingDown));

        let mut stale = team("team-a");
        stale.last_notified_at = Some(now() - Duration::days(8));
        assert_eq!(check_eligibility(&stale, now()), Ok(()));

        let mut exact = team("team-a");
        exact.last_notified_at = Some(now() - Duration::days(COOLDOWN_DAYS));
        assert_eq!(check_eligibility(&exact, now()), Ok(()));

        assert_eq!(check_eligibility(&team("team-a"), now()), Ok(()));
    }

    #[test]
    fn test_disabled_toggles() {
        let mut off = team("team-a");
        off.settings.notifications.enabled = false;
        assert_eq!(
            check_eligibility(&off, now()),
            Err(SkipReason::NotificationsDisabled)
        );

        let mut no_weekly = team("team-a");
        no_weekly.settings.notifications.weekly_report = false;
        assert_eq!(
            check_eligibility(&no_weekly, now()),
            Err(SkipReason::WeeklyReportDisabled)
        );
    }

    #[test]
    fn test_expiry_classifier_examples() {
        let medicine = expiring("薬", Category::Medicine, 45);
        let alert = expiry_alert(&medicine, today()).unwrap();
        assert_eq!(alert.days_remaining, 45);

        let misc = expiring("雑貨", Category::Other, 1);
        assert!(expiry_alert(&misc, today()).is_none());
    }

    #[test]
    fn test_expiry_window_is_exclusive() {
        // food lead time is 30 days
        assert!(expiry_alert(&expiring("a", Category::Canned, 29), today()).is_some());
        assert!(expiry_alert(&expiring("b", Category::Canned, 30), today()).is_none());
        assert!(expiry_alert(&expiring("c", Category::Canned, 0), today()).is_none());
        assert!(expiry_alert(&expiring("d", Category::Canned, -5), today()).is_none());

        let empty = InventoryItem {
            quantity: 0,
            ..expiring("e", Category::Canned, 5)
        };
        assert!(expiry_alert(&empty, today()).is_none());
    }

    #[test]
    fn test_build_batch_respects_toggles() {
        let items = vec![
            item("水", Category::Water, 0),
            item("米", Category::RiceBread, 2),
            item("缶", Category::Canned, 100),
            InventoryItem {
                quantity: 10,
                ..expiring("薬", Category::Medicine, 10)
            },
        ];

        let all = build_batch(&team("team-a"), vec![], &items, 0, today());
        assert_eq!(all.out_of_stock.len(), 1);
        assert_eq!(all.low_stock.len(), 1);
        assert_eq!(all.low_stock[0].status, StatusTier::Critical);
        assert_eq!(all.expiring.len(), 1);

        let mut quiet = team("team-a");
        quiet.settings.notifications = NotificationSettings {
            out_of_stock: false,
            low_stock: false,
            expiry: false,
            ..NotificationSettings::default()
        };
        let none = build_batch(&quiet, vec![], &items, 0, today());
        assert!(!none.has_content());

        let archived_only = build_batch(&quiet, vec![], &items, 2, today());
        assert!(archived_only.has_content());
    }

    #[test]
    fn test_build_batch_sorts_expiring() {
        let items = vec![
            expiring("c", Category::Batteries, 80),
            expiring("a", Category::Water, 2),
            expiring("b", Category::Medicine, 20),
        ];

        let batch = build_batch(&team("team-a"), vec![], &items, 0, today());
        let days: Vec<_> = batch.expiring.iter().map(|a| a.days_remaining).collect();
        assert_eq!(days, vec![2, 20, 80]);
    }

    #[test]
    fn test_compose_digest_caps_sections() {
        let low: Vec<_> = (0..5)
            .map(|i| StockAlert {
                item_id: format!("low-{i}"),
                name: format!("低{i}"),
                category: Category::Water,
                status: StatusTier::Low,
                days_remaining: 2.0,
            })
            .collect();
        let expiring: Vec<_> = [2, 6, 20, 25]
            .into_iter()
            .map(|days| ExpiryAlert {
                item_id: format!("exp-{days}"),
                name: format!("期限{days}"),
                category: Category::Canned,
                expiry_date: today() + Duration::days(days),
                days_remaining: days,
            })
            .collect();
        let batch = TeamNotificationBatch {
            team_id: "team a".to_string(),
            team_name: "山田家".to_string(),
            recipients: vec!["U-1".to_string()],
            out_of_stock: (0..4)
                .map(|i| StockAlert {
                    item_id: format!("out-{i}"),
                    name: format!("保存水{i}"),
                    category: Category::Water,
                    status: StatusTier::Out,
                    days_remaining: 0.0,
                })
                .collect(),
            low_stock: low,
            expiring,
            auto_archived: 3,
        };

        let text = compose_digest(&batch, "https://sonae.example");

        assert!(text.starts_with("【備蓄レポート】山田家"));
        assert!(text.contains("■ 在庫切れ（4件）\n・保存水0（水）"));
        assert!(text.contains("・保存水2（水）\n・ほか1件"));
        assert!(!text.contains("保存水3"));
        assert!(text.contains("■ 残りわずか（5件）"));
        assert!(text.contains("・低2: 残り2.0日分\n・ほか2件"));
        assert!(!text.contains("低3"));
        assert!(text.contains("🔴 期限2: あと2日"));
        assert!(text.contains("🟡 期限6: あと6日"));
        assert!(text.contains("🟢 期限20: あと20日"));
        assert!(!text.contains("期限25"));
        assert!(text.contains("）\n・ほか1件\n\n■ 自動アーカイブ"));
        assert!(text.contains("3件のアイテムが自動でアーカイブされました"));
        assert!(text.ends_with("https://sonae.example/teams/team%20a/inventory"));
    }

    #[test]
    fn test_compose_digest_omits_empty_sections() {
        let batch = TeamNotificationBatch {
            team_id: "t".to_string(),
            team_name: "T".to_string(),
            recipients: vec![],
            out_of_stock: vec![],
            low_stock: vec![],
            expiring: vec![],
            auto_archived: 1,
        };

        let text = compose_digest(&batch, "http://localhost:3000");

        assert!(!text.contains("在庫切れ"));
        assert!(!text.contains("残りわずか"));
        assert!(!text.contains("期限が近い"));
        assert!(text.contains("自動アーカイブ"));
    }

    #[test]
    fn test_urgency_marker_thresholds() {
        assert_eq!(urgency_marker(1), "🔴");
        assert_eq!(urgency_marker(3), "🔴");
        assert_eq!(urgency_marker(4), "🟡");
        assert_eq!(urgency_marker(7), "🟡");
        assert_eq!(urgency_marker(8), "🟢");
    }

    async fn seeded_storage() -> Storage {
        let storage = Storage::new("sqlite::memory:").await.unwrap();

        // team-a: two good recipients, one blocked, one broken; has alerts
        storage.insert_team(&team("team-a")).await.unwrap();
        for (user, recipient) in [
            ("a1", "U-a1"),
            ("a2", "U-a2"),
            ("a3", "U-blocked"),
            ("a4", "U-broken"),
        ] {
            storage.add_member("team-a", user, MemberRole::Member).await.unwrap();
            storage.link_push_recipient(user, recipient).await.unwrap();
        }
        storage.add_member("team-a", "a5", MemberRole::Admin).await.unwrap();
        storage
            .insert_item(&item("水", Category::Water, 0))
            .await
            .unwrap();

        // team-b: weekly report disabled
        let mut quiet = team("team-b");
        quiet.settings.notifications.weekly_report = false;
        storage.insert_team(&quiet).await.unwrap();
        storage.add_member("team-b", "b1", MemberRole::Owner).await.unwrap();
        storage.link_push_recipient("b1", "U-b1").await.unwrap();
        storage
            .insert_item(&InventoryItem {
                team_id: "team-b".to_string(),
                ..item("b-water", Category::Water, 0)
            })
            .await
            .unwrap();

        // team-c: fully stocked, nothing to report
        storage.insert_team(&team("team-c")).await.unwrap();
        storage.add_member("team-c", "c1", MemberRole::Owner).await.unwrap();
        storage.link_push_recipient("c1", "U-c1").await.unwrap();
        storage
            .insert_item(&InventoryItem {
                team_id: "team-c".to_string(),
                ..item("c-rice", Category::RiceBread, 200)
            })
            .await
            .unwrap();

        // team-d: alerts but nobody linked
        storage.insert_team(&team("team-d")).await.unwrap();
        storage.add_member("team-d", "d1", MemberRole::Owner).await.unwrap();
        storage
            .insert_item(&InventoryItem {
                team_id: "team-d".to_string(),
                ..item("d-water", Category::Water, 0)
            })
            .await
            .unwrap();

        // team-e: only auto-archived history to report
        storage.insert_team(&team("team-e")).await.unwrap();
        storage.add_member("team-e", "e1", MemberRole::Owner).await.unwrap();
        storage.link_push_recipient("e1", "U-e1").await.unwrap();
        storage
            .record_history("team-e", "old", ACTION_AUTO_ARCHIVED, ACTOR_SYSTEM, now() - Duration::days(1))
            .await
            .unwrap();

        storage
    }

    #[tokio::test]
    async fn test_run_weekly_report_isolates_failures() {
        let storage = seeded_storage().await;
        let push = Arc::new(RecordingPush::default());
        let notifier = Notifier::new(storage.clone(), push.clone(), "https://sonae.example");

        let summary = notifier.run_weekly_report(now()).await.unwrap();

        assert_eq!(summary.teams_evaluated, 5);
        assert_eq!(summary.teams_sent, 2);
        assert_eq!(summary.teams_skipped, 3);
        assert_eq!(summary.delivered, 3);
        assert_eq!(summary.not_accepting, 1);
        assert_eq!(summary.failed, 1);

        let mut recipients: Vec<_> = push
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(r, _)| r.clone())
            .collect();
        recipients.sort();
        assert_eq!(recipients, vec!["U-a1", "U-a2", "U-e1"]);

        let teams = storage.list_teams().await.unwrap();
        let watermark = |id: &str| {
            teams
                .iter()
                .find(|t| t.id == id)
                .and_then(|t| t.last_notified_at)
        };
        // watermarked despite the failed sends
        assert_eq!(watermark("team-a"), Some(now()));
        assert_eq!(watermark("team-b"), None);
        assert_eq!(watermark("team-c"), None);
        assert_eq!(watermark("team-d"), None);
        assert_eq!(watermark("team-e"), Some(now()));
    }

    #[tokio::test]
    async fn test_second_run_within_cooldown_is_noop() {
        let storage = seeded_storage().await;
        let push = Arc::new(RecordingPush::default());
        let notifier = Notifier::new(storage, push.clone(), "https://sonae.example");

        notifier.run_weekly_report(now()).await.unwrap();
        let sent_first = push.sent.lock().unwrap().len();

        let summary = notifier
            .run_weekly_report(now() + Duration::days(2))
            .await
            .unwrap();

        assert_eq!(summary.teams_sent, 0);
        assert_eq!(push.sent.lock().unwrap().len(), sent_first);

        let summary = notifier
            .run_weekly_report(now() + Duration::days(8))
            .await
            .unwrap();
        assert_eq!(summary.teams_sent, 1);
    }

    #[tokio::test]
    async fn test_unreadable_team_does_not_block_others() {
        let storage = seeded_storage().await;
        sqlx::query(
            "INSERT INTO teams (id, name, settings) VALUES ('team-0', 'broken', '{\"household_size\": -1}')",
        )
        .execute(storage.pool())
        .await
        .unwrap();
        storage.add_member("team-0", "z1", MemberRole::Owner).await.unwrap();
        storage.link_push_recipient("z1", "U-z1").await.unwrap();

        let push = Arc::new(RecordingPush::default());
        let notifier = Notifier::new(storage, push.clone(), "https://sonae.example");

        let summary = notifier.run_weekly_report(now()).await.unwrap();

        assert_eq!(summary.teams_sent, 2);
        let sent = push.sent.lock().unwrap();
        assert!(sent.iter().any(|(r, _)| r == "U-a1"));
        assert!(sent.iter().all(|(r, _)| r != "U-z1"));
    }

    #[tokio::test]
    async fn test_prepare_failure_aborts_run() {
        let storage = seeded_storage().await;
        let push = Arc::new(RecordingPush {
            fail_prepare: true,
            ..RecordingPush::default()
        });
        let notifier = Notifier::new(storage.clone(), push.clone(), "https://sonae.example");

        assert!(notifier.run_weekly_report(now()).await.is_err());
        assert!(push.sent.lock().unwrap().is_empty());

        let teams = storage.list_teams().await.unwrap();
        assert!(teams.iter().all(|t| t.last_notified_at.is_none()));
    }
}
