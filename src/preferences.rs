use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::Error;
use crate::storage::{KeyValueStorage, keys};

/// Notification category, matching the backend's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    LocationBased,
    ExpiryDate,
    ReceiveGifticon,
    UsageComplete,
    ShareboxGifticon,
    ShareboxUsageComplete,
    ShareboxMemberJoin,
    ShareboxDeleted,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::LocationBased,
        Category::ExpiryDate,
        Category::ReceiveGifticon,
        Category::UsageComplete,
        Category::ShareboxGifticon,
        Category::ShareboxUsageComplete,
        Category::ShareboxMemberJoin,
        Category::ShareboxDeleted,
    ];

    /// Wire name used in endpoint paths and settings payloads.
    #[must_use]
    pub fn as_wire(self) -> &'static str {
        match self {
            Category::LocationBased => "LOCATION_BASED",
            Category::ExpiryDate => "EXPIRY_DATE",
            Category::ReceiveGifticon => "RECEIVE_GIFTICON",
            Category::UsageComplete => "USAGE_COMPLETE",
            Category::ShareboxGifticon => "SHAREBOX_GIFTICON",
            Category::ShareboxUsageComplete => "SHAREBOX_USAGE_COMPLETE",
            Category::ShareboxMemberJoin => "SHAREBOX_MEMBER_JOIN",
            Category::ShareboxDeleted => "SHAREBOX_DELETED",
        }
    }

    /// Parse a wire name. `None` for categories this client does not know
    /// (forward compatibility: the server may add types first).
    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        Category::ALL.into_iter().find(|c| c.as_wire() == s)
    }
}

/// Expiry-notification schedule, as the backend enumerates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpirationCycle {
    OneDay,
    TwoDays,
    ThreeDays,
    OneWeek,
    OneMonth,
    TwoMonths,
    ThreeMonths,
}

/// Local integer markers the UI works in, one per cycle plus the same-day
/// special case `0`.
pub const ALLOWED_MARKERS: [u32; 8] = [0, 1, 2, 3, 7, 30, 60, 90];

impl ExpirationCycle {
    /// Marker → cycle. `0` is the same-day special case, sent as `ONE_DAY`.
    #[must_use]
    pub fn from_marker(marker: u32) -> Option<Self> {
        Some(match marker {
            0 | 1 => ExpirationCycle::OneDay,
            2 => ExpirationCycle::TwoDays,
            3 => ExpirationCycle::ThreeDays,
            7 => ExpirationCycle::OneWeek,
            30 => ExpirationCycle::OneMonth,
            60 => ExpirationCycle::TwoMonths,
            90 => ExpirationCycle::ThreeMonths,
            _ => return None,
        })
    }

    /// Cycle → marker. `ONE_DAY` maps back to `1`, so a server round-trip
    /// normalizes a locally chosen `0`.
    #[must_use]
    pub fn marker(self) -> u32 {
        match self {
            ExpirationCycle::OneDay => 1,
            ExpirationCycle::TwoDays => 2,
            ExpirationCycle::ThreeDays => 3,
            ExpirationCycle::OneWeek => 7,
            ExpirationCycle::OneMonth => 30,
            ExpirationCycle::TwoMonths => 60,
            ExpirationCycle::ThreeMonths => 90,
        }
    }

    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_owned())).ok()
    }
}

/// One entry of the backend's settings list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSetting {
    /// Kept as a string so unknown types survive deserialization.
    pub notification_type: String,
    pub is_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_cycle: Option<String>,
}

/// Remote settings endpoints the preference store drives.
///
/// Implemented by [`ApiClient`](crate::client::ApiClient); tests substitute
/// fakes.
pub trait SettingsApi: Send + Sync + 'static {
    fn list_settings(
        &self,
    ) -> impl Future<Output = Result<Vec<NotificationSetting>, Error>> + Send;

    fn update_category(
        &self,
        category: Category,
        enabled: bool,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn update_expiration_cycle(
        &self,
        cycle: ExpirationCycle,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Snapshot of the notification preferences.
#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    pub nearby_store: bool,
    pub expiry: bool,
    pub gift_sharing: bool,
    pub usage_complete: bool,
    pub sharebox_registration: bool,
    pub sharebox_usage: bool,
    pub sharebox_member_join: bool,
    pub sharebox_deleted: bool,
    /// Expiry-notification interval marker (days; `0` = same day).
    pub expiry_interval: u32,
    /// Message from the last failed operation, for the UI alert.
    pub error: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            nearby_store: false,
            expiry: false,
            gift_sharing: false,
            usage_complete: false,
            sharebox_registration: false,
            sharebox_usage: false,
            sharebox_member_join: false,
            sharebox_deleted: false,
            expiry_interval: 7,
            error: None,
        }
    }
}

impl Preferences {
    #[must_use]
    pub fn flag(&self, category: Category) -> bool {
        match category {
            Category::LocationBased => self.nearby_store,
            Category::ExpiryDate => self.expiry,
            Category::ReceiveGifticon => self.gift_sharing,
            Category::UsageComplete => self.usage_complete,
            Category::ShareboxGifticon => self.sharebox_registration,
            Category::ShareboxUsageComplete => self.sharebox_usage,
            Category::ShareboxMemberJoin => self.sharebox_member_join,
            Category::ShareboxDeleted => self.sharebox_deleted,
        }
    }

    fn set_flag(&mut self, category: Category, enabled: bool) {
        match category {
            Category::LocationBased => self.nearby_store = enabled,
            Category::ExpiryDate => self.expiry = enabled,
            Category::ReceiveGifticon => self.gift_sharing = enabled,
            Category::UsageComplete => self.usage_complete = enabled,
            Category::ShareboxGifticon => self.sharebox_registration = enabled,
            Category::ShareboxUsageComplete => self.sharebox_usage = enabled,
            Category::ShareboxMemberJoin => self.sharebox_member_join = enabled,
            Category::ShareboxDeleted => self.sharebox_deleted = enabled,
        }
    }
}

/// Mutable field identity for stale-response suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Flag(Category),
    Interval,
}

#[derive(Default)]
struct SeqState {
    next: u64,
    latest: HashMap<Field, u64>,
}

/// Per-category notification toggles and the expiry interval, synchronized
/// with the backend settings service.
///
/// Mutations are optimistic: the store flips the field immediately, commits
/// on server confirmation, and reverts on failure. Overlapping mutations of
/// the same field carry a sequence number; only the latest-issued mutation
/// may commit or revert, so an out-of-order response can never overwrite a
/// newer one.
pub struct PreferenceStore<S: KeyValueStorage, A: SettingsApi> {
    storage: S,
    api: A,
    seq: Mutex<SeqState>,
    tx: watch::Sender<Preferences>,
}

impl<S: KeyValueStorage, A: SettingsApi> PreferenceStore<S, A> {
    #[must_use]
    pub fn new(storage: S, api: A) -> Self {
        let (tx, _rx) = watch::channel(Preferences::default());
        Self {
            storage,
            api,
            seq: Mutex::new(SeqState::default()),
            tx,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Preferences {
        self.tx.borrow().clone()
    }

    /// Last recorded error message, if any.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.tx.borrow().error.clone()
    }

    /// Watch the preferences for changes (UI binding point).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Preferences> {
        self.tx.subscribe()
    }

    /// Reconcile local state against the backend settings list.
    ///
    /// Unknown categories and unrecognized cycle values are logged and
    /// skipped; known ones still apply. On success the expiry interval is
    /// also mirrored to the durable cache. On failure the existing state is
    /// left untouched and the error message recorded.
    pub async fn fetch_from_server(&self) -> bool {
        let settings = match self.api.list_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!(error = %e, "failed to fetch notification settings");
                let message = e.user_message();
                self.tx.send_modify(|prefs| prefs.error = Some(message));
                return false;
            }
        };

        let mut interval_to_cache = None;
        self.tx.send_modify(|prefs| {
            for setting in &settings {
                let Some(category) = Category::from_wire(&setting.notification_type) else {
                    tracing::warn!(
                        notification_type = %setting.notification_type,
                        "unknown notification category from server"
                    );
                    continue;
                };
                prefs.set_flag(category, setting.is_enabled);

                if category == Category::ExpiryDate && setting.is_enabled {
                    if let Some(raw) = setting.expiration_cycle.as_deref() {
                        match ExpirationCycle::from_wire(raw) {
                            Some(cycle) => {
                                prefs.expiry_interval = cycle.marker();
                                interval_to_cache = Some(cycle.marker());
                            }
                            None => {
                                tracing::warn!(cycle = %raw, "unrecognized expiration cycle");
                            }
                        }
                    }
                }
            }
            prefs.error = None;
        });

        if let Some(marker) = interval_to_cache {
            if let Err(e) = self
                .storage
                .set(keys::EXPIRY_INTERVAL, &marker.to_string())
                .await
            {
                tracing::warn!(error = %e, "failed to cache expiry interval locally");
            }
        }
        true
    }

    /// Enable or disable one notification category.
    ///
    /// The flip is applied optimistically, committed on server success and
    /// reverted on failure (with the error message recorded). Returns the
    /// server-confirmed outcome.
    pub async fn set_category_enabled(&self, category: Category, enabled: bool) -> bool {
        let (seq, prev) = self.begin_flag_update(category, enabled);
        let result = self.api.update_category(category, enabled).await;
        self.finish_flag_update(category, seq, prev, result)
    }

    /// Change the expiry-notification interval.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInterval`] before any network call if the
    /// marker is outside [`ALLOWED_MARKERS`]. Server failures are reported
    /// as `Ok(false)` with the error message recorded.
    pub async fn set_interval(&self, marker: u32) -> Result<bool, Error> {
        if !ALLOWED_MARKERS.contains(&marker) {
            return Err(Error::InvalidInterval(marker));
        }
        let cycle =
            ExpirationCycle::from_marker(marker).ok_or(Error::InvalidInterval(marker))?;

        let seq = self.issue(Field::Interval);
        match self.api.update_expiration_cycle(cycle).await {
            Ok(()) => {
                if !self.is_latest(Field::Interval, seq) {
                    tracing::debug!(marker, "stale interval response suppressed");
                    return Ok(true);
                }
                self.tx.send_modify(|prefs| {
                    prefs.expiry_interval = marker;
                    prefs.error = None;
                });
                if let Err(e) = self
                    .storage
                    .set(keys::EXPIRY_INTERVAL, &marker.to_string())
                    .await
                {
                    tracing::warn!(error = %e, "failed to cache expiry interval locally");
                }
                Ok(true)
            }
            Err(e) => {
                tracing::error!(error = %e, marker, "failed to update expiration cycle");
                if self.is_latest(Field::Interval, seq) {
                    let message = e.user_message();
                    self.tx.send_modify(|prefs| prefs.error = Some(message));
                }
                Ok(false)
            }
        }
    }

    /// Fast-path default at startup: read the cached interval before the
    /// authoritative fetch completes. Returns the effective interval.
    pub async fn load_local_interval(&self) -> u32 {
        match self.storage.get(keys::EXPIRY_INTERVAL).await {
            Ok(Some(raw)) => match raw.parse::<u32>() {
                Ok(marker) if ALLOWED_MARKERS.contains(&marker) => {
                    self.tx.send_modify(|prefs| prefs.expiry_interval = marker);
                    marker
                }
                _ => {
                    tracing::warn!(value = %raw, "ignoring invalid cached expiry interval");
                    self.tx.borrow().expiry_interval
                }
            },
            Ok(None) => self.tx.borrow().expiry_interval,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read cached expiry interval");
                self.tx.borrow().expiry_interval
            }
        }
    }

    fn issue(&self, field: Field) -> u64 {
        let mut seq = self.seq.lock().expect("seq lock");
        seq.next += 1;
        let n = seq.next;
        seq.latest.insert(field, n);
        n
    }

    fn is_latest(&self, field: Field, n: u64) -> bool {
        self.seq.lock().expect("seq lock").latest.get(&field) == Some(&n)
    }

    /// Optimistic phase of a toggle: issue the sequence number and flip the
    /// flag, remembering the pre-call value for rollback.
    fn begin_flag_update(&self, category: Category, enabled: bool) -> (u64, bool) {
        let seq = self.issue(Field::Flag(category));
        let mut prev = enabled;
        self.tx.send_modify(|prefs| {
            prev = prefs.flag(category);
            prefs.set_flag(category, enabled);
            prefs.error = None;
        });
        (seq, prev)
    }

    /// Confirmation phase: commit or revert, unless a newer mutation of the
    /// same flag was issued in the meantime.
    fn finish_flag_update(
        &self,
        category: Category,
        seq: u64,
        prev: bool,
        result: Result<(), Error>,
    ) -> bool {
        let latest = self.is_latest(Field::Flag(category), seq);
        match result {
            Ok(()) => {
                if latest {
                    tracing::debug!(category = %category.as_wire(), "toggle committed");
                } else {
                    tracing::debug!(
                        category = %category.as_wire(),
                        "stale toggle response suppressed"
                    );
                }
                true
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    category = %category.as_wire(),
                    "toggle rejected by server"
                );
                if latest {
                    let message = e.user_message();
                    self.tx.send_modify(|prefs| {
                        prefs.set_flag(category, prev);
                        prefs.error = Some(message);
                    });
                }
                false
            }
        }
    }
}
