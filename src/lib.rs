#![doc = include_str!("../README.md")]

pub mod client;
pub mod config;
pub mod error;
pub mod mirror;
pub mod preferences;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;

// Re-exports for convenient access
pub use client::{
    AlwaysOnline, ApiClient, BleTokenResponse, Connectivity, LoginResponse, NotificationItem,
    NotificationPage, NotificationQuery, RefreshResponse,
};
pub use config::Config;
pub use error::{Error, message_for_code};
pub use mirror::{MirrorQueue, TokenMirror};
pub use preferences::{
    ALLOWED_MARKERS, Category, ExpirationCycle, NotificationSetting, PreferenceStore, Preferences,
    SettingsApi,
};
pub use session::{Session, SessionStore};
pub use storage::{KeyValueStorage, MemoryStorage, keys};
pub use token::{decode_claims, decode_subject};
pub use types::{LoginProvider, TokenPair, TokenUpdate, UserId};
