pub mod config;

pub use config::{
    load_settings, load_settings_from, DatabaseSettings, DrupalSettings, MoodleSettings,
    OperationSettings, Settings, SettingsError, StorageSettings,
};
