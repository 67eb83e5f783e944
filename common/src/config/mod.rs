mod file;
mod settings;

pub use file::{load_settings, load_settings_from, CONFIG_PATHS};
pub use settings::{
    DatabaseSettings, DrupalSettings, MoodleSettings, OperationSettings, Settings, SettingsError,
    StorageSettings,
};
