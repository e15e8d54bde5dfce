pub mod settings;

pub use settings::{BuildConfig, BuildSettings, ServeSettings, SnapConfig, UiConfig, VerifySettings, WatchSettings};
