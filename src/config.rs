use std::env;
use std::sync::{RwLock, RwLockWriteGuard};

pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

const INTENT_GUILDS: u64 = 1 << 0;
const INTENT_GUILD_MEMBERS: u64 = 1 << 1;
const INTENT_GUILD_PRESENCES: u64 = 1 << 8;
const INTENT_GUILD_MESSAGES: u64 = 1 << 9;
const INTENT_DIRECT_MESSAGES: u64 = 1 << 12;
const INTENT_MESSAGE_CONTENT: u64 = 1 << 15;

pub const DEFAULT_INTENTS: u64 = INTENT_GUILDS
    | INTENT_GUILD_MEMBERS
    | INTENT_GUILD_PRESENCES
    | INTENT_GUILD_MESSAGES
    | INTENT_DIRECT_MESSAGES
    | INTENT_MESSAGE_CONTENT;

/// Endpoint configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub api_base_url: String,
    pub gateway_url: String,
    pub intents: u64,
    pub env_token: Option<String>,
}

impl Config {
    pub fn load() -> Self {
        let api_base_url = env::var("DISCORDTERM_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
        let api_base_url = api_base_url.trim_end_matches('/').to_string();

        let gateway_url =
            env::var("DISCORDTERM_GATEWAY_URL").unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string());

        let intents = env::var("DISCORDTERM_INTENTS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_INTENTS);

        let env_token = env::var("DISCORDTERM_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());

        Self {
            api_base_url,
            gateway_url,
            intents,
            env_token,
        }
    }
}

/// How messages and images are drawn. Mutable at runtime through the toggle
/// commands; nothing is persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayOptions {
    pub color_text: bool,
    pub color_images: bool,
    pub show_images: bool,
    pub show_nicknames: bool,
    pub image_width: u32,
    /// 0 derives the height from the image aspect ratio.
    pub image_height: u32,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            color_text: true,
            color_images: false,
            show_images: false,
            show_nicknames: true,
            image_width: 100,
            image_height: 0,
        }
    }
}

/// Shared handle to the display options. Readers take a copy so a render
/// never holds the lock across network calls.
#[derive(Debug, Default)]
pub struct Settings {
    options: RwLock<DisplayOptions>,
}

impl Settings {
    pub fn new(options: DisplayOptions) -> Self {
        Self {
            options: RwLock::new(options),
        }
    }

    pub fn snapshot(&self) -> DisplayOptions {
        *self
            .options
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn update(&self, apply: impl FnOnce(&mut DisplayOptions)) {
        let mut guard = self.write();
        apply(&mut guard);
    }

    fn write(&self) -> RwLockWriteGuard<'_, DisplayOptions> {
        self.options
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_command_line_defaults() {
        let options = DisplayOptions::default();
        assert!(options.color_text);
        assert!(options.show_nicknames);
        assert!(!options.show_images);
        assert!(!options.color_images);
        assert_eq!(options.image_width, 100);
        assert_eq!(options.image_height, 0);
    }

    #[test]
    fn settings_update_is_visible_in_later_snapshots() {
        let settings = Settings::new(DisplayOptions::default());
        let before = settings.snapshot();
        settings.update(|options| options.image_width = 40);
        assert_eq!(before.image_width, 100);
        assert_eq!(settings.snapshot().image_width, 40);
    }

    #[test]
    fn default_intents_include_message_content() {
        assert_ne!(DEFAULT_INTENTS & INTENT_MESSAGE_CONTENT, 0);
        assert_ne!(DEFAULT_INTENTS & INTENT_GUILD_PRESENCES, 0);
    }
}
