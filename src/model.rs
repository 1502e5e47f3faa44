//! Serde views of the chat platform objects the client reads.
//!
//! Only the fields the client renders or routes on are declared; everything
//! else in the payloads is ignored.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const CDN_BASE_URL: &str = "https://cdn.discordapp.com";

const CHANNEL_TYPE_GUILD_VOICE: u8 = 2;
const CHANNEL_TYPE_GUILD_STAGE_VOICE: u8 = 13;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    pub fn avatar_url(&self, size: u32) -> String {
        match self.avatar.as_deref() {
            Some(hash) if !hash.is_empty() => {
                let ext = if hash.starts_with("a_") { "gif" } else { "png" };
                format!("{CDN_BASE_URL}/avatars/{}/{hash}.{ext}?size={size}", self.id)
            }
            _ => {
                let index = self
                    .discriminator
                    .parse::<u64>()
                    .ok()
                    .filter(|value| *value != 0)
                    .map(|value| value % 5)
                    .unwrap_or_else(|| (self.id.parse::<u64>().unwrap_or(0) >> 22) % 6);
                format!("{CDN_BASE_URL}/embed/avatars/{index}.png")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: u8,
    #[serde(default)]
    pub position: i32,
}

impl Channel {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn is_voice(&self) -> bool {
        matches!(self.kind, CHANNEL_TYPE_GUILD_VOICE | CHANNEL_TYPE_GUILD_STAGE_VOICE)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub color: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Member {
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.id.as_str())
    }

    pub fn username(&self) -> &str {
        self.user.as_ref().map(|user| user.username.as_str()).unwrap_or("")
    }

    pub fn nickname(&self) -> Option<&str> {
        self.nick.as_deref().filter(|nick| !nick.is_empty())
    }
}

/// A user referenced by a mention; gateway payloads attach the partial
/// guild member so the nickname is available without a lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    #[serde(flatten)]
    pub user: User,
    #[serde(default)]
    pub member: Option<Member>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    pub author: User,
    #[serde(default)]
    pub member: Option<Member>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        if let Some(content_type) = self.content_type.as_deref() {
            return content_type.starts_with("image/");
        }
        mime_guess::from_path(&self.filename)
            .first()
            .map(|mime| mime.type_().as_str() == "image")
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
    #[serde(default)]
    pub image: Option<EmbedMedia>,
    #[serde(default)]
    pub thumbnail: Option<EmbedMedia>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedMedia {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialUser {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub user: PartialUser,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

impl Presence {
    pub fn game(&self) -> Option<&str> {
        self.activities.first().map(|activity| activity.name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Online,
    Idle,
    DoNotDisturb,
    Invisible,
    Offline,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Online => "online",
            Status::Idle => "idle",
            Status::DoNotDisturb => "dnd",
            Status::Invisible => "invisible",
            Status::Offline => "offline",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "online" => Ok(Status::Online),
            "idle" | "away" => Ok(Status::Idle),
            "dnd" => Ok(Status::DoNotDisturb),
            "invisible" => Ok(Status::Invisible),
            "offline" => Ok(Status::Offline),
            _ => Err(format!(
                "Unknown status {value:?}, expected one of online, idle, dnd, invisible, offline"
            )),
        }
    }
}
