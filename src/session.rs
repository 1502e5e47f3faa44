use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::{ApiClient, ApiError};
use crate::config::Config;
use crate::gateway::{self, GatewayError, GatewayEvent, GatewayHandle, GuildCreate};
use crate::model::{Channel, Guild, Member, Message, Presence, Role, Status, User};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("{0} is not in the session cache")]
    NotCached(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the client asks of the chat platform.
///
/// The `state_*` and `presences` calls only consult what the gateway has
/// delivered so far; the async calls may go to the network.
#[async_trait]
pub trait Session: Send + Sync {
    async fn current_user(&self) -> Result<User, SessionError>;
    async fn guilds(&self) -> Result<Vec<Guild>, SessionError>;
    async fn guild(&self, guild_id: &str) -> Result<Guild, SessionError>;
    async fn guild_channels(&self, guild_id: &str) -> Result<Vec<Channel>, SessionError>;
    async fn guild_roles(&self, guild_id: &str) -> Result<Vec<Role>, SessionError>;
    async fn channel(&self, channel_id: &str) -> Result<Channel, SessionError>;
    /// Newest first.
    async fn channel_messages(&self, channel_id: &str, limit: u32) -> Result<Vec<Message>, SessionError>;
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<Message, SessionError>;
    async fn send_file(&self, channel_id: &str, path: &Path) -> Result<Message, SessionError>;
    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<Message, SessionError>;
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), SessionError>;
    async fn guild_members(
        &self,
        guild_id: &str,
        after: &str,
        limit: u32,
    ) -> Result<Vec<Member>, SessionError>;
    async fn guild_member(&self, guild_id: &str, user_id: &str) -> Result<Member, SessionError>;
    fn state_member(&self, guild_id: &str, user_id: &str) -> Option<Member>;
    fn presences(&self, guild_id: &str) -> Result<Vec<Presence>, SessionError>;
    async fn add_member_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<(), SessionError>;
    async fn remove_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<(), SessionError>;
    async fn set_member_nickname(&self, guild_id: &str, user_id: &str, nick: &str) -> Result<(), SessionError>;
    async fn update_username(&self, username: &str) -> Result<User, SessionError>;
    async fn update_status(&self, status: Status) -> Result<(), SessionError>;
    async fn update_playing(&self, game: Option<&str>) -> Result<(), SessionError>;
    /// Every MESSAGE_CREATE received after this call.
    fn subscribe_messages(&self) -> mpsc::UnboundedReceiver<Message>;
}

#[derive(Default)]
struct Cache {
    guilds: HashMap<String, Guild>,
    channels: HashMap<String, Channel>,
    // guild id -> user id -> member
    members: HashMap<String, HashMap<String, Member>>,
    presences: HashMap<String, Vec<Presence>>,
}

impl Cache {
    fn apply(&mut self, event: &GatewayEvent) {
        match event {
            GatewayEvent::GuildCreate(created) => self.insert_guild(created),
            GatewayEvent::MessageCreate(message) => {
                let (Some(guild_id), Some(member)) = (&message.guild_id, &message.member) else {
                    return;
                };
                let mut member = member.clone();
                member.user = Some(message.author.clone());
                self.insert_member(guild_id, member);
            }
            GatewayEvent::PresenceUpdate(presence) => {
                let Some(guild_id) = presence.guild_id.clone() else {
                    return;
                };
                let list = self.presences.entry(guild_id).or_default();
                match list.iter_mut().find(|known| known.user.id == presence.user.id) {
                    Some(known) => *known = presence.clone(),
                    None => list.push(presence.clone()),
                }
            }
        }
    }

    fn insert_guild(&mut self, created: &GuildCreate) {
        for channel in &created.channels {
            let mut channel = channel.clone();
            channel.guild_id.get_or_insert_with(|| created.id.clone());
            self.channels.insert(channel.id.clone(), channel);
        }
        for member in &created.members {
            self.insert_member(&created.id, member.clone());
        }
        self.presences
            .insert(created.id.clone(), created.presences.clone());
        self.guilds.insert(created.id.clone(), created.guild());
    }

    fn insert_member(&mut self, guild_id: &str, member: Member) {
        let Some(user_id) = member.user_id().map(str::to_string) else {
            return;
        };
        self.members
            .entry(guild_id.to_string())
            .or_default()
            .insert(user_id, member);
    }
}

struct Shared {
    cache: Mutex<Cache>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<Message>>>,
}

impl Shared {
    fn cache(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn dispatch(&self, event: GatewayEvent) {
        self.cache().apply(&event);
        if let GatewayEvent::MessageCreate(message) = event {
            let mut listeners = self
                .listeners
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            listeners.retain(|listener| listener.send(message.clone()).is_ok());
        }
    }
}

struct PresenceState {
    status: Status,
    game: Option<String>,
}

/// REST client plus a gateway-fed cache.
pub struct DiscordSession {
    api: ApiClient,
    gateway: GatewayHandle,
    shared: Arc<Shared>,
    presence: Mutex<PresenceState>,
}

impl DiscordSession {
    /// Validates the token over REST, then opens the gateway and waits for
    /// READY. Returns the session and the account it is logged in as.
    pub async fn connect(config: &Config, token: &str) -> Result<(Arc<Self>, User), SessionError> {
        let api = ApiClient::new(config.api_base_url.clone()).with_token(token);
        let user = api.current_user().await?;

        let connection = gateway::connect(&config.gateway_url, token, config.intents).await?;
        debug!(user = %connection.ready.user.username, "session ready");

        let shared = Arc::new(Shared {
            cache: Mutex::new(Cache::default()),
            listeners: Mutex::new(Vec::new()),
        });
        let pump = Arc::clone(&shared);
        let mut events = connection.events;
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                pump.dispatch(event);
            }
            debug!("gateway event stream ended");
        });

        let session = Arc::new(Self {
            api,
            gateway: connection.handle,
            shared,
            presence: Mutex::new(PresenceState {
                status: Status::Online,
                game: None,
            }),
        });
        Ok((session, user))
    }

    fn send_presence(&self, apply: impl FnOnce(&mut PresenceState)) -> Result<(), SessionError> {
        let mut presence = self
            .presence
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut presence);
        self.gateway
            .update_presence(presence.status.as_str(), presence.game.as_deref())?;
        Ok(())
    }
}

#[async_trait]
impl Session for DiscordSession {
    async fn current_user(&self) -> Result<User, SessionError> {
        Ok(self.api.current_user().await?)
    }

    async fn guilds(&self) -> Result<Vec<Guild>, SessionError> {
        Ok(self.api.guilds().await?)
    }

    async fn guild(&self, guild_id: &str) -> Result<Guild, SessionError> {
        if let Some(guild) = self.shared.cache().guilds.get(guild_id).cloned() {
            return Ok(guild);
        }
        Ok(self.api.guild(guild_id).await?)
    }

    async fn guild_channels(&self, guild_id: &str) -> Result<Vec<Channel>, SessionError> {
        Ok(self.api.guild_channels(guild_id).await?)
    }

    async fn guild_roles(&self, guild_id: &str) -> Result<Vec<Role>, SessionError> {
        let cached = self
            .shared
            .cache()
            .guilds
            .get(guild_id)
            .map(|guild| guild.roles.clone());
        match cached {
            Some(roles) => Ok(roles),
            None => Ok(self.api.guild_roles(guild_id).await?),
        }
    }

    async fn channel(&self, channel_id: &str) -> Result<Channel, SessionError> {
        if let Some(channel) = self.shared.cache().channels.get(channel_id).cloned() {
            return Ok(channel);
        }
        let channel = self.api.channel(channel_id).await?;
        self.shared
            .cache()
            .channels
            .insert(channel.id.clone(), channel.clone());
        Ok(channel)
    }

    async fn channel_messages(&self, channel_id: &str, limit: u32) -> Result<Vec<Message>, SessionError> {
        Ok(self.api.channel_messages(channel_id, limit).await?)
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<Message, SessionError> {
        Ok(self.api.send_message(channel_id, content).await?)
    }

    async fn send_file(&self, channel_id: &str, path: &Path) -> Result<Message, SessionError> {
        tokio::fs::metadata(path).await?;
        Ok(self.api.upload_file(channel_id, path).await?)
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<Message, SessionError> {
        Ok(self.api.edit_message(channel_id, message_id, content).await?)
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), SessionError> {
        Ok(self.api.delete_message(channel_id, message_id).await?)
    }

    async fn guild_members(
        &self,
        guild_id: &str,
        after: &str,
        limit: u32,
    ) -> Result<Vec<Member>, SessionError> {
        Ok(self.api.guild_members(guild_id, after, limit).await?)
    }

    async fn guild_member(&self, guild_id: &str, user_id: &str) -> Result<Member, SessionError> {
        let member = self.api.guild_member(guild_id, user_id).await?;
        self.shared.cache().insert_member(guild_id, member.clone());
        Ok(member)
    }

    fn state_member(&self, guild_id: &str, user_id: &str) -> Option<Member> {
        self.shared
            .cache()
            .members
            .get(guild_id)
            .and_then(|members| members.get(user_id))
            .cloned()
    }

    fn presences(&self, guild_id: &str) -> Result<Vec<Presence>, SessionError> {
        self.shared
            .cache()
            .presences
            .get(guild_id)
            .cloned()
            .ok_or_else(|| SessionError::NotCached(format!("guild {guild_id}")))
    }

    async fn add_member_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<(), SessionError> {
        Ok(self.api.add_member_role(guild_id, user_id, role_id).await?)
    }

    async fn remove_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<(), SessionError> {
        Ok(self.api.remove_member_role(guild_id, user_id, role_id).await?)
    }

    async fn set_member_nickname(&self, guild_id: &str, user_id: &str, nick: &str) -> Result<(), SessionError> {
        Ok(self.api.set_member_nickname(guild_id, user_id, nick).await?)
    }

    async fn update_username(&self, username: &str) -> Result<User, SessionError> {
        Ok(self.api.update_username(username).await?)
    }

    async fn update_status(&self, status: Status) -> Result<(), SessionError> {
        self.send_presence(|presence| presence.status = status)
    }

    async fn update_playing(&self, game: Option<&str>) -> Result<(), SessionError> {
        let game = game.map(str::to_string);
        self.send_presence(|presence| presence.game = game)
    }

    fn subscribe_messages(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }
}
