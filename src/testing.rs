//! In-memory `Session` for exercising the dispatcher, renderer and event
//! bridge without a network.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::model::{Activity, Channel, Guild, Member, Message, PartialUser, Presence, Role, Status, User};
use crate::session::{Session, SessionError};

const CHANNEL_TYPE_GUILD_VOICE: u8 = 2;

pub struct FakeSession {
    inner: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    me: User,
    guilds: Vec<Guild>,
    channels: Vec<Channel>,
    members: HashMap<String, Vec<Member>>,
    presences: HashMap<String, Vec<Presence>>,
    // channel id -> messages, newest first
    messages: HashMap<String, Vec<Message>>,
    calls: Vec<String>,
    member_lookups: usize,
    listeners: Vec<mpsc::UnboundedSender<Message>>,
    next_id: u64,
}

impl FakeSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(FakeState {
                me: User {
                    id: "me".to_string(),
                    username: "tester".to_string(),
                    discriminator: "0001".to_string(),
                    ..Default::default()
                },
                next_id: 1000,
                ..Default::default()
            }),
        })
    }

    pub fn with_guild(id: &str, name: &str, channels: &[&str]) -> Arc<Self> {
        let session = Self::new();
        session.add_guild(id, name, channels);
        session
    }

    /// Channel ids are `<guild>-c<index>`.
    pub fn add_guild(&self, id: &str, name: &str, channels: &[&str]) {
        let mut state = self.state();
        state.guilds.push(Guild {
            id: id.to_string(),
            name: name.to_string(),
            roles: Vec::new(),
        });
        for (index, channel) in channels.iter().enumerate() {
            state.channels.push(Channel {
                id: format!("{id}-c{index}"),
                guild_id: Some(id.to_string()),
                name: Some(channel.to_string()),
                kind: 0,
                position: index as i32,
            });
        }
        state.presences.entry(id.to_string()).or_default();
    }

    pub fn add_voice_channel(&self, guild_id: &str, name: &str) -> String {
        let mut state = self.state();
        let index = state
            .channels
            .iter()
            .filter(|channel| channel.guild_id.as_deref() == Some(guild_id))
            .count();
        let id = format!("{guild_id}-c{index}");
        state.channels.push(Channel {
            id: id.clone(),
            guild_id: Some(guild_id.to_string()),
            name: Some(name.to_string()),
            kind: CHANNEL_TYPE_GUILD_VOICE,
            position: index as i32,
        });
        id
    }

    /// Id of channel `index` in the first guild.
    pub fn channel_id(&self, index: usize) -> String {
        let state = self.state();
        let guild = state.guilds.first().map(|guild| guild.id.clone()).unwrap_or_default();
        format!("{guild}-c{index}")
    }

    pub fn add_member(&self, guild_id: &str, user: User, nick: Option<&str>) {
        let mut state = self.state();
        let members = state.members.entry(guild_id.to_string()).or_default();
        members.retain(|member| member.user_id() != Some(user.id.as_str()));
        members.push(Member {
            user: Some(user),
            nick: nick.map(str::to_string),
            roles: Vec::new(),
        });
    }

    pub fn add_role(&self, guild_id: &str, id: &str, name: &str, position: i32) {
        let mut state = self.state();
        if let Some(guild) = state.guilds.iter_mut().find(|guild| guild.id == guild_id) {
            guild.roles.push(Role {
                id: id.to_string(),
                name: name.to_string(),
                position,
                color: 0,
            });
        }
    }

    pub fn add_presence(&self, guild_id: &str, user_id: &str, status: &str, game: Option<&str>) {
        let mut state = self.state();
        state.presences.entry(guild_id.to_string()).or_default().push(Presence {
            user: PartialUser {
                id: user_id.to_string(),
            },
            guild_id: Some(guild_id.to_string()),
            status: status.to_string(),
            activities: game
                .map(|name| {
                    vec![Activity {
                        name: name.to_string(),
                        kind: 0,
                    }]
                })
                .unwrap_or_default(),
        });
    }

    /// Appends a message as the newest in its channel.
    pub fn add_message(&self, channel_id: &str, id: &str, author: User, content: &str) {
        let mut state = self.state();
        let message = Message {
            id: id.to_string(),
            channel_id: channel_id.to_string(),
            author,
            content: content.to_string(),
            ..Default::default()
        };
        state
            .messages
            .entry(channel_id.to_string())
            .or_default()
            .insert(0, message);
    }

    pub fn emit(&self, message: Message) {
        self.state()
            .listeners
            .retain(|listener| listener.send(message.clone()).is_ok());
    }

    /// Number of `guild_member` requests made so far.
    pub fn member_lookups(&self) -> usize {
        self.state().member_lookups
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn me(&self) -> User {
        self.state().me.clone()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.inner.lock().expect("fake session state")
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }
}

fn missing(what: impl Into<String>) -> SessionError {
    SessionError::NotCached(what.into())
}

#[async_trait]
impl Session for FakeSession {
    async fn current_user(&self) -> Result<User, SessionError> {
        Ok(self.me())
    }

    async fn guilds(&self) -> Result<Vec<Guild>, SessionError> {
        Ok(self.state().guilds.clone())
    }

    async fn guild(&self, guild_id: &str) -> Result<Guild, SessionError> {
        self.state()
            .guilds
            .iter()
            .find(|guild| guild.id == guild_id)
            .cloned()
            .ok_or_else(|| missing(format!("guild {guild_id}")))
    }

    async fn guild_channels(&self, guild_id: &str) -> Result<Vec<Channel>, SessionError> {
        let state = self.state();
        if !state.guilds.iter().any(|guild| guild.id == guild_id) {
            return Err(missing(format!("guild {guild_id}")));
        }
        Ok(state
            .channels
            .iter()
            .filter(|channel| channel.guild_id.as_deref() == Some(guild_id))
            .cloned()
            .collect())
    }

    async fn guild_roles(&self, guild_id: &str) -> Result<Vec<Role>, SessionError> {
        Ok(self.guild(guild_id).await?.roles)
    }

    async fn channel(&self, channel_id: &str) -> Result<Channel, SessionError> {
        self.state()
            .channels
            .iter()
            .find(|channel| channel.id == channel_id)
            .cloned()
            .ok_or_else(|| missing(format!("channel {channel_id}")))
    }

    async fn channel_messages(&self, channel_id: &str, limit: u32) -> Result<Vec<Message>, SessionError> {
        let state = self.state();
        Ok(state
            .messages
            .get(channel_id)
            .map(|messages| messages.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<Message, SessionError> {
        self.record(format!("send_message {channel_id} {content}"));
        let mut state = self.state();
        state.next_id += 1;
        let message = Message {
            id: state.next_id.to_string(),
            channel_id: channel_id.to_string(),
            author: state.me.clone(),
            content: content.to_string(),
            ..Default::default()
        };
        state
            .messages
            .entry(channel_id.to_string())
            .or_default()
            .insert(0, message.clone());
        Ok(message)
    }

    async fn send_file(&self, channel_id: &str, path: &Path) -> Result<Message, SessionError> {
        tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.record(format!("send_file {channel_id} {name}"));
        Ok(Message {
            channel_id: channel_id.to_string(),
            author: self.me(),
            ..Default::default()
        })
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<Message, SessionError> {
        self.record(format!("edit_message {channel_id} {message_id} {content}"));
        let mut state = self.state();
        let message = state
            .messages
            .get_mut(channel_id)
            .and_then(|messages| messages.iter_mut().find(|message| message.id == message_id))
            .ok_or_else(|| missing(format!("message {message_id}")))?;
        message.content = content.to_string();
        Ok(message.clone())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), SessionError> {
        self.record(format!("delete_message {channel_id} {message_id}"));
        if let Some(messages) = self.state().messages.get_mut(channel_id) {
            messages.retain(|message| message.id != message_id);
        }
        Ok(())
    }

    async fn guild_members(
        &self,
        guild_id: &str,
        after: &str,
        limit: u32,
    ) -> Result<Vec<Member>, SessionError> {
        self.record(format!("guild_members {guild_id} {after} {limit}"));
        let state = self.state();
        Ok(state
            .members
            .get(guild_id)
            .map(|members| {
                members
                    .iter()
                    .filter(|member| after.is_empty() || member.user_id().unwrap_or("") > after)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn guild_member(&self, guild_id: &str, user_id: &str) -> Result<Member, SessionError> {
        self.state().member_lookups += 1;
        self.state_member(guild_id, user_id)
            .ok_or_else(|| missing(format!("member {user_id}")))
    }

    fn state_member(&self, guild_id: &str, user_id: &str) -> Option<Member> {
        self.state()
            .members
            .get(guild_id)
            .and_then(|members| members.iter().find(|member| member.user_id() == Some(user_id)))
            .cloned()
    }

    fn presences(&self, guild_id: &str) -> Result<Vec<Presence>, SessionError> {
        self.state()
            .presences
            .get(guild_id)
            .cloned()
            .ok_or_else(|| missing(format!("guild {guild_id}")))
    }

    async fn add_member_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<(), SessionError> {
        self.record(format!("add_member_role {guild_id} {user_id} {role_id}"));
        Ok(())
    }

    async fn remove_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<(), SessionError> {
        self.record(format!("remove_member_role {guild_id} {user_id} {role_id}"));
        Ok(())
    }

    async fn set_member_nickname(&self, guild_id: &str, user_id: &str, nick: &str) -> Result<(), SessionError> {
        self.record(format!("set_member_nickname {guild_id} {user_id} {nick}"));
        Ok(())
    }

    async fn update_username(&self, username: &str) -> Result<User, SessionError> {
        self.record(format!("update_username {username}"));
        let mut state = self.state();
        state.me.username = username.to_string();
        Ok(state.me.clone())
    }

    async fn update_status(&self, status: Status) -> Result<(), SessionError> {
        self.record(format!("update_status {status}"));
        Ok(())
    }

    async fn update_playing(&self, game: Option<&str>) -> Result<(), SessionError> {
        self.record(format!("update_playing {}", game.unwrap_or("-")));
        Ok(())
    }

    fn subscribe_messages(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().listeners.push(tx);
        rx
    }
}
