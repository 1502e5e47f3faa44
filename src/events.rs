use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::console::Console;
use crate::model::Message;
use crate::render::Renderer;
use crate::session::Session;
use crate::state::ClientState;

/// Routes gateway messages either to the console (active channel) or to the
/// unread counters (everything else).
pub struct EventBridge {
    session: Arc<dyn Session>,
    state: Arc<ClientState>,
    settings: Arc<Settings>,
    renderer: Arc<Renderer>,
    console: Console,
}

impl EventBridge {
    pub fn new(
        session: Arc<dyn Session>,
        state: Arc<ClientState>,
        settings: Arc<Settings>,
        renderer: Arc<Renderer>,
        console: Console,
    ) -> Self {
        Self {
            session,
            state,
            settings,
            renderer,
            console,
        }
    }

    /// Subscribes before returning, so no message sent after this call is
    /// missed. Each message is handled on its own task.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let mut messages = self.session.subscribe_messages();
        tokio::spawn(async move {
            while let Some(message) = messages.recv().await {
                let bridge = Arc::clone(&self);
                tokio::spawn(async move { bridge.handle_message(message).await });
            }
            debug!("message subscription closed");
        })
    }

    pub async fn handle_message(&self, message: Message) {
        let channel = match self.session.channel(&message.channel_id).await {
            Ok(channel) => channel,
            Err(error) => {
                warn!(channel = %message.channel_id, %error, "ignoring message from unknown channel");
                return;
            }
        };
        let Some(guild_id) = channel.guild_id.clone().or_else(|| message.guild_id.clone()) else {
            debug!(channel = %channel.id, "ignoring message outside a guild");
            return;
        };

        if self.state.mark_unread_unless_active(&guild_id, &channel.id) {
            let options = self.settings.snapshot();
            let text = self.renderer.render_message(&message, &options).await;
            self.console.block(&text);
        }
    }
}
