use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use crossterm::style::Color;
use regex::{Captures, Regex};
use thiserror::Error;
use tracing::{debug, warn};

use crate::ascii::{self, RasterOptions};
use crate::config::DisplayOptions;
use crate::model::{Attachment, Embed, Member, Message, User};
use crate::output::{display_width, paint, pad_right};
use crate::session::Session;

const NAME_COLUMN: usize = 30;

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?(\d+)>").expect("valid mention regex"));

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("unexpected status: {0}")]
    Status(u16),
}

/// Turns messages into console text. Needs the session to resolve guild
/// nicknames.
pub struct Renderer {
    session: Arc<dyn Session>,
    http: reqwest::Client,
    // (guild id, user id) pairs the API could not resolve
    missing_members: Mutex<HashSet<(String, String)>>,
}

impl Renderer {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self {
            session,
            http: reqwest::Client::new(),
            missing_members: Mutex::new(HashSet::new()),
        }
    }

    /// The full block for one message, ending with a blank line.
    pub async fn render_message(&self, message: &Message, options: &DisplayOptions) -> String {
        let mut out = String::new();
        let guild_id = if options.show_nicknames {
            self.resolve_guild(message).await
        } else {
            None
        };

        let name = self
            .display_name(guild_id.as_deref(), &message.author, message.member.as_ref(), options)
            .await;
        out.push_str(&format!(
            "{} {}\t{}\n",
            paint(&pad_right(&name, NAME_COLUMN), Color::Cyan, options.color_text),
            paint(&message.id, Color::Blue, options.color_text),
            paint(&message.author.id, Color::Blue, options.color_text),
        ));

        if !message.content.is_empty() {
            let mut names = HashMap::new();
            for mention in &message.mentions {
                let name = self
                    .display_name(guild_id.as_deref(), &mention.user, mention.member.as_ref(), options)
                    .await;
                names.insert(mention.user.id.clone(), name);
            }
            out.push_str(&replace_mentions(&message.content, &names));
            out.push('\n');
        }

        for attachment in &message.attachments {
            self.render_attachment(&mut out, attachment, options).await;
        }
        for embed in &message.embeds {
            self.render_embed(&mut out, embed, options).await;
        }

        out.push('\n');
        out
    }

    /// Fetches `url` and draws it as text art.
    pub async fn render_image_url(
        &self,
        url: &str,
        width: u32,
        height: u32,
        color: bool,
    ) -> Result<String, RenderError> {
        let image = ascii::fetch_image(&self.http, url).await?;
        Ok(ascii::rasterize(
            &image,
            RasterOptions {
                width,
                height,
                color,
            },
        ))
    }

    async fn render_attachment(&self, out: &mut String, attachment: &Attachment, options: &DisplayOptions) {
        if attachment.filename.is_empty() || attachment.url.is_empty() {
            return;
        }
        out.push_str(&format!(
            "{} \t{}\n",
            paint(&attachment.filename, Color::Green, options.color_text),
            paint(&attachment.url, Color::Green, options.color_text),
        ));
        if options.show_images && attachment.is_image() {
            self.inline_image(out, &attachment.url, options).await;
        }
    }

    async fn render_embed(&self, out: &mut String, embed: &Embed, options: &DisplayOptions) {
        let width = embed_frame_width(embed, options);
        out.push_str(&format!("| {} |\n", "=".repeat(width)));

        if let Some(title) = embed.title.as_deref().filter(|title| !title.is_empty()) {
            out.push_str(&paint(title, Color::Red, options.color_text));
            out.push('\n');
        }
        if let Some(description) = embed.description.as_deref().filter(|text| !text.is_empty()) {
            out.push_str(description);
            out.push('\n');
        }

        for media in [&embed.image, &embed.thumbnail].into_iter().flatten() {
            if media.url.is_empty() {
                continue;
            }
            if options.show_images {
                self.inline_image(out, &media.url, options).await;
            } else {
                out.push_str(&paint(&media.url, Color::Green, options.color_text));
                out.push('\n');
            }
        }

        for field in &embed.fields {
            let rule = width.saturating_sub(display_width(&field.name) + 2);
            out.push_str(&format!("|- {} {}\n", field.name, "-".repeat(rule)));
            out.push_str(&field.value);
            out.push('\n');
        }

        out.push_str(&format!("| {} |\n", "_".repeat(width)));
    }

    async fn inline_image(&self, out: &mut String, url: &str, options: &DisplayOptions) {
        match self
            .render_image_url(url, options.image_width, options.image_height, options.color_images)
            .await
        {
            Ok(art) => out.push_str(&art),
            Err(error) => warn!(%url, %error, "failed to render image"),
        }
    }

    async fn resolve_guild(&self, message: &Message) -> Option<String> {
        match self.session.channel(&message.channel_id).await {
            Ok(channel) => channel.guild_id.or_else(|| message.guild_id.clone()),
            Err(error) => {
                debug!(channel = %message.channel_id, %error, "channel lookup failed");
                message.guild_id.clone()
            }
        }
    }

    /// Guild nickname when enabled and known, otherwise the username.
    async fn display_name(
        &self,
        guild_id: Option<&str>,
        user: &User,
        attached: Option<&Member>,
        options: &DisplayOptions,
    ) -> String {
        if !options.show_nicknames {
            return user.username.clone();
        }
        if let Some(nick) = attached.and_then(Member::nickname) {
            return nick.to_string();
        }
        let Some(guild_id) = guild_id else {
            return user.username.clone();
        };
        let member = match self.session.state_member(guild_id, &user.id) {
            Some(member) => Some(member),
            None => self.fetch_member(guild_id, &user.id).await,
        };
        member
            .as_ref()
            .and_then(Member::nickname)
            .map(str::to_string)
            .unwrap_or_else(|| user.username.clone())
    }

    /// Asks the API once per (guild, user); a failure is remembered so
    /// listings of departed authors do not repeat the request.
    async fn fetch_member(&self, guild_id: &str, user_id: &str) -> Option<Member> {
        let key = (guild_id.to_string(), user_id.to_string());
        if self.missing().contains(&key) {
            return None;
        }
        match self.session.guild_member(guild_id, user_id).await {
            Ok(member) => Some(member),
            Err(error) => {
                debug!(guild = %guild_id, user = %user_id, %error, "member lookup failed");
                self.missing().insert(key);
                None
            }
        }
    }

    fn missing(&self) -> MutexGuard<'_, HashSet<(String, String)>> {
        self.missing_members
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Border width: the widest of the title, the first lines of the
/// description and field values, the field names, and either the inlined
/// image width or the printed image URLs.
pub fn embed_frame_width(embed: &Embed, options: &DisplayOptions) -> usize {
    let first_line = |text: &str| display_width(text.lines().next().unwrap_or(""));

    let mut width = display_width(embed.title.as_deref().unwrap_or(""));
    width = width.max(first_line(embed.description.as_deref().unwrap_or("")));
    for field in &embed.fields {
        width = width.max(display_width(&field.name));
        width = width.max(first_line(&field.value));
    }

    if options.show_images {
        if embed.image.is_some() || embed.thumbnail.is_some() {
            width = width.max(options.image_width as usize);
        }
    } else {
        for media in [&embed.image, &embed.thumbnail].into_iter().flatten() {
            width = width.max(display_width(&media.url));
        }
    }
    width
}

/// Rewrites `<@id>` and `<@!id>` as `@name`. Unknown ids are left alone.
pub fn replace_mentions(content: &str, names: &HashMap<String, String>) -> String {
    MENTION_RE
        .replace_all(content, |caps: &Captures| match names.get(&caps[1]) {
            Some(name) => format!("@{name}"),
            None => caps[0].to_string(),
        })
        .into_owned()
}
