use std::io;
use std::path::Path;
use std::sync::Arc;

use crossterm::style::Color;
use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::config::{DisplayOptions, Settings};
use crate::console::Console;
use crate::model::{Channel, Guild, Status, User};
use crate::output::{
    color_status, format_channel_line, format_guild_line, format_member_info,
    format_member_line, format_on_off, format_presence_line, format_role_line, paint,
};
use crate::render::{RenderError, Renderer};
use crate::session::{Session, SessionError};
use crate::state::ClientState;

const DEFAULT_MESSAGE_COUNT: i64 = 10;
const LISTING_MESSAGE_COUNT: i64 = 25;
const MAX_MESSAGE_COUNT: i64 = 100;
const MEMBER_PAGE_SIZE: u32 = 1000;
const AVATAR_SIZE: u32 = 256;

pub const HELP: &str = "\
==== Commands ==================================================
/say <text>              send text to the active channel
                         (a line without a leading / does the same)
/gl                      list guilds
/cl                      list channels of the active guild
/ls [n]                  list n messages (25) in a channel, channels in
                         a guild, guilds otherwise
/cd <i|..>               enter guild or channel i, or go up one level
/g <n>                   select guild n and its first channel
/gr <regex>              select the first guild whose name matches
/c <n>                   select channel n of the active guild
/cr <regex>              select the first channel whose name matches
/m [n]                   show the last n messages (10, at most 100)
/p [first line]          compose a multi-line message, end with
                         /send or /cancel
/upload <path>           upload a file to the active channel
/delete <id>             delete a message
/edit <id> <text>        replace the text of a message
/leave                   leave the active channel

/img <id> [width]        draw the images of a recent message
/avatar [userid] [width] draw an avatar, yours by default
/img-width <n>           default image width
/img-height <n>          default image height, 0 keeps the aspect ratio
/img-auto [on|off]       draw images as messages arrive
/img-color [on|off]      draw images in colour
/text-color [on|off]     colour names, ids and listings
/show-nicknames [on|off] show guild nicknames instead of usernames

/members [after]         list up to 1000 members
/presences               list known presences in the active guild
/roles [guildid]         list roles, highest first
/member-info [userid]    show a member's details and roles
/member-add-role <userid> <roleid>
/member-remove-role <userid> <roleid>
/member-nick <userid> [nick]  set or clear a member's nickname
/nick [nick]             set or clear your own nickname

/username <name>         change your username
/status <online|idle|dnd|invisible|offline>
/playing <text>          set the game you are playing
/playing-off             clear the game

/help                    show this text
/exit                    quit
================================================================";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Precondition(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Exit,
}

/// Space-separated command tokens; index 0 is the verb.
#[derive(Debug, Clone, Default)]
pub struct Args {
    tokens: Vec<String>,
}

impl Args {
    pub fn parse(command: &str) -> Self {
        Self {
            tokens: command.split(' ').map(str::to_string).collect(),
        }
    }

    /// Token `n`, or "" when out of range.
    pub fn get(&self, n: usize) -> &str {
        self.tokens.get(n).map(String::as_str).unwrap_or("")
    }

    /// Tokens from `n` to the end, joined with single spaces.
    pub fn after(&self, n: usize) -> String {
        self.tokens.get(n..).map(|rest| rest.join(" ")).unwrap_or_default()
    }
}

/// Console lines with the trailing newline removed. Bytes that are not
/// UTF-8 are replaced rather than rejected, so a stray paste cannot end the
/// session.
pub struct InputLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R> InputLines<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// `None` at end of input.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Toggle {
    ShowImages,
    ColorImages,
    ColorText,
    ShowNicknames,
}

impl Toggle {
    fn get(self, options: &DisplayOptions) -> bool {
        match self {
            Toggle::ShowImages => options.show_images,
            Toggle::ColorImages => options.color_images,
            Toggle::ColorText => options.color_text,
            Toggle::ShowNicknames => options.show_nicknames,
        }
    }

    fn set(self, options: &mut DisplayOptions, value: bool) {
        match self {
            Toggle::ShowImages => options.show_images = value,
            Toggle::ColorImages => options.color_images = value,
            Toggle::ColorText => options.color_text = value,
            Toggle::ShowNicknames => options.show_nicknames = value,
        }
    }

    fn confirmation(self, value: bool) -> &'static str {
        match (self, value) {
            (Toggle::ShowImages, true) => "Now automatically displaying images",
            (Toggle::ShowImages, false) => "No longer automatically displaying images",
            (Toggle::ColorImages, true) => "Images will be rendered in color",
            (Toggle::ColorImages, false) => "Images will be rendered in grayscale",
            (Toggle::ColorText, true) => "Text will be colored",
            (Toggle::ColorText, false) => "Text will not be colored",
            (Toggle::ShowNicknames, true) => "Nicknames will be displayed",
            (Toggle::ShowNicknames, false) => "Nicknames will not be displayed",
        }
    }
}

/// Parses console lines and runs the matching handler.
pub struct Dispatcher {
    session: Arc<dyn Session>,
    state: Arc<ClientState>,
    settings: Arc<Settings>,
    renderer: Arc<Renderer>,
    console: Console,
}

impl Dispatcher {
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

    /// Reads commands until `/exit` or end of input. Command errors are
    /// reported and the loop carries on.
    pub async fn run<R>(&self, mut input: InputLines<R>) -> Result<(), CommandError>
    where
        R: AsyncBufRead + Unpin,
    {
        while let Some(line) = input.next_line().await? {
            match self.execute(&line, &mut input).await {
                Ok(Outcome::Continue) => {}
                Ok(Outcome::Exit) => return Ok(()),
                Err(error) => self.report(&error),
            }
        }
        debug!("input closed");
        Ok(())
    }

    /// `input` is only read by `/p`, which consumes lines until `/send`
    /// or `/cancel`.
    pub async fn execute<R>(&self, line: &str, input: &mut InputLines<R>) -> Result<Outcome, CommandError>
    where
        R: AsyncBufRead + Unpin,
    {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Outcome::Continue);
        }
        let Some(command) = line.strip_prefix('/') else {
            self.say(line).await?;
            return Ok(Outcome::Continue);
        };

        let args = Args::parse(command);
        match args.get(0) {
            "gl" | "lg" | "guild_list" | "guilds" => self.list_guilds().await?,
            "cl" | "lc" | "channel_list" | "channels" => self.list_channels().await?,
            "ls" => self.ls(args.get(1)).await?,
            "cd" => self.cd(args.get(1)).await?,
            "g" | "guild" => self.select_guild(args.get(1)).await?,
            "gr" | "guild_regex" => self.select_guild_regex(&args.after(1)).await?,
            "c" | "channel" => self.select_channel(args.get(1)).await?,
            "cr" | "channel_regex" => self.select_channel_regex(&args.after(1)).await?,
            "m" | "messages" => {
                self.messages(parse_count(args.get(1), DEFAULT_MESSAGE_COUNT))
                    .await?
            }
            "say" => self.say(&args.after(1)).await?,
            "p" | "paragraph" => self.paragraph(args.after(1), input).await?,
            "upload" => self.upload(&args.after(1)).await?,
            "delete" => self.delete(args.get(1)).await?,
            "edit" => self.edit(args.get(1), &args.after(2)).await?,
            "img" => self.show_image(args.get(1), args.get(2)).await?,
            "avatar" => self.avatar(args.get(1), args.get(2)).await?,
            "img-width" => {
                let width = parse_dimension(args.get(1))?;
                self.settings.update(|options| options.image_width = width);
                self.console.line(format!("Image width set to {width}"));
            }
            "img-height" => {
                let height = parse_dimension(args.get(1))?;
                self.settings.update(|options| options.image_height = height);
                self.console.line(format!("Image height set to {height}"));
            }
            "img-auto" | "image-auto" => self.toggle(Toggle::ShowImages, args.get(1)),
            "img-color" | "color-images" => self.toggle(Toggle::ColorImages, args.get(1)),
            "text-color" | "color-text" => self.toggle(Toggle::ColorText, args.get(1)),
            "show-nicknames" | "show-nicks" => self.toggle(Toggle::ShowNicknames, args.get(1)),
            "members" => self.members(args.get(1)).await?,
            "presences" => self.presences()?,
            "roles" => self.roles(args.get(1)).await?,
            "member-info" | "m-info" => self.member_info(args.get(1)).await?,
            "member-add-role" => self.member_add_role(args.get(1), args.get(2)).await?,
            "member-remove-role" => self.member_remove_role(args.get(1), args.get(2)).await?,
            "member-nick" => self.member_nick(args.get(1), &args.after(2)).await?,
            "nick" => self.member_nick("@me", &args.after(1)).await?,
            "username" => self.username(args.get(1)).await?,
            "status" => self.status(args.get(1)).await?,
            "playing" => self.playing(&args.after(1)).await?,
            "playing-off" => {
                self.session.update_playing(None).await?;
                self.console.line("Playing status set to nothing");
            }
            "leave" => self.state.set_channel(""),
            "help" => self.console.line(HELP),
            "exit" => return Ok(Outcome::Exit),
            verb => return Err(CommandError::Validation(format!("Unknown command: {verb}"))),
        }
        Ok(Outcome::Continue)
    }

    fn report(&self, error: &CommandError) {
        debug!(%error, "command failed");
        let color = self.settings.snapshot().color_text;
        self.console.line(paint(&error.to_string(), Color::Red, color));
    }

    fn require_guild(&self) -> Result<String, CommandError> {
        let guild_id = self.state.active_guild();
        if guild_id.is_empty() {
            return Err(CommandError::Precondition(
                "You need to select a guild first".to_string(),
            ));
        }
        Ok(guild_id)
    }

    fn require_channel(&self) -> Result<String, CommandError> {
        let channel_id = self.state.active_channel();
        if channel_id.is_empty() {
            return Err(CommandError::Precondition(
                "You need to be in a channel to use this command".to_string(),
            ));
        }
        Ok(channel_id)
    }

    async fn list_guilds(&self) -> Result<(), CommandError> {
        let color = self.settings.snapshot().color_text;
        let active = self.state.active_guild();
        for (index, guild) in self.session.guilds().await?.iter().enumerate() {
            let unread = self.state.guild_unread(&guild.id);
            self.console
                .line(format_guild_line(index, guild, guild.id == active, unread, color));
        }
        Ok(())
    }

    async fn list_channels(&self) -> Result<(), CommandError> {
        let guild_id = self.require_guild()?;
        let channels = self.channels(&guild_id).await?;
        let guild = self.session.guild(&guild_id).await?;
        let color = self.settings.snapshot().color_text;
        let active = self.state.active_channel();

        self.console.line(&guild.name);
        for (index, channel) in channels.iter().enumerate() {
            if channel.is_voice() {
                continue;
            }
            let unread = self.state.channel_unread(&guild_id, &channel.id);
            self.console.line(format_channel_line(
                index,
                channel,
                channel.id == active,
                unread,
                color,
            ));
        }
        Ok(())
    }

    /// Guild channels in display order. Indices used by `/c` and `/cl`
    /// refer to this list.
    async fn channels(&self, guild_id: &str) -> Result<Vec<Channel>, CommandError> {
        let mut channels = self.session.guild_channels(guild_id).await?;
        channels.sort_by_key(|channel| channel.position);
        Ok(channels)
    }

    async fn ls(&self, count: &str) -> Result<(), CommandError> {
        if !self.state.active_channel().is_empty() {
            self.messages(parse_count(count, LISTING_MESSAGE_COUNT)).await
        } else if !self.state.active_guild().is_empty() {
            self.list_channels().await
        } else {
            self.list_guilds().await
        }
    }

    async fn cd(&self, target: &str) -> Result<(), CommandError> {
        if target == ".." {
            if !self.state.active_channel().is_empty() {
                self.state.set_channel("");
            } else if !self.state.active_guild().is_empty() {
                self.state.set_guild("");
            }
            return Ok(());
        }
        if self.state.active_guild().is_empty() {
            self.select_guild(target).await
        } else {
            self.select_channel(target).await
        }
    }

    async fn select_guild(&self, index: &str) -> Result<(), CommandError> {
        let requested = parse_index(index, "Please select a guild index")?;
        let guilds = self.session.guilds().await?;
        let guild = pick(&guilds, requested)?;
        self.enter_guild(guild).await
    }

    async fn select_guild_regex(&self, pattern: &str) -> Result<(), CommandError> {
        let query = compile_query(pattern)?;
        let guilds = self.session.guilds().await?;
        match guilds.iter().find(|guild| query.is_match(&guild.name)) {
            Some(guild) => self.enter_guild(guild).await,
            None => Ok(()),
        }
    }

    async fn enter_guild(&self, guild: &Guild) -> Result<(), CommandError> {
        self.state.set_guild(&guild.id);
        self.state.set_channel("");
        self.console.line(format!("Selected guild: {}", guild.name));
        self.select_channel("0").await
    }

    async fn select_channel(&self, index: &str) -> Result<(), CommandError> {
        let guild_id = self.require_guild()?;
        let requested = parse_index(index, "Please select a channel index")?;
        let channels = self.channels(&guild_id).await?;
        let channel = pick(&channels, requested)?;
        self.enter_channel(&guild_id, channel);
        Ok(())
    }

    async fn select_channel_regex(&self, pattern: &str) -> Result<(), CommandError> {
        let guild_id = self.require_guild()?;
        let query = compile_query(pattern)?;
        let channels = self.channels(&guild_id).await?;
        if let Some(channel) = channels
            .iter()
            .find(|channel| query.is_match(channel.display_name()))
        {
            self.enter_channel(&guild_id, channel);
        }
        Ok(())
    }

    fn enter_channel(&self, guild_id: &str, channel: &Channel) {
        self.state.set_channel(&channel.id);
        self.state.mark_read(guild_id, &channel.id);
        self.console
            .line(format!("Selected channel: {}", channel.display_name()));
    }

    async fn messages(&self, count: u32) -> Result<(), CommandError> {
        let channel_id = self.require_channel()?;
        let messages = self.session.channel_messages(&channel_id, count).await?;
        if messages.is_empty() {
            self.console.line("No messages to retrieve");
            return Ok(());
        }
        let options = self.settings.snapshot();
        for message in messages.iter().rev() {
            let text = self.renderer.render_message(message, &options).await;
            self.console.block(&text);
        }
        Ok(())
    }

    async fn say(&self, text: &str) -> Result<(), CommandError> {
        let channel_id = self.state.active_channel();
        if channel_id.is_empty() {
            return Err(CommandError::Precondition(
                "You are not currently in a channel".to_string(),
            ));
        }
        if text.trim().is_empty() {
            return Err(CommandError::Validation("Nothing to send".to_string()));
        }
        self.session.send_message(&channel_id, text).await?;
        if !self.settings.snapshot().show_images {
            self.ls("").await?;
        }
        Ok(())
    }

    async fn paragraph<R>(&self, first: String, input: &mut InputLines<R>) -> Result<(), CommandError>
    where
        R: AsyncBufRead + Unpin,
    {
        let channel_id = self.require_channel()?;
        let mut lines = Vec::new();
        if !first.is_empty() {
            lines.push(first);
        }
        self.console
            .line("Enter your paragraph in multiple lines. Type /send or /cancel to finish");
        loop {
            let Some(line) = input.next_line().await? else {
                return Err(CommandError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "input closed before /send",
                )));
            };
            match line.trim() {
                "/send" => {
                    self.session
                        .send_message(&channel_id, &lines.join("\n"))
                        .await?;
                    return Ok(());
                }
                "/cancel" => {
                    self.console.line("Paragraph discarded");
                    return Ok(());
                }
                _ => lines.push(line),
            }
        }
    }

    async fn upload(&self, path: &str) -> Result<(), CommandError> {
        let channel_id = self.require_channel()?;
        if path.is_empty() {
            return Err(CommandError::Validation(
                "Please enter a file path to upload".to_string(),
            ));
        }
        let path = Path::new(path);
        self.session.send_file(&channel_id, path).await?;
        self.console.line(format!("Uploaded {}", path.display()));
        Ok(())
    }

    async fn delete(&self, message_id: &str) -> Result<(), CommandError> {
        let channel_id = self.require_channel()?;
        if message_id.is_empty() {
            return Err(CommandError::Validation(
                "Please provide a message ID".to_string(),
            ));
        }
        self.session.delete_message(&channel_id, message_id).await?;
        self.messages(LISTING_MESSAGE_COUNT as u32).await
    }

    async fn edit(&self, message_id: &str, text: &str) -> Result<(), CommandError> {
        let channel_id = self.require_channel()?;
        if message_id.is_empty() {
            return Err(CommandError::Validation(
                "Please specify a message id".to_string(),
            ));
        }
        if text.trim().is_empty() {
            return Err(CommandError::Validation(
                "Please provide the new message text".to_string(),
            ));
        }
        self.session
            .edit_message(&channel_id, message_id, text)
            .await?;
        self.messages(LISTING_MESSAGE_COUNT as u32).await
    }

    async fn show_image(&self, id_fragment: &str, width: &str) -> Result<(), CommandError> {
        let channel_id = self.require_channel()?;
        if id_fragment.is_empty() {
            return Err(CommandError::Validation(
                "Please provide a message ID".to_string(),
            ));
        }
        let current = self.settings.snapshot();
        let options = DisplayOptions {
            show_images: true,
            image_width: width.parse().unwrap_or(current.image_width),
            image_height: 0,
            ..current
        };

        let messages = self
            .session
            .channel_messages(&channel_id, MAX_MESSAGE_COUNT as u32)
            .await?;
        let Some(message) = messages
            .iter()
            .rfind(|message| message.id.contains(id_fragment))
        else {
            return Err(CommandError::Validation(
                "No message in the last 100 has an ID containing that text".to_string(),
            ));
        };
        let text = self.renderer.render_message(message, &options).await;
        self.console.block(&text);
        Ok(())
    }

    async fn avatar(&self, user_id: &str, width: &str) -> Result<(), CommandError> {
        let guild_id = self.require_guild()?;
        let user = if user_id.is_empty() {
            self.session.current_user().await?
        } else {
            member_user(self.session.guild_member(&guild_id, user_id).await?.user, user_id)
        };
        let options = self.settings.snapshot();
        let width = width.parse().unwrap_or(options.image_width);
        let url = user.avatar_url(AVATAR_SIZE);

        self.console
            .line(paint(&url, Color::Green, options.color_text));
        let art = self
            .renderer
            .render_image_url(&url, width, 0, options.color_images)
            .await?;
        self.console.block(&art);
        Ok(())
    }

    fn toggle(&self, toggle: Toggle, value: &str) {
        if value.is_empty() {
            let current = toggle.get(&self.settings.snapshot());
            self.console.line(format_on_off(current));
            return;
        }
        let enabled = if value.eq_ignore_ascii_case("on") {
            true
        } else if value.eq_ignore_ascii_case("off") {
            false
        } else {
            return;
        };
        self.settings.update(|options| toggle.set(options, enabled));
        self.console.line(toggle.confirmation(enabled));
    }

    async fn members(&self, after: &str) -> Result<(), CommandError> {
        let guild_id = self.require_guild()?;
        let members = self
            .session
            .guild_members(&guild_id, after, MEMBER_PAGE_SIZE)
            .await?;
        if members.is_empty() {
            self.console.line("No users returned");
            return Ok(());
        }
        let color = self.settings.snapshot().color_text;
        for member in &members {
            self.console.line(format_member_line(member, color));
        }
        Ok(())
    }

    fn presences(&self) -> Result<(), CommandError> {
        let guild_id = self.require_guild()?;
        let presences = self.session.presences(&guild_id)?;
        if presences.is_empty() {
            self.console.line("No users returned");
            return Ok(());
        }
        let color = self.settings.snapshot().color_text;
        for presence in &presences {
            let member = self.session.state_member(&guild_id, &presence.user.id);
            self.console
                .line(format_presence_line(presence, member.as_ref(), color));
        }
        Ok(())
    }

    async fn roles(&self, guild_id: &str) -> Result<(), CommandError> {
        let guild_id = if guild_id.is_empty() {
            self.require_guild()?
        } else {
            guild_id.to_string()
        };
        let mut roles = self.session.guild_roles(&guild_id).await?;
        if roles.is_empty() {
            return Err(CommandError::Validation("No roles found".to_string()));
        }
        roles.sort_by(|a, b| b.position.cmp(&a.position).then_with(|| a.id.cmp(&b.id)));
        let color = self.settings.snapshot().color_text;
        for role in &roles {
            self.console.line(format_role_line(role, color));
        }
        Ok(())
    }

    async fn member_info(&self, user_id: &str) -> Result<(), CommandError> {
        let guild_id = self.require_guild()?;
        let user_id = if user_id.is_empty() {
            self.session.current_user().await?.id
        } else {
            user_id.to_string()
        };
        let member = self.session.guild_member(&guild_id, &user_id).await?;
        let guild_roles = self.session.guild_roles(&guild_id).await?;
        let held: Vec<_> = member
            .roles
            .iter()
            .filter_map(|id| guild_roles.iter().find(|role| &role.id == id))
            .collect();
        let user = member_user(member.user.clone(), &user_id);

        let color = self.settings.snapshot().color_text;
        for line in format_member_info(&member, &user, &held, color) {
            self.console.line(line);
        }
        Ok(())
    }

    async fn member_add_role(&self, user_id: &str, role_id: &str) -> Result<(), CommandError> {
        let guild_id = self.require_guild()?;
        require_member_and_role(user_id, role_id)?;
        self.session
            .add_member_role(&guild_id, user_id, role_id)
            .await?;
        self.console.line("Granted role to user");
        Ok(())
    }

    async fn member_remove_role(&self, user_id: &str, role_id: &str) -> Result<(), CommandError> {
        let guild_id = self.require_guild()?;
        require_member_and_role(user_id, role_id)?;
        self.session
            .remove_member_role(&guild_id, user_id, role_id)
            .await?;
        self.console.line("Removed role from user");
        Ok(())
    }

    async fn member_nick(&self, user_id: &str, nick: &str) -> Result<(), CommandError> {
        let guild_id = self.require_guild()?;
        if user_id.is_empty() {
            return Err(CommandError::Validation(
                "You need to enter a userID".to_string(),
            ));
        }
        self.session
            .set_member_nickname(&guild_id, user_id, nick)
            .await?;
        if nick.is_empty() {
            self.console.line("Nickname cleared");
        } else {
            self.console.line(format!("Nickname set to {nick}"));
        }
        Ok(())
    }

    async fn username(&self, name: &str) -> Result<(), CommandError> {
        if name.is_empty() {
            return Err(CommandError::Validation(
                "Please enter the username you wish to use".to_string(),
            ));
        }
        let user = self.session.update_username(name).await?;
        self.console
            .line(format!("Username changed to {}", user.username));
        Ok(())
    }

    async fn status(&self, value: &str) -> Result<(), CommandError> {
        if value.is_empty() {
            return Err(CommandError::Validation(
                "Please enter a status to switch to".to_string(),
            ));
        }
        let status: Status = value.parse().map_err(CommandError::Validation)?;
        self.session.update_status(status).await?;
        let color = self.settings.snapshot().color_text;
        self.console.line(format!(
            "Status set to {}",
            color_status(status.as_str(), color)
        ));
        Ok(())
    }

    async fn playing(&self, game: &str) -> Result<(), CommandError> {
        if game.is_empty() {
            return Err(CommandError::Validation(
                "Please enter what you are playing".to_string(),
            ));
        }
        self.session.update_playing(Some(game)).await?;
        self.console.line(format!("Playing status set to: {game}"));
        Ok(())
    }
}

fn parse_count(value: &str, default: i64) -> u32 {
    value
        .parse::<i64>()
        .unwrap_or(default)
        .clamp(1, MAX_MESSAGE_COUNT) as u32
}

fn parse_dimension(value: &str) -> Result<u32, CommandError> {
    value
        .parse::<u32>()
        .map_err(|_| CommandError::Validation("Invalid number".to_string()))
}

fn parse_index(value: &str, missing: &str) -> Result<i64, CommandError> {
    if value.is_empty() {
        return Err(CommandError::Validation(missing.to_string()));
    }
    value
        .parse::<i64>()
        .map_err(|_| CommandError::Validation(format!("Invalid index: {value}")))
}

fn pick<T>(items: &[T], index: i64) -> Result<&T, CommandError> {
    usize::try_from(index)
        .ok()
        .and_then(|index| items.get(index))
        .ok_or_else(|| CommandError::Validation("Index out of bounds".to_string()))
}

fn compile_query(pattern: &str) -> Result<Regex, CommandError> {
    if pattern.is_empty() {
        return Err(CommandError::Validation(
            "Please provide a regular expression to search with".to_string(),
        ));
    }
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|error| CommandError::Validation(format!("Invalid regular expression: {error}")))
}

fn require_member_and_role(user_id: &str, role_id: &str) -> Result<(), CommandError> {
    if user_id.is_empty() || role_id.is_empty() {
        return Err(CommandError::Validation(
            "Please provide a member ID and a role ID".to_string(),
        ));
    }
    Ok(())
}

fn member_user(user: Option<User>, user_id: &str) -> User {
    user.unwrap_or_else(|| User {
        id: user_id.to_string(),
        ..Default::default()
    })
}
