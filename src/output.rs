use crossterm::style::{Color, Stylize, style};
use unicode_width::UnicodeWidthStr;

use crate::model::{Channel, Guild, Member, Presence, Role, User};

const USERNAME_COLUMN: usize = 35;
const NICKNAME_COLUMN: usize = 25;
const STATUS_COLUMN: usize = 7;

pub fn paint(text: &str, color: Color, enabled: bool) -> String {
    if enabled {
        style(text).with(color).to_string()
    } else {
        text.to_string()
    }
}

pub fn format_on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

pub fn format_guild_line(index: usize, guild: &Guild, active: bool, unread: u64, color: bool) -> String {
    format_listing_line(index, &guild.name, active, unread, color)
}

pub fn format_channel_line(
    index: usize,
    channel: &Channel,
    active: bool,
    unread: u64,
    color: bool,
) -> String {
    format_listing_line(index, channel.display_name(), active, unread, color)
}

fn format_listing_line(index: usize, name: &str, active: bool, unread: u64, color: bool) -> String {
    let index = index.to_string();
    if !color {
        return format!("{index}\t{name}");
    }
    if active {
        format!("{}\t{}", paint(&index, Color::Magenta, true), paint(name, Color::Magenta, true))
    } else if unread > 0 {
        format!(
            "{}\t{} {}",
            paint(&index, Color::Green, true),
            paint(name, Color::Green, true),
            paint(&format!("[{unread}]"), Color::Red, true)
        )
    } else {
        format!("{index}\t{name}")
    }
}

pub fn format_member_line(member: &Member, color: bool) -> String {
    let id = member.user_id().unwrap_or("");
    let username = member.username();
    let nick = member.nick.as_deref().unwrap_or("");
    format!(
        "{}\t{}{} {}",
        paint(id, Color::Cyan, color),
        paint(username, Color::Red, color),
        padding(username, USERNAME_COLUMN),
        paint(nick, Color::Green, color),
    )
}

pub fn format_presence_line(presence: &Presence, member: Option<&Member>, color: bool) -> String {
    let (username, nick) = match member {
        Some(member) => (member.username(), member.nick.as_deref().unwrap_or("")),
        None => ("-------", "---------"),
    };
    let status = presence.status.as_str();
    let game = presence.game().unwrap_or("");
    format!(
        "{}\t{}{} {}{} {}{} {}",
        paint(&presence.user.id, Color::Cyan, color),
        paint(username, Color::Red, color),
        padding(username, USERNAME_COLUMN),
        paint(nick, Color::Green, color),
        padding(nick, NICKNAME_COLUMN),
        color_status(status, color),
        padding(status, STATUS_COLUMN),
        game,
    )
}

pub fn color_status(status: &str, color: bool) -> String {
    let tint = match status {
        "online" => Some(Color::Green),
        "dnd" => Some(Color::Red),
        "idle" | "away" => Some(Color::DarkYellow),
        _ => None,
    };
    match tint {
        Some(tint) => paint(status, tint, color),
        None => status.to_string(),
    }
}

pub fn format_role_line(role: &Role, color: bool) -> String {
    format!(
        "{}\t{}",
        paint(&role.id, Color::Cyan, color),
        paint(&role.name, Color::Green, color)
    )
}

/// Member detail block for `member-info`. `roles` are the guild roles the
/// member holds.
pub fn format_member_info(member: &Member, user: &User, roles: &[&Role], color: bool) -> Vec<String> {
    let nick = member.nick.as_deref().unwrap_or("");
    let mut lines = vec![
        format!("ID           \t{}", user.id),
        format!("Username:    \t{}", paint(&user.username, Color::Red, color)),
        format!("Nickname:    \t{}", paint(nick, Color::Green, color)),
        format!("Discriminator\t{}", paint(&user.discriminator, Color::Cyan, color)),
        format!("Avatar URL:  \t{}", paint(&user.avatar_url(1024), Color::Green, color)),
    ];
    if !roles.is_empty() {
        lines.push("Roles:".to_string());
        for role in roles {
            lines.push(format!(
                "    {}\t{}",
                paint(&role.id, Color::Cyan, color),
                paint(&role.name, Color::Red, color)
            ));
        }
    }
    lines
}

pub fn display_width(value: &str) -> usize {
    UnicodeWidthStr::width(value)
}

pub fn pad_right(value: &str, width: usize) -> String {
    let mut output = value.to_string();
    output.push_str(&padding(value, width));
    output
}

fn padding(value: &str, width: usize) -> String {
    " ".repeat(width.saturating_sub(display_width(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guild(name: &str) -> Guild {
        Guild {
            id: "1".to_string(),
            name: name.to_string(),
            roles: Vec::new(),
        }
    }

    #[test]
    fn plain_listing_line_is_index_tab_name() {
        assert_eq!(format_guild_line(0, &guild("rust"), false, 0, false), "0\trust");
        assert_eq!(format_guild_line(3, &guild("go"), true, 9, false), "3\tgo");
    }

    #[test]
    fn colored_listing_line_shows_unread_count() {
        let line = format_guild_line(2, &guild("rust"), false, 4, true);
        assert!(line.contains("[4]"));
        assert!(line.contains("rust"));

        let quiet = format_guild_line(2, &guild("rust"), false, 0, true);
        assert_eq!(quiet, "2\trust");
    }

    #[test]
    fn padding_uses_display_width() {
        assert_eq!(pad_right("ab", 4), "ab  ");
        assert_eq!(pad_right("日本", 6), "日本  ");
        assert_eq!(pad_right("toolong", 3), "toolong");
    }

    #[test]
    fn on_off_formatting() {
        assert_eq!(format_on_off(true), "on");
        assert_eq!(format_on_off(false), "off");
    }

    #[test]
    fn member_line_pads_username_column() {
        let member = Member {
            user: Some(User {
                id: "7".to_string(),
                username: "ada".to_string(),
                ..Default::default()
            }),
            nick: Some("Countess".to_string()),
            roles: Vec::new(),
        };
        let line = format_member_line(&member, false);
        assert_eq!(line, format!("7\tada{} Countess", " ".repeat(32)));
    }

    #[test]
    fn presence_without_member_uses_placeholders() {
        let presence = Presence {
            user: crate::model::PartialUser { id: "9".to_string() },
            status: "online".to_string(),
            ..Default::default()
        };
        let line = format_presence_line(&presence, None, false);
        assert!(line.starts_with("9\t-------"));
        assert!(line.contains("---------"));
        assert!(line.contains("online"));
    }

    #[test]
    fn member_info_lists_roles() {
        let user = User {
            id: "5".to_string(),
            username: "bea".to_string(),
            discriminator: "0001".to_string(),
            ..Default::default()
        };
        let member = Member {
            user: Some(user.clone()),
            nick: None,
            roles: vec!["r1".to_string()],
        };
        let role = Role {
            id: "r1".to_string(),
            name: "mods".to_string(),
            ..Default::default()
        };
        let lines = format_member_info(&member, &user, &[&role], false);
        assert_eq!(lines[0], "ID           \t5");
        assert_eq!(lines.last().map(String::as_str), Some("    r1\tmods"));
    }
}
