mod api;
mod ascii;
mod auth;
mod commands;
mod config;
mod console;
mod events;
mod gateway;
mod model;
mod output;
mod render;
mod session;
mod state;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use clap::{ArgAction, Parser};
use tokio::io::BufReader;
use tracing::error;

use crate::api::ApiClient;
use crate::commands::{Dispatcher, HELP, InputLines};
use crate::config::{Config, DisplayOptions, Settings};
use crate::console::Console;
use crate::events::EventBridge;
use crate::render::Renderer;
use crate::session::{DiscordSession, Session};
use crate::state::ClientState;

#[derive(Parser)]
#[command(
    name = "discordterm",
    version,
    about = "Chat on Discord from the terminal",
    after_help = "Examples:\n  discordterm -t <token>\n  discordterm -u you@example.com -p hunter2\n  discordterm --show-images --color-images --img-width 60\n  DISCORDTERM_TOKEN=<token> discordterm"
)]
struct Cli {
    #[arg(short = 'u', long, help = "Login name")]
    username: Option<String>,

    #[arg(short = 'p', long, help = "Password")]
    password: Option<String>,

    #[arg(short = 't', long, help = "User token, or a bot token prefixed with \"Bot \"")]
    token: Option<String>,

    #[arg(help = "Username and password, or a single token")]
    args: Vec<String>,

    #[arg(long, default_value_t = true, action = ArgAction::Set, help = "Show guild nicknames")]
    show_nicknames: bool,

    #[arg(short = 'i', long, help = "Draw images as messages arrive")]
    show_images: bool,

    #[arg(long, default_value_t = 100, help = "Image width in characters")]
    img_width: u32,

    #[arg(long, default_value_t = 0, help = "Image height in lines, 0 keeps the aspect ratio")]
    img_height: u32,

    #[arg(long, help = "Draw images in colour")]
    color_images: bool,

    #[arg(short = 'c', long, default_value_t = true, action = ArgAction::Set, help = "Colour text")]
    color_text: bool,
}

impl Cli {
    fn display_options(&self) -> DisplayOptions {
        DisplayOptions {
            color_text: self.color_text,
            color_images: self.color_images,
            show_images: self.show_images,
            show_nicknames: self.show_nicknames,
            image_width: self.img_width,
            image_height: self.img_height,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        // stdin is read on a blocking thread that would keep the runtime alive
        Ok(()) => std::process::exit(0),
        Err(error) => {
            error!(%error, "discordterm failed");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load();
    let options = cli.display_options();

    let api = ApiClient::new(config.api_base_url.clone());
    let credentials = match auth::resolve_credentials(
        cli.username,
        cli.password,
        cli.token,
        &cli.args,
        config.env_token.clone(),
    ) {
        Some(credentials) => credentials,
        None => auth::prompt_credentials()?,
    };
    let token = auth::login(&api, credentials).await?;

    let (session, me) = DiscordSession::connect(&config, &token).await?;
    let session: Arc<dyn Session> = session;
    let state = Arc::new(ClientState::new());
    let settings = Arc::new(Settings::new(options));
    let console = Console::stdout();
    let renderer = Arc::new(Renderer::new(Arc::clone(&session)));

    let bridge = Arc::new(EventBridge::new(
        Arc::clone(&session),
        Arc::clone(&state),
        Arc::clone(&settings),
        Arc::clone(&renderer),
        console.clone(),
    ));
    let _events = bridge.spawn();

    let dispatcher = Dispatcher::new(session, state, settings, renderer, console.clone());
    console.line(HELP);
    console.line(format!("Connected as {}", me.username));
    console.line("Select a guild and channel");

    let input = InputLines::new(BufReader::new(tokio::io::stdin()));
    dispatcher.run(input).await?;
    Ok(())
}
