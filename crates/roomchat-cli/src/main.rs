//! RoomChat CLI - terminal client for RoomChat rooms.

mod render;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use roomchat_client::convert::history_to_messages;
use roomchat_client::{ApiClient, ClientConfig, HttpBackend, ReconnectPolicy, RoomSession};
use roomchat_core::{AuthToken, RoomCode, Sender, Session, DEFAULT_BOT_NAME};

use render::{format_message, Line, TranscriptView};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// RoomChat CLI - chat rooms with a streaming bot
#[derive(Parser)]
#[command(name = "roomchat")]
#[command(about = "Terminal client for RoomChat rooms", long_about = None)]
struct Cli {
    /// REST API base URL
    #[arg(long, env = "ROOMCHAT_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// WebSocket base URL (derived from the API URL when omitted)
    #[arg(long, env = "ROOMCHAT_WS_URL")]
    ws_url: Option<String>,

    /// Access token from `login`
    #[arg(long, env = "ROOMCHAT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Signup {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },

    /// Log in and print an access token
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },

    /// Show the account the token belongs to
    Whoami,

    /// List rooms you are a member of
    Rooms,

    /// Create a room
    #[command(name = "create-room")]
    CreateRoom {
        /// Room name
        name: String,
    },

    /// Print the stored messages of a room
    History {
        /// Room code
        code: String,
    },

    /// Join a room as a participant
    Join {
        /// Room code
        code: String,
    },

    /// Chat in a room interactively
    Chat {
        /// Room code
        code: String,

        /// Display name for your own messages (looked up when omitted)
        #[arg(long)]
        username: Option<String>,

        /// Do not reconnect after the channel drops
        #[arg(long)]
        no_reconnect: bool,
    },
}

#[tokio::main]
async fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::new(&cli.api_url);
    if let Some(ws_url) = &cli.ws_url {
        config = config.with_ws_url(ws_url);
    }
    let api = ApiClient::new(&config.api_url);
    let token = cli.token.map(AuthToken::new).filter(|t| !t.is_blank());

    match cli.command {
        Commands::Signup { username, password } => {
            let response = api.signup(&username, &password).await?;
            match response.access_token {
                Some(token) => println!("{}", token),
                None => println!(
                    "{}",
                    response.detail.unwrap_or_else(|| "Account created".to_string())
                ),
            }
        }
        Commands::Login { username, password } => {
            let response = api.login(&username, &password).await?;
            println!("{}", response.access_token);
        }
        Commands::Whoami => {
            let api = api.with_token(require(token)?);
            let user = api.me().await?;
            println!("{} (id {})", user.username, user.id);
        }
        Commands::Rooms => {
            let api = api.with_token(require(token)?);
            list_rooms(&api).await?;
        }
        Commands::CreateRoom { name } => {
            let api = api.with_token(require(token)?);
            let room = api.create_room(&name).await?;
            println!("Room created: {} ({})", room.room_name, room.room_code);
        }
        Commands::History { code } => {
            let token = require(token)?;
            let api = api.with_token(token.clone());
            let session = resolve_session(&api, token, None).await?;
            print_history(&api, &session, &RoomCode::new(code)).await?;
        }
        Commands::Join { code } => {
            let api = api.with_token(require(token)?);
            let joined = api.join_room(&RoomCode::new(code)).await?;
            println!("Joined {} ({})", joined.room_name, joined.room_code);
        }
        Commands::Chat {
            code,
            username,
            no_reconnect,
        } => {
            let token = require(token)?;
            let api = api.with_token(token.clone());
            let session = resolve_session(&api, token.clone(), username).await?;
            if no_reconnect {
                config = config.with_reconnect(ReconnectPolicy::disabled());
            }
            chat(config, Arc::new(session), token, RoomCode::new(code)).await?;
        }
    }

    Ok(())
}

fn require(token: Option<AuthToken>) -> CliResult<AuthToken> {
    token.ok_or_else(|| "no access token: pass --token or set ROOMCHAT_TOKEN (see `roomchat login`)".into())
}

/// Build the session from the token, asking the backend for the username when
/// it was not given.
async fn resolve_session(api: &ApiClient, token: AuthToken, username: Option<String>) -> CliResult<Session> {
    if let Some(username) = username {
        return Ok(Session::from_token(token, username)?);
    }
    match api.me().await {
        Ok(user) => Ok(Session::new(user.id, user.username, token)),
        Err(e) => {
            debug!(error = %e, "Profile lookup failed, reading identity from token");
            let session = Session::from_token(token, "me")?;
            Ok(session)
        }
    }
}

async fn list_rooms(api: &ApiClient) -> CliResult<()> {
    let rooms = api.my_rooms().await?;
    println!("Rooms ({}):", rooms.len());
    println!("{:<10}  {:<8}  {}", "CODE", "MEMBERS", "NAME");
    println!("{}", "-".repeat(50));
    for room in rooms {
        println!("{:<10}  {:<8}  {}", room.room_code, room.users.len(), room.room_name);
    }
    Ok(())
}

async fn print_history(api: &ApiClient, session: &Session, room: &RoomCode) -> CliResult<()> {
    let entries = api.messages(room).await?;
    let bot = Sender::automated("bot", DEFAULT_BOT_NAME);
    for message in history_to_messages(entries, session, &bot) {
        println!("{}", format_message(&message));
    }
    Ok(())
}

async fn chat(config: ClientConfig, session: Arc<Session>, token: AuthToken, room: RoomCode) -> CliResult<()> {
    let backend = Arc::new(HttpBackend::new(&config, token));
    let room_session = Arc::new(RoomSession::join(backend, session.clone(), room.clone(), config));
    eprintln!("* joined {} as {} (type /quit to leave)", room, session.username);

    let mut updates = room_session.updates();
    let mut view = TranscriptView::new();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            snapshot = updates.next() => match snapshot {
                Some(snapshot) => {
                    for line in view.update(&snapshot) {
                        match line {
                            Line::Message(text) => println!("{}", text),
                            Line::Status(text) => eprintln!("{}", text),
                        }
                    }
                }
                None => break,
            },

            line = input.next_line() => match line {
                Ok(Some(line)) => {
                    let text = line.trim();
                    if text == "/quit" {
                        break;
                    }
                    if text.is_empty() {
                        continue;
                    }
                    let room_session = room_session.clone();
                    let content = text.to_string();
                    tokio::spawn(async move {
                        if let Err(e) = room_session.send(content.clone()).await {
                            warn!(error = %e, "Send failed");
                            eprintln!("* not sent ({}): {}", e, content);
                        }
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    eprintln!("* input error: {}", e);
                    break;
                }
            },

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    room_session.close().await;
    Ok(())
}
