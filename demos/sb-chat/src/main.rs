use std::process::ExitCode;

use switchboard::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};

const USAGE: &str = "\
usage: sb-chat <account> open <host:port> <session-id> <invitee>
       sb-chat <account> accept <host:port> <session-id> <auth-token>

Set SB_CHAT_CONFIG to a JSON session config to change transport or
recording settings. Commands: /nudge /typing /invite <account> /info /quit";

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Open { invitee: String },
    Accept { auth_token: String },
}

#[derive(Debug, PartialEq, Eq)]
struct Invocation {
    account: String,
    host: String,
    port: u16,
    session_id: String,
    mode: Mode,
}

impl Invocation {
    fn parse(args: &[String]) -> Option<Self> {
        let [account, mode, addr, session_id, last] = args else {
            return None;
        };
        let (host, port) = addr.rsplit_once(':')?;
        let port = port.parse().ok()?;
        let mode = match mode.as_str() {
            "open" => Mode::Open { invitee: last.clone() },
            "accept" => Mode::Accept { auth_token: last.clone() },
            _ => return None,
        };
        Some(Self {
            account: account.clone(),
            host: host.to_string(),
            port,
            session_id: session_id.clone(),
            mode,
        })
    }
}

/// What a line typed on stdin asks for.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    Send(ChatMessage),
    Invite(String),
    Info,
    Quit,
    Nothing,
}

impl Action {
    fn parse(line: &str, account: &str) -> Self {
        let line = line.trim();
        match line.split_once(' ').unwrap_or((line, "")) {
            ("", _) => Action::Nothing,
            ("/quit", _) => Action::Quit,
            ("/info", _) => Action::Info,
            ("/nudge", _) => Action::Send(ChatMessage::nudge(account)),
            ("/typing", _) => Action::Send(ChatMessage::typing(account)),
            ("/invite", who) if !who.trim().is_empty() => Action::Invite(who.trim().to_string()),
            _ => Action::Send(ChatMessage::text(account, line)),
        }
    }
}

fn load_config(account: &str) -> Result<SessionConfig, Box<dyn std::error::Error>> {
    let mut config = match std::env::var("SB_CHAT_CONFIG") {
        Ok(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        Err(_) => SessionConfig::default(),
    };
    config.account = account.to_string();
    Ok(config)
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::MessageReceived { account, message, .. } => match message.kind {
            MessageKind::Text => println!("{account}: {}", message.body_text()),
            MessageKind::Nudge => println!("* {account} just sent you a nudge!"),
            MessageKind::Typing => println!("* {account} is typing..."),
            _ => {}
        },
        SessionEvent::ContactJoined { account, .. } => println!("* {account} joined"),
        SessionEvent::ContactLeft { account, .. } => println!("* {account} left"),
        SessionEvent::MessageSendFailed { message, .. } => {
            println!("! not delivered: {}", message.body_text())
        }
        SessionEvent::ConversationClosed { cid } => println!("* conversation {cid} closed"),
        other => tracing::debug!(?other, "event"),
    }
}

// ---------------------------------------------------------------------------
// Chat loop
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    switchboard::init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(inv) = Invocation::parse(&args) else {
        eprintln!("{USAGE}");
        return Ok(ExitCode::from(2));
    };

    let mut session = SessionBuilder::from_config(load_config(&inv.account)?).build()?;
    let chat = match &inv.mode {
        Mode::Open { invitee } => {
            session.open(&inv.host, inv.port, &inv.session_id, invitee).await?
        }
        Mode::Accept { auth_token } => {
            session.accept(&inv.host, inv.port, &inv.session_id, auth_token).await?
        }
    };
    eprintln!("connected to {}:{} as {}", inv.host, inv.port, inv.account);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                match Action::parse(&line, &inv.account) {
                    Action::Send(message) => chat.send_message(message)?,
                    Action::Invite(account) => chat.invite(account)?,
                    Action::Info => println!("{}", serde_json::to_string_pretty(&chat.info().await?)?),
                    Action::Quit => break,
                    Action::Nothing => {}
                }
            }
            event = session.next_event() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
        }
    }

    session.shutdown().await;
    Ok(ExitCode::SUCCESS)
}
