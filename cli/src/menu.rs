//! Interactive menu loop: line commands from stdin multiplexed with service
//! events from the daemon connection.
use crate::helper::parse_hex_bytes;
use crate::transport::DaemonClient;
use mesh_node::address::Address;
use mesh_node::interface::{NodeEvent, NodeSender, SendOptions};
use mesh_node::lifecycle::{EventOutcome, NodeLifecycle};
use mesh_node::mesh::{AppKeyIndex, ElementIndex};
use mesh_node::models::onoff::OnOffClient;
use mesh_node::uuid::DeviceUuid;
use slog::{warn, Logger};
use std::io::Write;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

/// Element hosting the On/Off server and the vendor model.
const PRIMARY_ELEMENT: ElementIndex = ElementIndex(0);
/// Element hosting the On/Off client.
const CLIENT_ELEMENT: ElementIndex = ElementIndex(1);

const HELP: &str = "\
commands:
  state                  show node state and token
  token <16 hex>         adopt an attach token
  join                   request provisioning
  attach                 attach under the held token
  remove                 permanently leave the network
  dest <4|32 hex>        set destination (scalar address or 128-bit label)
  app-index <hex>        set application key index for sends
  send <hex bytes>       raw send from the vendor element to dest
  get                    client: query on/off state at dest
  set <on|off>           client: acknowledged on/off set at dest
  unack <on|off>         client: unacknowledged on/off set at dest
  help                   this text
  exit                   quit (token is saved)";

struct MenuState {
    dest: Address,
    app_index: AppKeyIndex,
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Runs until `exit`, stdin EOF or service loss. The adopted token (if any)
/// survives in the lifecycle for the caller to persist.
pub async fn run(
    node: &mut NodeLifecycle<Arc<DaemonClient>>,
    sender: Arc<DaemonClient>,
    events: &mut mpsc::UnboundedReceiver<NodeEvent>,
    log: &Logger,
) {
    let mut menu = MenuState {
        dest: Address::Unassigned,
        app_index: AppKeyIndex(0),
    };
    println!("{}", HELP);
    prompt();
    let mut input = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = input.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) | Err(_) => break,
                };
                if !handle_command(line.trim(), node, &sender, &mut menu).await {
                    break;
                }
                prompt();
            }
            event = events.recv() => match event {
                Some(event) => {
                    if node.handle_event(event).await == EventOutcome::Shutdown {
                        warn!(log, "service lost, leaving menu");
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

/// Handles one command line. Returns `false` to leave the menu.
async fn handle_command(
    line: &str,
    node: &mut NodeLifecycle<Arc<DaemonClient>>,
    sender: &Arc<DaemonClient>,
    menu: &mut MenuState,
) -> bool {
    let mut words = line.split_whitespace();
    let command = match words.next() {
        Some(command) => command,
        None => return true,
    };
    let argument = words.next();
    match (command, argument) {
        ("help", _) => println!("{}", HELP),
        ("state", _) => {
            println!("state: {}", node.state());
            match node.token() {
                Some(token) => println!("token: {}", token),
                None => println!("token: none"),
            }
            println!("dest: {}  app-index: {:x}", menu.dest, menu.app_index.0);
        }
        ("token", Some(text)) => match node.set_token(text) {
            Ok(token) => println!("token adopted: {}", token),
            Err(err) => eprintln!("error: {}", err),
        },
        ("token", None) => eprintln!("error: token requires 16 hex digits"),
        ("join", _) => match node.join().await {
            Ok(uuid) => println!("joining as {}", uuid),
            Err(err) => eprintln!("error: {}", err),
        },
        ("attach", _) => match node.attach().await {
            Ok(()) => println!("attached, state: {}", node.state()),
            Err(err) => eprintln!("error: {}", err),
        },
        ("remove", _) => match node.remove().await {
            Ok(()) => println!("node removed, token discarded"),
            Err(err) => eprintln!("error: {}", err),
        },
        ("dest", Some(text)) => set_destination(text, menu),
        ("dest", None) => eprintln!("error: dest requires 4 or 32 hex digits"),
        ("app-index", Some(text)) => match u16::from_str_radix(text, 16) {
            Ok(index) if text.len() <= 3 => {
                menu.app_index = AppKeyIndex(index);
                println!("app-index: {:x}", index);
            }
            _ => eprintln!("error: '{}' is not an app index (up to 3 hex digits)", text),
        },
        ("app-index", None) => eprintln!("error: app-index requires a hex value"),
        ("send", Some(text)) => match parse_hex_bytes(text) {
            Some(payload) => {
                deliver(sender, PRIMARY_ELEMENT, menu, payload).await;
            }
            None => eprintln!("error: '{}' is not an even-length hex string", text),
        },
        ("send", None) => eprintln!("error: send requires a hex payload"),
        ("get", _) => deliver(sender, CLIENT_ELEMENT, menu, OnOffClient::get_message()).await,
        ("set", Some(state)) => match parse_onoff(state) {
            Some(on) => {
                deliver(sender, CLIENT_ELEMENT, menu, OnOffClient::set_message(on, true)).await
            }
            None => eprintln!("error: set requires 'on' or 'off'"),
        },
        ("unack", Some(state)) => match parse_onoff(state) {
            Some(on) => {
                deliver(sender, CLIENT_ELEMENT, menu, OnOffClient::set_message(on, false)).await
            }
            None => eprintln!("error: unack requires 'on' or 'off'"),
        },
        ("set", None) | ("unack", None) => eprintln!("error: expected 'on' or 'off'"),
        ("exit", _) | ("quit", _) => return false,
        _ => eprintln!("unknown command '{}', try 'help'", command),
    }
    true
}

fn parse_onoff(text: &str) -> Option<bool> {
    match text {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

/// A 4-digit scalar sets a unicast/group destination; a 32-digit string is
/// taken as a full virtual label.
fn set_destination(text: &str, menu: &mut MenuState) {
    match text.len() {
        4 => match u16::from_str_radix(text, 16)
            .ok()
            .and_then(|scalar| Address::from_scalar(scalar).ok())
        {
            Some(address) => {
                menu.dest = address;
                println!("dest: {}", menu.dest);
            }
            None => eprintln!("error: '{}' is not a sendable scalar address", text),
        },
        32 => match text.parse::<DeviceUuid>() {
            Ok(label) => {
                menu.dest = Address::Label(label);
                println!("dest: {}", menu.dest);
            }
            Err(err) => eprintln!("error: {}", err),
        },
        _ => eprintln!("error: dest takes 4 hex digits (scalar) or 32 (label)"),
    }
}

async fn deliver(
    sender: &Arc<DaemonClient>,
    element: ElementIndex,
    menu: &MenuState,
    payload: Vec<u8>,
) {
    if !menu.dest.is_assigned() {
        eprintln!("error: set a destination first (dest <hex>)");
        return;
    }
    match sender
        .send(
            element,
            menu.dest,
            menu.app_index,
            SendOptions::default(),
            payload,
        )
        .await
    {
        Ok(()) => println!("sent to {}", menu.dest),
        Err(err) => eprintln!("error: {}", err),
    }
}
