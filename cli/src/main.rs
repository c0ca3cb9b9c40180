use slog::Drain;
#[macro_use]
extern crate slog;

mod helper;
mod menu;
mod transport;

use mesh_node::element::{Element, ElementRegistry};
use mesh_node::interface::{NodeSender, ObjectPath};
use mesh_node::lifecycle::NodeLifecycle;
use mesh_node::mesh::ElementIndex;
use mesh_node::models::onoff::{OnOffClient, OnOffServer};
use mesh_node::models::vendor::VendorModel;
use mesh_node::storage::TokenStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

const APP_PATH: &str = "/mesh/example/node";

pub enum CLIError {
    IOError(String, std::io::Error),
    Token(mesh_node::mesh::TokenParseError),
    Storage(mesh_node::storage::StorageError),
    Registry(mesh_node::element::DuplicateElementIndex),
    OtherMessage(String),
}

fn main() {
    let app = clap::App::new("Mesh Node CLI")
        .version(clap::crate_version!())
        .about("Interactive front end for the reference mesh node")
        .arg(
            clap::Arg::with_name("token")
                .index(1)
                .validator(helper::is_token_validator)
                .help("Attach token from a previous join (16 hex digits)"),
        )
        .arg(
            clap::Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .multiple(true)
                .max_values(5)
                .help("Set the amount of logging from level 0 up to level 5"),
        )
        .arg(
            clap::Arg::with_name("daemon")
                .short("d")
                .long("daemon")
                .value_name("ADDR")
                .default_value("127.0.0.1:8790")
                .help("Management daemon address"),
        )
        .arg(
            clap::Arg::with_name("scan_file")
                .long("scan-file")
                .value_name("FILE")
                .default_value("scan.txt")
                .help("Scan log published by the vendor model"),
        )
        .arg(
            clap::Arg::with_name("token_file")
                .long("token-file")
                .value_name("FILE")
                .default_value("node_token.json")
                .help("Where the node token is persisted between runs"),
        );
    let matches = app.get_matches();

    let drain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    let root = slog::Logger::root(slog_term::FullFormat::new(drain).build().fuse(), slog::o!());
    debug!(root, "starting"; "daemon" => matches.value_of("daemon").unwrap_or_default());

    let runtime = helper::tokio_runtime();
    if let Err(e) = runtime.block_on(run(&matches, &root)) {
        match e {
            CLIError::IOError(what, error) => eprintln!("io error {:?} with '{}'", error, what),
            CLIError::Token(error) => eprintln!("token error: {}", error),
            CLIError::Storage(error) => eprintln!("token store error: {}", error),
            CLIError::Registry(error) => eprintln!("registry error: {}", error),
            CLIError::OtherMessage(msg) => eprintln!("error: {}", &msg),
        }
        std::process::exit(1);
    }
}

async fn run(matches: &clap::ArgMatches<'_>, root: &slog::Logger) -> Result<(), CLIError> {
    let daemon_addr = matches
        .value_of("daemon")
        .ok_or_else(|| CLIError::OtherMessage("missing daemon address".to_owned()))?;
    let scan_path = PathBuf::from(matches.value_of("scan_file").unwrap_or("scan.txt"));
    let token_path = PathBuf::from(matches.value_of("token_file").unwrap_or("node_token.json"));

    let mut primary = Element::new(ElementIndex(0));
    primary.add_model(Box::new(OnOffServer::new(
        root.new(o!("model" => "onoff_server")),
    )));
    primary.add_model(Box::new(VendorModel::new(
        scan_path,
        root.new(o!("model" => "vendor")),
    )));
    let mut secondary = Element::new(ElementIndex(1));
    secondary.add_model(Box::new(OnOffClient::new(
        root.new(o!("model" => "onoff_client")),
    )));
    let mut registry = ElementRegistry::new();
    registry.add_element(primary).map_err(CLIError::Registry)?;
    registry.add_element(secondary).map_err(CLIError::Registry)?;
    let composition = registry.describe_for_registration();
    let registry = Arc::new(Mutex::new(registry));

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let client = transport::DaemonClient::connect(
        daemon_addr,
        composition,
        events_tx,
        root.new(o!("mod" => "transport")),
    )
    .await
    .map_err(|e| CLIError::IOError(daemon_addr.to_owned(), e))?;
    info!(root, "connected"; "daemon" => daemon_addr);

    let mut node = NodeLifecycle::new(
        client.clone(),
        client.clone() as Arc<dyn NodeSender>,
        registry,
        ObjectPath::new(APP_PATH),
        client.service_path().clone(),
        root.new(o!("mod" => "lifecycle")),
    );

    let store = TokenStore::new(token_path);
    match matches.value_of("token") {
        Some(text) => {
            node.set_token(text).map_err(CLIError::Token)?;
        }
        None => {
            if let Some(token) = store.load().map_err(CLIError::Storage)? {
                info!(root, "token restored from store");
                node.adopt_token(token);
            }
        }
    }

    menu::run(&mut node, client, &mut events_rx, root).await;
    node.shutdown();
    if let Some(token) = node.token() {
        store.store(token).map_err(CLIError::Storage)?;
        info!(root, "token saved");
    }
    Ok(())
}
