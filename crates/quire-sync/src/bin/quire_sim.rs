use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use miette::IntoDiagnostic;
use quire_common::storage::{FileStorage, LocalStorage, MemoryStorage};
use quire_common::telemetry::{self, TelemetryConfig};
use quire_common::{Config, DocumentId, FileStore, TimingPolicy};
use quire_sync::memory::{MemoryHub, MemoryPersistence, MemoryTransport, SwitchConnectivity};
use quire_sync::{
    Collaborators, DocumentSession, EditableState, SessionEvent, SessionHandle, SessionOptions,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "quire-sim")]
#[command(about = "Run quire sync sessions against in-process backends")]
struct Args {
    /// Configuration file (.json or .toml)
    #[arg(long, short, env = "QUIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for the local cache. In-memory if omitted.
    #[arg(long, env = "QUIRE_STORAGE_DIR")]
    storage: Option<PathBuf>,

    /// Use zero-length timing windows instead of the configured ones
    #[arg(long)]
    fast: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scenario and print the events each client sees
    Run {
        #[arg(value_enum, default_value_t = Scenario::Collab)]
        scenario: Scenario,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum Scenario {
    /// Two clients editing the same document
    Collab,
    /// One client edits offline while the other saves, then reconnects
    Offline,
}

const DOC: &str = "notes";

#[tokio::main]
async fn main() -> miette::Result<()> {
    telemetry::init(TelemetryConfig::from_env("quire-sim"));

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(&FileStore::new(path)).await?,
        None => Config::default(),
    };
    if args.fast {
        config.sync.timing = TimingPolicy::immediate();
    }

    let storage: Arc<dyn LocalStorage> = match &args.storage {
        Some(dir) => Arc::new(FileStorage::open(dir)?),
        None => Arc::new(MemoryStorage::new()),
    };

    match args.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config).into_diagnostic()?);
            Ok(())
        }
        Command::Run { scenario } => {
            let sim = Sim::new(config, storage);
            match scenario {
                Scenario::Collab => sim.collab().await?,
                Scenario::Offline => sim.offline().await?,
            }
            println!("{}", telemetry::render());
            Ok(())
        }
    }
}

struct Sim {
    config: Config,
    storage: Arc<dyn LocalStorage>,
    hub: MemoryHub,
    persistence: Arc<MemoryPersistence>,
    id: DocumentId,
}

struct Client {
    name: &'static str,
    handle: SessionHandle,
    transport: Arc<MemoryTransport>,
    connectivity: Arc<SwitchConnectivity>,
}

impl Sim {
    fn new(config: Config, storage: Arc<dyn LocalStorage>) -> Self {
        let persistence = Arc::new(MemoryPersistence::new());
        let id = DocumentId::new_static(DOC);
        persistence.insert(&id, EditableState::new("Notes", "# Notes\n"));
        Self {
            config,
            storage,
            hub: MemoryHub::new(),
            persistence,
            id,
        }
    }

    fn open(&self, name: &'static str) -> miette::Result<Client> {
        let initial = self
            .persistence
            .get(&self.id)
            .map(|document| document.state())
            .ok_or_else(|| miette::miette!("document {} missing", self.id))?;

        let transport = Arc::new(
            MemoryTransport::new(&self.hub, name, name)
                .with_stale_after(self.config.sync.stale_cursor_after),
        );
        let connectivity = Arc::new(SwitchConnectivity::default());
        let mut options = SessionOptions::from_config(&self.config);
        options.username = name.into();

        let handle = DocumentSession::spawn(
            self.id.clone(),
            initial,
            Collaborators {
                transport: transport.clone(),
                persistence: self.persistence.clone(),
                connectivity: connectivity.clone(),
                storage: self.storage.clone(),
            },
            options,
        );
        Ok(Client {
            name,
            handle,
            transport,
            connectivity,
        })
    }

    /// Long enough for every debounce window to run out.
    fn settle_time(&self) -> Duration {
        let timing = &self.config.sync.timing;
        timing.save_debounce_window
            + timing.emit_debounce_window
            + timing.echo_suppression_window
            + Duration::from_millis(200)
    }

    async fn collab(&self) -> miette::Result<()> {
        let mut alice = self.open("alice")?;
        let mut bob = self.open("bob")?;

        alice.handle.edit("# Notes\n\nfirst line from alice\n\n\n\n")?;
        alice.handle.move_cursor(30)?;
        tokio::time::sleep(self.settle_time()).await;

        bob.handle.edit("# Notes\n\nfirst line from alice\nand one from bob\n")?;
        tokio::time::sleep(self.settle_time()).await;

        report(&mut alice);
        report(&mut bob);

        let outcome = alice.handle.flush(None).await;
        info!(?outcome, "alice flushed");

        self.finish(vec![alice, bob]).await
    }

    async fn offline(&self) -> miette::Result<()> {
        let mut alice = self.open("alice")?;
        let mut bob = self.open("bob")?;

        alice.connectivity.set_online(false);
        alice.transport.set_connected(false);
        alice.handle.set_online(false)?;
        alice.handle.edit("# Notes\n\nwritten on a train\n")?;
        tokio::time::sleep(self.settle_time()).await;

        bob.handle.edit("# Notes\n\nbob was here\n")?;
        tokio::time::sleep(self.settle_time()).await;

        alice.connectivity.set_online(true);
        alice.transport.set_connected(true);
        alice.handle.set_online(true)?;
        tokio::time::sleep(self.settle_time()).await;

        report(&mut alice);
        report(&mut bob);
        self.finish(vec![alice, bob]).await
    }

    async fn finish(&self, clients: Vec<Client>) -> miette::Result<()> {
        for client in clients {
            let name = client.name;
            client.handle.unmount().await;
            info!(client = name, "unmounted");
        }
        for (id, update) in self.persistence.saves() {
            info!(document = %id, title = %update.title, len = update.content.len(), "saved");
        }
        match self.persistence.get(&self.id) {
            Some(document) => println!("--- {} ---\n{}", document.title, document.content),
            None => warn!(document = %self.id, "document vanished"),
        }
        Ok(())
    }
}

fn report(client: &mut Client) {
    for event in client.handle.drain_events() {
        match event {
            SessionEvent::Status(status) => info!(client = client.name, %status, "status"),
            SessionEvent::ApplyContent(text) => {
                info!(client = client.name, len = text.len(), "apply content")
            }
            SessionEvent::ReplaceState(state) => {
                info!(client = client.name, title = %state.title, "replace state")
            }
            SessionEvent::Forked { document_id, title } => {
                info!(client = client.name, fork = %document_id, %title, "forked")
            }
            SessionEvent::Cursors(cursors) => {
                for cursor in cursors {
                    info!(
                        client = client.name,
                        remote = %cursor.username,
                        offset = cursor.offset,
                        color = %quire_editor_core::rgba_u32_to_css(cursor.color),
                        "remote cursor"
                    );
                }
            }
        }
    }
}
