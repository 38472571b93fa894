use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sanctuary_contracts::chat::{help_lines, parse_intent, Intent};
use sanctuary_contracts::components::{render_lines, resolve};
use sanctuary_contracts::events::EventWriter;
use sanctuary_contracts::ledger::{JsonLedgerStore, LedgerStore, SignOutcome};
use sanctuary_contracts::messages::{MessageLog, Role};
use sanctuary_contracts::models::{Capability, ModelSelector};
use sanctuary_contracts::payload::A2uiPayload;
use sanctuary_contracts::rooms::{
    is_known_room, ClearOutcome, JsonRoomStateStore, RoomStateStore, Transition, UserId,
    KNOWN_ROOMS,
};
use sanctuary_engine::telemetry;
use sanctuary_engine::{
    ChatSession, EventLogSink, Fanout, IntakePipeline, ModelProviderRegistry, ModelRoute,
    NarrativeSink, Orchestrator, SanctuaryConfig, ScanOutcome, ToolResult,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sanctuary", version, about = "Sanctuary wall orchestrator")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,
    #[command(subcommand)]
    command: Command,
}

/// Flags that win over the `SANCTUARY_*` environment.
#[derive(Debug, Args)]
struct Overrides {
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    user: Option<String>,
    #[arg(long, global = true)]
    provider: Option<String>,
    #[arg(long, global = true)]
    vision_model: Option<String>,
    #[arg(long, global = true)]
    text_model: Option<String>,
    /// Model request timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<f64>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session with the core.
    Chat,
    /// Run one image through visual intake.
    Scan(ScanArgs),
    #[command(subcommand)]
    Room(RoomCommand),
    /// Set the current room's HUD objective.
    Objective(ObjectiveArgs),
    #[command(subcommand)]
    Ledger(LedgerCommand),
    #[command(subcommand)]
    Admin(AdminCommand),
    /// Run a `{"tool": ..., "args": {...}}` call against the orchestrator.
    Tool(ToolArgs),
}

#[derive(Debug, Parser)]
struct ScanArgs {
    path: PathBuf,
}

#[derive(Debug, Subcommand)]
enum RoomCommand {
    /// Render what a room is showing.
    Show {
        #[arg(long)]
        room: Option<String>,
    },
    /// Rooms with stored state for this user.
    List,
    /// Clear this user's state for a room.
    Clear {
        #[arg(long)]
        room: Option<String>,
    },
}

#[derive(Debug, Parser)]
struct ObjectiveArgs {
    #[arg(long)]
    room: Option<String>,
    text: String,
}

#[derive(Debug, Subcommand)]
enum LedgerCommand {
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    Sign {
        entry_id: String,
    },
}

#[derive(Debug, Subcommand)]
enum AdminCommand {
    /// Remove a room's state for every user.
    ClearRoom { room: String },
}

#[derive(Debug, Parser)]
struct ToolArgs {
    json: String,
}

fn main() {
    init_logging();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("sanctuary error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("SANCTUARY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = apply_overrides(SanctuaryConfig::from_env(), cli.overrides);
    match cli.command {
        Command::Chat => {
            run_chat(&Runtime::open(config)?)?;
            Ok(0)
        }
        Command::Scan(args) => run_scan(&Runtime::open(config)?, &args.path),
        Command::Room(command) => run_room(config, command),
        Command::Objective(args) => {
            let runtime = Runtime::open_in(config, args.room.as_deref())?;
            let outcome = runtime.orchestrator.update_objective(&args.text)?;
            println!(
                "Objective for {} set to: {}",
                outcome.record.room_id,
                outcome.record.current_objective.unwrap_or_default()
            );
            Ok(0)
        }
        Command::Ledger(command) => run_ledger(&Runtime::open(config)?, command),
        Command::Admin(AdminCommand::ClearRoom { room }) => {
            let store = JsonRoomStateStore::new(config.room_state_path());
            match store.admin_clear_room(&room)? {
                ClearOutcome::Cleared { removed } => {
                    println!("Cleared {removed} record(s) for {room}.")
                }
                ClearOutcome::NoOp => println!("Nothing stored for {room}."),
            }
            Ok(0)
        }
        Command::Tool(args) => {
            let runtime = Runtime::open(config)?;
            match runtime.orchestrator.dispatch_tool_call(&args.json)? {
                ToolResult::RoomUi(result) => {
                    if !result.persist.is_saved() {
                        return Ok(2);
                    }
                }
                ToolResult::Ledger(summary) => println!("{summary}"),
            }
            Ok(0)
        }
    }
}

fn apply_overrides(mut config: SanctuaryConfig, overrides: Overrides) -> SanctuaryConfig {
    if let Some(dir) = overrides.data_dir {
        config.data_dir = dir;
    }
    if let Some(user) = overrides.user {
        config.user = UserId::resolve(Some(&user));
    }
    if overrides.provider.is_some() {
        config.provider = overrides.provider;
    }
    if overrides.vision_model.is_some() {
        config.vision_model = overrides.vision_model;
    }
    if overrides.text_model.is_some() {
        config.text_model = overrides.text_model;
    }
    match overrides.timeout {
        Some(seconds) => config.with_timeout_secs(seconds),
        None => config,
    }
}

/// Everything one invocation needs, wired from the config.
struct Runtime {
    config: SanctuaryConfig,
    rooms: Arc<JsonRoomStateStore>,
    orchestrator: Arc<Orchestrator>,
    registry: ModelProviderRegistry,
    selector: ModelSelector,
}

impl Runtime {
    fn open(config: SanctuaryConfig) -> Result<Self> {
        Self::open_in(config, None)
    }

    fn open_in(config: SanctuaryConfig, room: Option<&str>) -> Result<Self> {
        fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("failed to create data dir {}", config.data_dir.display())
        })?;
        let events = EventWriter::new(config.events_path(), uuid::Uuid::new_v4().to_string());
        let sinks: Vec<Arc<dyn NarrativeSink>> = vec![
            Arc::new(TerminalSink),
            Arc::new(EventLogSink::new(events)),
        ];
        let sink = Fanout::new(sinks);
        let rooms = Arc::new(JsonRoomStateStore::new(config.room_state_path()));
        let mut orchestrator = Orchestrator::new(
            config.user.clone(),
            rooms.clone(),
            Arc::new(JsonLedgerStore::new(config.ledger_path())),
            Arc::new(sink),
        )
        .with_persist_backoff(config.persist_backoff);
        if let Some(room) = room {
            orchestrator = orchestrator.with_room(room);
        }
        let registry = ModelProviderRegistry::with_defaults(&config);
        Ok(Self {
            config,
            rooms,
            orchestrator: Arc::new(orchestrator),
            registry,
            selector: ModelSelector::new(None),
        })
    }

    fn route(&self, requested: Option<&str>, capability: Capability) -> Result<ModelRoute> {
        ModelRoute::select(
            &self.registry,
            &self.selector,
            requested,
            capability,
            Some(self.config.effective_provider()),
        )
    }

    fn intake(&self) -> Result<IntakePipeline> {
        Ok(IntakePipeline::new(
            self.orchestrator.clone(),
            self.route(self.config.vision_model.as_deref(), Capability::Vision)?,
            self.route(self.config.text_model.as_deref(), Capability::Text)?,
            &self.config,
        ))
    }

    fn chat(&self) -> Result<ChatSession> {
        Ok(ChatSession::new(
            self.orchestrator.clone(),
            self.route(self.config.text_model.as_deref(), Capability::Text)?,
            Arc::new(MessageLog::new(self.config.messages_path())),
        ))
    }
}

/// Prints projections and the core's lines to stdout.
struct TerminalSink;

impl NarrativeSink for TerminalSink {
    fn on_room_change(&self, from: &str, to: &str) {
        println!("~ {from} -> {to}");
    }

    fn on_projection(&self, room: &str, payload: &A2uiPayload) {
        print_payload(room, payload);
    }

    fn on_state_not_saved(&self, room: &str, _reason: &str) {
        println!("[{room}] STATE NOT SAVED");
    }

    fn on_chat(&self, role: Role, content: &str) {
        match role {
            Role::Assistant => println!("BRIAN: {content}"),
            Role::System => println!("{}", content.lines().next().unwrap_or_default()),
            Role::User => {}
        }
    }
}

fn print_payload(room: &str, payload: &A2uiPayload) {
    println!("[{room}] {}", payload.component);
    for line in render_lines(&resolve(payload)) {
        println!("  {line}");
    }
}

fn run_chat(runtime: &Runtime) -> Result<()> {
    let mut chat = runtime.chat()?;
    let mut intake = runtime.intake()?;
    let orchestrator = &runtime.orchestrator;
    orchestrator.rehydrate()?;

    let stdin = io::stdin();
    let mut line = String::new();
    println!(
        "Sanctuary uplink open in {} as {}. Type /help for commands.",
        orchestrator.current_room(),
        orchestrator.user().as_str()
    );
    chat.open_uplink(telemetry::source_for(&runtime.config).as_ref());

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        match parse_intent(line.trim_end_matches(['\n', '\r'])) {
            Intent::Noop => {}
            Intent::Chat(text) => {
                chat.handle_message(&text);
            }
            Intent::Scan { path } => {
                report_scan(&intake.scan_file(Path::new(&path)));
            }
            Intent::Room { room } => {
                if !is_known_room(&room) {
                    println!("Unknown room '{room}'. Rooms: {}", KNOWN_ROOMS.join(", "));
                    continue;
                }
                if let Err(err) = orchestrator
                    .enter_room(&room)
                    .map(|transition| report_transition(&room, &transition))
                {
                    println!("Room change failed: {err:#}");
                }
            }
            Intent::Show => show_room(runtime, &orchestrator.current_room())?,
            Intent::Ledger { limit } => match orchestrator.fetch_ledger(limit) {
                Ok(summary) => println!("{summary}"),
                Err(err) => println!("Ledger unavailable: {err:#}"),
            },
            Intent::Sign { entry_id } => sign(runtime, &entry_id),
            Intent::Clear => match orchestrator.clear() {
                Ok(ClearOutcome::Cleared { .. }) => {
                    println!("{} cleared.", orchestrator.current_room())
                }
                Ok(ClearOutcome::NoOp) => println!("Nothing stored here."),
                Err(err) => println!("Clear failed: {err:#}"),
            },
            Intent::Objective { text } => match orchestrator.update_objective(&text) {
                Ok(_) => println!("Objective set."),
                Err(err) => println!("Objective not saved: {err:#}"),
            },
            Intent::TextModel { model } => {
                match runtime.route(Some(&model), Capability::Text) {
                    Ok(route) => {
                        println!("Text model set to {}", route.model);
                        intake.set_text_route(route.clone());
                        chat.set_text_route(route);
                    }
                    Err(err) => println!("Text model unchanged: {err:#}"),
                }
            }
            Intent::VisionModel { model } => {
                match runtime.route(Some(&model), Capability::Vision) {
                    Ok(route) => {
                        println!("Vision model set to {}", route.model);
                        intake.set_vision_route(route);
                    }
                    Err(err) => println!("Vision model unchanged: {err:#}"),
                }
            }
            Intent::Help => {
                for line in help_lines() {
                    println!("{line}");
                }
            }
            Intent::MissingArg { usage, .. } => println!("Usage: {usage}"),
            Intent::Unknown { command, .. } => {
                println!("Unknown command: /{command}. Type /help for commands.")
            }
        }
    }
    Ok(())
}

fn run_scan(runtime: &Runtime, path: &Path) -> Result<i32> {
    let outcome = runtime.intake()?.scan_file(path);
    report_scan(&outcome);
    Ok(match outcome {
        ScanOutcome::Unreadable { .. } => 2,
        _ => 0,
    })
}

fn report_scan(outcome: &ScanOutcome) {
    match outcome {
        ScanOutcome::Ledger { entry, .. } => println!("Ledger entry {} logged.", entry.id),
        ScanOutcome::Busy => println!("A scan is already in progress."),
        ScanOutcome::Projected { .. } | ScanOutcome::Unreadable { .. } => {}
    }
}

fn report_transition(room: &str, transition: &Transition) {
    match transition {
        Transition::Rendered(_) => {}
        Transition::Unchanged => println!("[{room}] unchanged"),
        Transition::Cleared => println!("[{room}] wall is empty"),
    }
}

fn run_room(config: SanctuaryConfig, command: RoomCommand) -> Result<i32> {
    match command {
        RoomCommand::Show { room } => {
            let runtime = Runtime::open(config)?;
            let room = room.unwrap_or_else(|| runtime.orchestrator.current_room());
            show_room(&runtime, &room)?;
        }
        RoomCommand::List => {
            let runtime = Runtime::open(config)?;
            let records = runtime
                .rooms
                .list_room_states(runtime.orchestrator.user())?;
            if records.is_empty() {
                println!("No stored rooms.");
            }
            for record in records {
                println!(
                    "{:<14} {:<18} {}",
                    record.room_id,
                    record.active_component.as_deref().unwrap_or("-"),
                    record.current_objective.as_deref().unwrap_or("")
                );
            }
        }
        RoomCommand::Clear { room } => {
            let runtime = Runtime::open_in(config, room.as_deref())?;
            match runtime.orchestrator.clear()? {
                ClearOutcome::Cleared { .. } => println!("Cleared."),
                ClearOutcome::NoOp => println!("Nothing stored."),
            }
        }
    }
    Ok(0)
}

fn show_room(runtime: &Runtime, room: &str) -> Result<()> {
    let record = runtime
        .rooms
        .get_room_state(runtime.orchestrator.user(), room)?;
    let Some(record) = record else {
        println!("[{room}] wall is empty");
        return Ok(());
    };
    if let Some(objective) = &record.current_objective {
        println!("[{room}] OBJECTIVE: {objective}");
    }
    match record.payload() {
        Some(payload) => print_payload(room, &payload),
        None => println!("[{room}] no active display"),
    }
    Ok(())
}

fn run_ledger(runtime: &Runtime, command: LedgerCommand) -> Result<i32> {
    match command {
        LedgerCommand::List { limit } => println!("{}", runtime.orchestrator.fetch_ledger(limit)?),
        LedgerCommand::Sign { entry_id } => {
            let outcome = runtime
                .orchestrator
                .ledger()
                .sign_entry(&entry_id, runtime.orchestrator.user())?;
            print_sign(&outcome);
        }
    }
    Ok(0)
}

fn sign(runtime: &Runtime, entry_id: &str) {
    match runtime
        .orchestrator
        .ledger()
        .sign_entry(entry_id, runtime.orchestrator.user())
    {
        Ok(outcome) => print_sign(&outcome),
        Err(err) => println!("Signature refused: {err}"),
    }
}

fn print_sign(outcome: &SignOutcome) {
    match outcome {
        SignOutcome::Signed(entry) => println!("Entry {} signed.", entry.id),
        SignOutcome::AlreadySigned(entry) => println!("Entry {} was already signed.", entry.id),
    }
}
