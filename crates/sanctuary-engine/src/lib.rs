//! Runtime for the Sanctuary wall: model routing, the room orchestrator,
//! visual intake, chat and island telemetry.

pub mod chat;
pub mod config;
pub mod downscale;
pub mod intake;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod sink;
pub mod telemetry;

pub use chat::{ChatSession, ChatTurn, TurnKind};
pub use config::SanctuaryConfig;
pub use intake::{IntakePipeline, ScanOutcome};
pub use orchestrator::{Orchestrator, PersistStatus, RoomUiResult, ToolResult, UpdateRoomUi};
pub use providers::{ModelProvider, ModelProviderRegistry, ModelRoute};
pub use sink::{EventLogSink, Fanout, NarrativeSink, RecordingSink, SilentSink};
pub use telemetry::{DryrunTelemetry, IslandTelemetry, OpenMeteoTelemetry, TelemetrySource};
