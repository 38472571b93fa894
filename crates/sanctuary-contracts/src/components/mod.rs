mod projection;
mod registry;

pub use projection::{format_gbp, render_lines, resolve, resolve_value, Projection};
pub use registry::{
    AlertProps, AlertSeverity, ArtifactKind, ArtifactProps, ChoiceProps, ComponentId, CortexProps,
    ImagePanelProps, LedgerProps, ResourceDatum, ResourceMonitorProps, TerminalProps,
    CHECKSUM_ERROR_LINE, RETRY_INTAKE_LINE,
};
