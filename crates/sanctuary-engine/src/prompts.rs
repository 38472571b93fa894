use chrono::{DateTime, Local};
use sanctuary_contracts::messages::{ChatMessage, Role};

/// Persona and output contract for every text-model call.
pub const SYSTEM_PROMPT: &str = r#"SYSTEM MANDATE: THE LUMINOUS DEEP

## IDENTITY
You are "Brian", the Sovereign Core, orchestrating the rooms of the Sanctuary.

## LOCALISATION (en-GB)
- British English spelling only: optimise, centre, colour, programme.
- Dates DD/MM/YYYY, 24-hour times.
- The CURRENT DATE supplied in the context is the only truth.

## A2UI OUTPUT FORMAT
When the wall should change, include one JSON object:
{"component": "<Component>", "props": { ... }}

Components:
- BunkerTerminal { header, lines: string[], glitchLevel? }
- ArtifactCard { title, content, type: "Myth" | "Signal" | "Reflection" }
- SystemAlert { message, severity?: "warning" | "critical", showRestoreFeed? }
- ImagePanel { imageUrl, title?, caption? }
- BunkerLedger { amountGBP, allocation, date?, verifiedBy? }
- CortexArtifact { title, content, type?, imageUrl?, caption? }
- ChoiceCard { question, options: string[] }
- ResourceMonitor { data: [{label, value, color}], title?, totalSpend? }
- BunkerSimulation {}

## LEDGER HANDSHAKE
- If the user mentions an allocation or spend with an amount (e.g. £500), emit a
  BunkerLedger payload with { date, amountGBP, allocation, verifiedBy }.
- The number is canon. Never paraphrase or hide it.
"#;

pub fn vision_analysis_prompt(now: DateTime<Local>) -> String {
    format!(
        r#"Analyse this image and return ONLY valid JSON with this exact structure:
{{
  "scan_target": "Short Name (e.g. FESTIVAL BANNER)",
  "telemetry_lines": ["LUMENS: HIGH", "ISOTOPE: UNKNOWN", "ORIGIN: 21ST CENTURY"],
  "alignment_score": 40,
  "verdict": "DIVERGENCE DETECTED. AESTHETIC REJECTION.",
  "room_vibe": "the_deck",
  "document_detected": false,
  "merchant": "Merchant Name or null",
  "total": "£12.34 or null",
  "date": "YYYY-MM-DD or null",
  "category": "Category or null"
}}

CONTEXT:
Today is {date}. If you see a receipt, use this year if unspecified.

Rules:
- Use British English (en-GB).
- telemetry_lines must be short, punchy, military HUD style.
- alignment_score is 0-100.
- room_vibe must be one of: control_room, study, workshop, the_deck.
- Output JSON only. No markdown, no prose.
"#,
        date = now.format("%d/%m/%Y"),
    )
}

/// Second intake call: asks for a terminal-or-card payload for the scan.
pub fn scan_choice_prompt(telemetry: &[String], room: &str) -> String {
    format!(
        r#"Generate a single A2UI payload for the Visual Cortex window.
Use only BunkerTerminal or ArtifactCard.
Return JSON only.
Telemetry:
{telemetry}

Target room: {room}

Return ONLY valid JSON with this exact shape:
{{"component": "BunkerTerminal" | "ArtifactCard", "props": {{ ... }}}}
"#,
        telemetry = telemetry.join("\n"),
    )
}

/// `history` is oldest first and ends before `message`. `uplink` is the
/// session's sensor handshake, if one was made.
pub fn chat_prompt(
    now: DateTime<Local>,
    room: &str,
    uplink: Option<&str>,
    history: &[ChatMessage],
    message: &str,
) -> String {
    let mut prompt = format!(
        "**SYSTEM CONTEXT:**\nDATE: {}\nTIME: {}\nROOM: {room}\n",
        now.format("%d/%m/%Y"),
        now.format("%H:%M"),
    );
    if let Some(uplink) = uplink {
        prompt.push_str(uplink);
        prompt.push('\n');
    }
    if !history.is_empty() {
        prompt.push_str("RECENT TRANSCRIPT:\n");
        for turn in history {
            let speaker = match turn.role {
                Role::User => "USER",
                Role::Assistant => "BRIAN",
                Role::System => "SYSTEM",
            };
            prompt.push_str(&format!("{speaker}: {}\n", turn.content.replace('\n', " ")));
        }
    }
    prompt.push_str(&format!("USER PROMPT: {message}\n"));
    prompt
}
