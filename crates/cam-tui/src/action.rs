//! Action enum — everything a key press can turn into.

use crate::coordinator::Intent;

/// Components produce Actions; the App dispatches them.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // ── Device ───────────────────────────────────────────────────────────────
    Device(Intent),

    // ── Endpoint editing ─────────────────────────────────────────────────────
    EditEndpoint,
    CloseEndpointEditor,

    // ── Bitrate selector ─────────────────────────────────────────────────────
    OpenBitratePicker,
    CloseBitratePicker,

    // ── UI toggles ───────────────────────────────────────────────────────────
    ToggleLogs,
    ToggleHelp,
    CopyToClipboard(String),

    // ── System ───────────────────────────────────────────────────────────────
    Quit,
    Noop,
}
