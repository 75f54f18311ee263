//! Method names understood by client and server.

use capstan_core::CapabilityKind;

/// Handshake request.
pub const INITIALIZE: &str = "initialize";
/// Sent by the client once the handshake completed.
pub const INITIALIZED: &str = "notifications/initialized";
/// Liveness probe, answered with `{}`.
pub const PING: &str = "ping";
/// Request cancellation notice.
pub const CANCELLED: &str = "notifications/cancelled";

/// List tools.
pub const TOOLS_LIST: &str = "tools/list";
/// Invoke a tool.
pub const TOOLS_CALL: &str = "tools/call";
/// List prompts.
pub const PROMPTS_LIST: &str = "prompts/list";
/// Render a prompt.
pub const PROMPTS_GET: &str = "prompts/get";
/// List static resources.
pub const RESOURCES_LIST: &str = "resources/list";
/// List templated resources.
pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
/// Read a resource.
pub const RESOURCES_READ: &str = "resources/read";

/// Tool list changed.
pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
/// Prompt list changed.
pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
/// Resource list changed.
pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";

/// Notification method announcing a change to the given catalog.
#[must_use]
pub const fn list_changed(kind: CapabilityKind) -> &'static str {
    match kind {
        CapabilityKind::Tools => TOOLS_LIST_CHANGED,
        CapabilityKind::Prompts => PROMPTS_LIST_CHANGED,
        CapabilityKind::Resources => RESOURCES_LIST_CHANGED,
    }
}

/// Catalog a list-changed notification refers to, if `method` is one.
#[must_use]
pub fn changed_kind(method: &str) -> Option<CapabilityKind> {
    match method {
        TOOLS_LIST_CHANGED => Some(CapabilityKind::Tools),
        PROMPTS_LIST_CHANGED => Some(CapabilityKind::Prompts),
        RESOURCES_LIST_CHANGED => Some(CapabilityKind::Resources),
        _ => None,
    }
}
