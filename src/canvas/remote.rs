//! Remote canvas session — WebSocket client for `canvas-server`.
//!
//! [`RemoteCanvasSession`] implements [`CanvasBackend`] by forwarding mutations
//! to a remote canvas-server over WebSocket and maintaining a local shadow copy
//! of the scene for reads.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use canvas_core::{Element, ElementDocument, ElementId, Scene};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::backend::{CanvasBackend, ConnectionStatus};
use super::session::MessageView;
use super::types::CanvasMessage;

// ---------------------------------------------------------------------------
// Protocol types (mirror the server's serde-tagged enums)
// ---------------------------------------------------------------------------

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[allow(dead_code)] // Protocol variants defined for completeness.
enum ClientMessage {
    Subscribe {
        session_id: String,
    },
    AddElement {
        element: ElementDocument,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    UpdateElement {
        id: String,
        changes: serde_json::Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    RemoveElement {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    Ping,
    GetScene,
}

/// Messages received from the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[allow(dead_code)] // Fields populated by deserialization only.
enum ServerMessage {
    Welcome {
        #[serde(default)]
        session_id: String,
    },
    SceneUpdate {
        scene: SceneDocument,
    },
    ElementAdded {
        element: ElementDocument,
    },
    ElementUpdated {
        element: ElementDocument,
        #[serde(default)]
        timestamp: u64,
    },
    ElementRemoved {
        id: String,
    },
    Ack {
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        success: bool,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    SyncResult {
        #[serde(default)]
        synced_count: usize,
        #[serde(default)]
        conflict_count: usize,
        #[serde(default)]
        timestamp: u64,
        #[serde(default)]
        failed_operations: Vec<serde_json::Value>,
    },
    Pong {},
}

/// Viewport metadata from the server scene.
#[derive(Debug, Clone, Copy, Deserialize)]
#[allow(dead_code)] // Fields populated by deserialization only.
struct ViewportInfo {
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
    #[serde(default = "default_zoom")]
    zoom: f32,
    #[serde(default)]
    pan_x: f32,
    #[serde(default)]
    pan_y: f32,
}

fn default_zoom() -> f32 {
    1.0
}

impl Default for ViewportInfo {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

/// Scene document matching canvas-server's `SceneDocument` schema.
#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)] // Fields populated by deserialization only.
struct SceneDocument {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    viewport: ViewportInfo,
    #[serde(default)]
    elements: Vec<ElementDocument>,
    #[serde(default)]
    timestamp: u64,
}

// ---------------------------------------------------------------------------
// Shared state between the session and the background WS task
// ---------------------------------------------------------------------------

/// Shared mutable state protected by a mutex.
struct SharedState {
    status: ConnectionStatus,
    /// Local shadow scene (rebuilt from server updates).
    scene: Scene,
    /// Messages pushed via the bridge.
    messages: Vec<MessageEntry>,
    next_y: f32,
    generation: u64,
}

/// Mirrors `CanvasSession::MessageEntry`.
struct MessageEntry {
    element_id: ElementId,
    role: super::types::MessageRole,
    timestamp_ms: u64,
    text: String,
    tool_name: Option<String>,
    tool_input: Option<String>,
    tool_result_text: Option<String>,
}

/// Vertical height allocated per message element (pixels).
const MESSAGE_HEIGHT: f32 = 40.0;
/// Vertical gap between consecutive messages (pixels).
const MESSAGE_PADDING: f32 = 8.0;
/// Horizontal margin on each side of messages (pixels).
const MESSAGE_MARGIN_X: f32 = 16.0;

// ---------------------------------------------------------------------------
// RemoteCanvasSession
// ---------------------------------------------------------------------------

/// A canvas backend that delegates to a remote canvas-server via WebSocket.
///
/// Mutations are sent as JSON messages over the WebSocket connection.
/// The local shadow scene is updated optimistically and corrected when the
/// server sends `SceneUpdate` messages.
pub struct RemoteCanvasSession {
    session_id: String,
    shared: Arc<Mutex<SharedState>>,
    /// Channel to send outbound WS messages to the background task.
    tx: mpsc::UnboundedSender<String>,
    /// Local HTML cache (owned by self so `to_html_cached` can return `&str`).
    cached_html: String,
    /// Generation at which the local HTML cache was last built.
    cached_generation: u64,
}

impl RemoteCanvasSession {
    /// Connect to a remote canvas-server.
    ///
    /// Spawns a background tokio task that manages the WebSocket connection
    /// with automatic reconnection.
    ///
    /// # Arguments
    /// * `server_url` — WebSocket URL, e.g. `ws://localhost:9473/ws/sync`
    /// * `session_id` — Canvas session to subscribe to.
    /// * `width` / `height` — Initial local viewport dimensions.
    pub fn connect(
        server_url: impl Into<String>,
        session_id: impl Into<String>,
        width: f32,
        height: f32,
    ) -> Self {
        let server_url = server_url.into();
        let session_id = session_id.into();

        let shared = Arc::new(Mutex::new(SharedState {
            status: ConnectionStatus::Connecting,
            scene: Scene::new(width, height),
            messages: Vec::new(),
            next_y: MESSAGE_PADDING,
            generation: 0,
        }));

        let (tx, rx) = mpsc::unbounded_channel();

        // Spawn background connection manager.
        let ws_shared = Arc::clone(&shared);
        let ws_session_id = session_id.clone();
        let ws_url = server_url;
        tokio::spawn(async move {
            connection_loop(ws_url, ws_session_id, ws_shared, rx).await;
        });

        Self {
            session_id,
            shared,
            tx,
            cached_html: String::new(),
            cached_generation: 0,
        }
    }

    /// Send a serialized JSON message to the background WebSocket task.
    fn send_msg(&self, msg: &ClientMessage) {
        if let Ok(json) = serde_json::to_string(msg) {
            // If the receiver is dropped the connection is dead — ignore error.
            let _ = self.tx.send(json);
        }
    }
}

impl CanvasBackend for RemoteCanvasSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn push_message(&mut self, message: &CanvasMessage) -> ElementId {
        let mut state = match self.shared.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };

        let width = state.scene.viewport_width - (MESSAGE_MARGIN_X * 2.0);
        let transform = canvas_core::Transform {
            x: MESSAGE_MARGIN_X,
            y: state.next_y,
            width,
            height: MESSAGE_HEIGHT,
            rotation: 0.0,
            z_index: state.messages.len() as i32,
        };

        let element = message.to_element_at(transform);

        // Add locally.
        let doc = ElementDocument::from(&element);
        let id = state.scene.add_element(element);

        state.messages.push(MessageEntry {
            element_id: id,
            role: message.role,
            timestamp_ms: message.timestamp_ms,
            text: message.text.clone(),
            tool_name: message.tool_name.clone(),
            tool_input: message.tool_input.clone(),
            tool_result_text: message.tool_result_text.clone(),
        });

        state.next_y += MESSAGE_HEIGHT + MESSAGE_PADDING;
        state.generation += 1;

        drop(state);

        // Send to server.
        self.send_msg(&ClientMessage::AddElement {
            element: doc,
            message_id: None,
        });

        id
    }

    fn add_element(&mut self, element: Element) -> ElementId {
        let mut state = match self.shared.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };

        let doc = ElementDocument::from(&element);
        let id = state.scene.add_element(element);
        state.generation += 1;
        drop(state);

        self.send_msg(&ClientMessage::AddElement {
            element: doc,
            message_id: None,
        });

        id
    }

    fn remove_element(&mut self, id: &ElementId) -> Option<Element> {
        let mut state = match self.shared.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };

        let removed = state.scene.remove_element(id).ok();
        state.generation += 1;
        drop(state);

        self.send_msg(&ClientMessage::RemoveElement {
            id: id.to_string(),
            message_id: None,
        });

        removed
    }

    fn clear(&mut self) {
        let mut state = match self.shared.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };

        state.scene.clear();
        state.messages.clear();
        state.next_y = MESSAGE_PADDING;
        state.generation += 1;
    }

    fn message_count(&self) -> usize {
        match self.shared.lock() {
            Ok(s) => s.messages.len(),
            Err(p) => p.into_inner().messages.len(),
        }
    }

    fn element_count(&self) -> usize {
        match self.shared.lock() {
            Ok(s) => s.scene.element_count(),
            Err(p) => p.into_inner().scene.element_count(),
        }
    }

    fn message_views(&self) -> Vec<MessageView> {
        use super::render::render_element_html;

        let state = match self.shared.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };

        state
            .messages
            .iter()
            .map(|entry| {
                let html = state
                    .scene
                    .get_element(entry.element_id)
                    .map(|el| render_element_html(el, entry.role.css_class()))
                    .unwrap_or_default();

                MessageView {
                    role: entry.role,
                    timestamp_ms: entry.timestamp_ms,
                    html,
                    text: entry.text.clone(),
                    tool_name: entry.tool_name.clone(),
                    tool_input: entry.tool_input.clone(),
                    tool_result_text: entry.tool_result_text.clone(),
                }
            })
            .collect()
    }

    fn tool_elements_html(&self) -> String {
        use super::render::render_element_html;
        use std::collections::HashSet;

        let state = match self.shared.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };

        let message_ids: HashSet<ElementId> = state.messages.iter().map(|e| e.element_id).collect();

        let tool_elements: Vec<_> = state
            .scene
            .elements()
            .filter(|el| !message_ids.contains(&el.id))
            .collect();

        if tool_elements.is_empty() {
            return String::new();
        }

        let mut html = String::from("<div class=\"canvas-tools\">\n");
        for el in tool_elements {
            html.push_str("  ");
            html.push_str(&render_element_html(el, "tool-content"));
            html.push('\n');
        }
        html.push_str("</div>\n");
        html
    }

    fn to_html(&self) -> String {
        use super::render::render_element_html;
        use std::collections::HashSet;

        let state = match self.shared.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };

        let mut html = String::from("<div class=\"canvas-messages\">\n");
        let mut message_ids: HashSet<ElementId> = HashSet::new();

        for entry in &state.messages {
            message_ids.insert(entry.element_id);
            if let Some(el) = state.scene.get_element(entry.element_id) {
                let role_class = entry.role.css_class();
                html.push_str("  ");
                html.push_str(&render_element_html(el, role_class));
                html.push('\n');
            }
        }
        html.push_str("</div>\n");

        let tool_elements: Vec<_> = state
            .scene
            .elements()
            .filter(|el| !message_ids.contains(&el.id))
            .collect();

        if !tool_elements.is_empty() {
            html.push_str("<div class=\"canvas-tools\">\n");
            for el in tool_elements {
                html.push_str("  ");
                html.push_str(&render_element_html(el, "tool-content"));
                html.push('\n');
            }
            html.push_str("</div>\n");
        }

        html
    }

    fn to_html_cached(&mut self) -> &str {
        // Rebuild if the shared state has changed since last cache.
        let state = match self.shared.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };

        let generation = state.generation;
        if generation != self.cached_generation {
            self.cached_html = build_html(&state);
            self.cached_generation = generation;
        }

        drop(state);
        &self.cached_html
    }

    fn resize_viewport(&mut self, width: f32, height: f32) {
        let mut state = match self.shared.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };

        state.scene.set_viewport(width, height);
        let msg_width = width - (MESSAGE_MARGIN_X * 2.0);

        // Collect element IDs to avoid borrowing messages and scene simultaneously.
        let ids: Vec<ElementId> = state.messages.iter().map(|e| e.element_id).collect();
        let mut y = MESSAGE_PADDING;
        for id in ids {
            if let Some(el) = state.scene.get_element_mut(id) {
                el.transform.x = MESSAGE_MARGIN_X;
                el.transform.y = y;
                el.transform.width = msg_width;
            }
            y += MESSAGE_HEIGHT + MESSAGE_PADDING;
        }
        state.next_y = y;
        state.generation += 1;
    }

    fn connection_status(&self) -> ConnectionStatus {
        match self.shared.lock() {
            Ok(s) => s.status.clone(),
            Err(p) => p.into_inner().status.clone(),
        }
    }

    fn scene_snapshot(&self) -> canvas_core::Scene {
        match self.shared.lock() {
            Ok(s) => s.scene.clone(),
            Err(p) => p.into_inner().scene.clone(),
        }
    }
}

/// Build full HTML from shared state (helper for cache).
fn build_html(state: &SharedState) -> String {
    use super::render::render_element_html;
    use std::collections::HashSet;

    let mut html = String::from("<div class=\"canvas-messages\">\n");
    let mut message_ids: HashSet<ElementId> = HashSet::new();

    for entry in &state.messages {
        message_ids.insert(entry.element_id);
        if let Some(el) = state.scene.get_element(entry.element_id) {
            let role_class = entry.role.css_class();
            html.push_str("  ");
            html.push_str(&render_element_html(el, role_class));
            html.push('\n');
        }
    }
    html.push_str("</div>\n");

    let tool_elements: Vec<_> = state
        .scene
        .elements()
        .filter(|el| !message_ids.contains(&el.id))
        .collect();

    if !tool_elements.is_empty() {
        html.push_str("<div class=\"canvas-tools\">\n");
        for el in tool_elements {
            html.push_str("  ");
            html.push_str(&render_element_html(el, "tool-content"));
            html.push('\n');
        }
        html.push_str("</div>\n");
    }

    html
}

// ---------------------------------------------------------------------------
// Background WebSocket connection loop
// ---------------------------------------------------------------------------

/// Maximum reconnect delay.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
/// Base reconnect delay.
const BASE_RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Ping interval.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Run the WebSocket connection loop with automatic reconnection.
async fn connection_loop(
    url: String,
    session_id: String,
    shared: Arc<Mutex<SharedState>>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    let mut attempt: u32 = 0;

    loop {
        // Update status.
        if let Ok(mut s) = shared.lock() {
            s.status = if attempt == 0 {
                ConnectionStatus::Connecting
            } else {
                ConnectionStatus::Reconnecting { attempt }
            };
        }

        match try_connect(&url, &session_id, &shared, &mut outbound_rx).await {
            Ok(()) => {
                // Clean disconnect.
                if let Ok(mut s) = shared.lock() {
                    s.status = ConnectionStatus::Disconnected;
                }
                break;
            }
            Err(e) => {
                tracing::warn!("WebSocket connection failed (attempt {attempt}): {e}");
                attempt += 1;

                let delay = BASE_RECONNECT_DELAY
                    .saturating_mul(2u32.saturating_pow(attempt.min(5)))
                    .min(MAX_RECONNECT_DELAY);

                if let Ok(mut s) = shared.lock() {
                    s.status = ConnectionStatus::Reconnecting { attempt };
                }

                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Attempt a single WebSocket connection. Returns `Ok(())` on clean close,
/// `Err` on connection failure or unexpected disconnect.
async fn try_connect(
    url: &str,
    session_id: &str,
    shared: &Arc<Mutex<SharedState>>,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
) -> Result<(), String> {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::{connect_async, tungstenite::Message};

    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| format!("connect: {e}"))?;

    let (mut write, mut read) = ws_stream.split();

    // Subscribe to session.
    let subscribe = ClientMessage::Subscribe {
        session_id: session_id.to_owned(),
    };
    if let Ok(json) = serde_json::to_string(&subscribe) {
        write
            .send(Message::Text(json))
            .await
            .map_err(|e| format!("send subscribe: {e}"))?;
    }

    // Mark connected.
    if let Ok(mut s) = shared.lock() {
        s.status = ConnectionStatus::Connected;
    }

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // Skip the first immediate tick.
    ping_interval.tick().await;

    loop {
        tokio::select! {
            // Inbound from server.
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_server_message(&text, shared);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        // Server closed connection.
                        return Err("connection closed by server".into());
                    }
                    Some(Err(e)) => {
                        return Err(format!("read error: {e}"));
                    }
                    _ => {} // Binary, Ping/Pong frames handled by tungstenite.
                }
            }
            // Outbound from fae.
            Some(json) = outbound_rx.recv() => {
                if let Err(e) = write.send(Message::Text(json)).await {
                    return Err(format!("send error: {e}"));
                }
            }
            // Periodic ping.
            _ = ping_interval.tick() => {
                if let Ok(json) = serde_json::to_string(&ClientMessage::Ping)
                    && let Err(e) = write.send(Message::Text(json)).await
                {
                    return Err(format!("ping error: {e}"));
                }
            }
        }
    }
}

/// Process a server message and update shared state.
fn handle_server_message(text: &str, shared: &Arc<Mutex<SharedState>>) {
    let msg: ServerMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!("Ignoring unparseable server message: {e}");
            return;
        }
    };

    match msg {
        ServerMessage::Welcome { session_id } => {
            tracing::info!("Connected to canvas session: {session_id}");
        }
        ServerMessage::SceneUpdate { scene: doc } => {
            if let Ok(mut s) = shared.lock() {
                // Rebuild scene from server document.
                s.scene.clear();
                // Apply viewport if the server provided dimensions.
                if doc.viewport.width > 0.0 && doc.viewport.height > 0.0 {
                    s.scene
                        .set_viewport(doc.viewport.width, doc.viewport.height);
                }
                for elem_doc in &doc.elements {
                    let element = Element::new(elem_doc.kind.clone())
                        .with_transform(elem_doc.transform)
                        .with_interactive(elem_doc.interactive);
                    s.scene.add_element(element);
                }
                s.generation += 1;
            }
        }
        ServerMessage::ElementAdded { element: doc, .. } => {
            if let Ok(mut s) = shared.lock() {
                let element = Element::new(doc.kind.clone())
                    .with_transform(doc.transform)
                    .with_interactive(doc.interactive);
                s.scene.add_element(element);
                s.generation += 1;
            }
        }
        ServerMessage::ElementUpdated { element: doc, .. } => {
            if let Ok(mut s) = shared.lock() {
                // Replace element in scene — remove old, add updated.
                if let Ok(eid) = ElementId::parse(&doc.id) {
                    let _ = s.scene.remove_element(&eid);
                }
                let element = Element::new(doc.kind.clone())
                    .with_transform(doc.transform)
                    .with_interactive(doc.interactive);
                s.scene.add_element(element);
                s.generation += 1;
            }
        }
        ServerMessage::ElementRemoved { id, .. } => {
            if let Ok(mut s) = shared.lock()
                && let Ok(eid) = ElementId::parse(&id)
            {
                let _ = s.scene.remove_element(&eid);
                s.generation += 1;
            }
        }
        ServerMessage::Ack { .. }
        | ServerMessage::Error { .. }
        | ServerMessage::SyncResult { .. }
        | ServerMessage::Pong { .. } => {
            // Logged at trace level if needed.
        }
    }
}
