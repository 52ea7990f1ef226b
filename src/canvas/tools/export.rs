//! `canvas_export` tool — export a canvas session to an image/PDF format.

use std::sync::{Arc, Mutex};

use canvas_mcp::tools::{ExportFormat, ExportParams};
use saorsa_agent::Tool;
use saorsa_agent::error::{Result as ToolResult, SaorsaAgentError};

use crate::canvas::registry::CanvasSessionRegistry;

/// Tool that exports a canvas session to an image or document format.
///
/// Currently returns a placeholder response with the format metadata.
/// Actual rendering will be implemented in Phase 2.2 (Content Renderers).
pub struct CanvasExportTool {
    registry: Arc<Mutex<CanvasSessionRegistry>>,
}

impl CanvasExportTool {
    /// Create a new export tool backed by the given session registry.
    pub fn new(registry: Arc<Mutex<CanvasSessionRegistry>>) -> Self {
        Self { registry }
    }
}

#[async_trait::async_trait]
impl Tool for CanvasExportTool {
    fn name(&self) -> &str {
        "canvas_export"
    }

    fn description(&self) -> &str {
        "Export a canvas session to an image or document format (PNG, JPEG, SVG, PDF, WebP). \
         Returns metadata about the export."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Canvas session ID to export"
                },
                "format": {
                    "type": "string",
                    "enum": ["png", "jpeg", "svg", "pdf", "webp"],
                    "description": "Export format"
                },
                "quality": {
                    "type": "integer",
                    "description": "Quality 0-100 for lossy formats (default: 90)",
                    "minimum": 0,
                    "maximum": 100
                }
            },
            "required": ["session_id", "format"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult<String> {
        let params: ExportParams = serde_json::from_value(input)
            .map_err(|e| SaorsaAgentError::Tool(format!("invalid canvas_export params: {e}")))?;

        // Verify session exists and get element count.
        let registry = self
            .registry
            .lock()
            .map_err(|_| SaorsaAgentError::Tool("session registry lock poisoned".to_owned()))?;

        let session_arc = registry.get(&params.session_id).ok_or_else(|| {
            SaorsaAgentError::Tool(format!("canvas session '{}' not found", params.session_id))
        })?;

        let session = session_arc
            .lock()
            .map_err(|_| SaorsaAgentError::Tool("session lock poisoned".to_owned()))?;

        let element_count = session.scene().element_count();

        let mime_type = format_mime_type(params.format);

        let response = serde_json::json!({
            "success": true,
            "session_id": params.session_id,
            "format": mime_type,
            "quality": params.quality,
            "element_count": element_count,
            "note": "Export rendering not yet implemented — metadata only",
        });

        serde_json::to_string(&response)
            .map_err(|e| SaorsaAgentError::Tool(format!("failed to serialize response: {e}")))
    }
}

/// Map export format to MIME type string.
fn format_mime_type(format: ExportFormat) -> &'static str {
    match format {
        ExportFormat::Png => "image/png",
        ExportFormat::Jpeg => "image/jpeg",
        ExportFormat::Svg => "image/svg+xml",
        ExportFormat::Pdf => "application/pdf",
        ExportFormat::WebP => "image/webp",
    }
}
