//! Upstream event interpretation.
//!
//! [`drive`] walks decoded frames in arrival order and hands every
//! [`UpstreamEvent`] to an [`EventSink`]. The parse path collects into a
//! [`ProcessingContext`]; the Anthropic stream builder re-emits as it goes.

pub mod context;
pub mod events;
pub mod oneshot;

pub use context::ProcessingContext;
pub use events::{decode_frame, LegacyInput, UpstreamEvent};
pub use oneshot::{is_one_shot_body, parse_response};

use crate::accumulator::ToolCallSet;
use crate::stream::StreamFrame;

/// Consumer of interpreted upstream events.
pub trait EventSink {
    fn on_event(&mut self, event: UpstreamEvent<'_>);
}

/// Feed every event of `frames` to `sink`, in order.
pub fn drive<S: EventSink + ?Sized>(frames: &[StreamFrame], sink: &mut S) {
    for frame in frames {
        for event in decode_frame(frame) {
            sink.on_event(event);
        }
    }
}

/// The tool call an event touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolTouch {
    pub id: String,
    /// The event closed the call and its arguments are final.
    pub stopped: bool,
}

/// Apply a tool event to `tools`. Non-tool events and events for unknown
/// block indices touch nothing.
pub fn apply_tool_event(tools: &mut ToolCallSet, event: &UpstreamEvent<'_>) -> Option<ToolTouch> {
    match event {
        UpstreamEvent::ToolStart {
            id,
            name,
            index,
            arguments,
        } => {
            let id = tools.ensure(id, name)?;
            if let Some(arguments) = arguments {
                tools.prime(&id, arguments);
            }
            if let Some(index) = index {
                tools.bind_index(*index, &id);
            }
            Some(ToolTouch { id, stopped: false })
        }
        UpstreamEvent::ToolFragment { index, fragment } => {
            let Some(id) = tools.id_for_index(*index).map(str::to_string) else {
                tracing::debug!(index, "dropping fragment for unbound block index");
                return None;
            };
            tools.append_fragment(&id, fragment);
            Some(ToolTouch { id, stopped: false })
        }
        UpstreamEvent::ToolStop { index } => {
            let id = tools.id_for_index(*index)?.to_string();
            tools.finalize(&id);
            Some(ToolTouch { id, stopped: true })
        }
        UpstreamEvent::LegacyTool {
            id,
            name,
            input,
            stop,
        } => {
            let id = tools.ensure(id, name)?;
            match input {
                LegacyInput::None => {}
                LegacyInput::Object(raw) => tools.merge_object(&id, raw),
                LegacyInput::Fragment(fragment) => tools.append_fragment(&id, fragment),
            }
            if *stop {
                tools.finalize(&id);
            }
            Some(ToolTouch { id, stopped: *stop })
        }
        UpstreamEvent::Text(_) | UpstreamEvent::StopReason(_) | UpstreamEvent::Followup => None,
    }
}
