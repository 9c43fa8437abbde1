//! Voice Input Bridge
//!
//! Adapts an external speech-recognition capability into draft updates.
//!
//! ```text
//!          start (capability present)
//!   Idle ─────────────────────────────▶ Recording
//!    ▲                                     │  Interim ─▶ draft.preview
//!    │       Final ─▶ draft.text           │
//!    └──────── Error / stop ◀──────────────┘
//! ```
//!
//! While recording, the preview wins over manually typed text in
//! [`Draft::display`], and the next final transcript overwrites the draft
//! text. The capability reports through a [`VoiceSink`], which feeds the
//! controller inbox; the bridge itself only runs inside the controller.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::VoiceError;
use crate::events::ControllerHandle;

/// Event produced by a speech capability
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceEvent {
    /// Partial transcript
    Interim(String),
    /// Final transcript
    Final(String),
    /// Capability error code
    Error(String),
}

/// Where a capability delivers its events
#[derive(Clone, Debug)]
pub struct VoiceSink {
    handle: ControllerHandle,
}

impl VoiceSink {
    /// Wrap a controller handle
    #[must_use]
    pub fn new(handle: ControllerHandle) -> Self {
        Self { handle }
    }

    /// Deliver an event; `false` when the controller is gone
    pub fn emit(&self, event: VoiceEvent) -> bool {
        self.handle.voice(event)
    }
}

/// External speech-recognition capability
pub trait VoiceCapability: Send + Sync {
    /// Begin capturing; events go to `sink`
    fn start(&self, sink: VoiceSink) -> Result<(), VoiceError>;

    /// Stop capturing
    fn stop(&self);
}

/// Composer text plus the interim voice preview
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    /// Committed draft text
    pub text: String,
    /// Interim transcript, present only while recording
    pub preview: Option<String>,
}

impl Draft {
    /// Text a surface should show
    #[must_use]
    pub fn display(&self) -> &str {
        self.preview.as_deref().unwrap_or(&self.text)
    }

    /// Whether the committed text is empty after trimming
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Clear text and preview
    pub fn clear(&mut self) {
        self.text.clear();
        self.preview = None;
    }
}

/// Bridge state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceState {
    /// Not capturing
    Idle,
    /// Capturing
    Recording,
}

/// Result of feeding an event to the bridge
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoiceOutcome {
    /// Event arrived while idle
    Ignored,
    /// Preview changed
    PreviewUpdated,
    /// Draft text replaced; bridge is idle again
    Finalized,
    /// Capability failed; bridge is idle again
    Failed(VoiceError),
}

/// Voice-to-draft state machine
pub struct VoiceBridge {
    capability: Option<Arc<dyn VoiceCapability>>,
    state: VoiceState,
}

impl std::fmt::Debug for VoiceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceBridge")
            .field("supported", &self.capability.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl VoiceBridge {
    /// Create a bridge; `None` means speech is unsupported
    #[must_use]
    pub fn new(capability: Option<Arc<dyn VoiceCapability>>) -> Self {
        Self {
            capability,
            state: VoiceState::Idle,
        }
    }

    /// Whether capture is active
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.state == VoiceState::Recording
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// Start capture
    ///
    /// `Ok(false)` when already recording.
    pub fn start(&mut self, sink: VoiceSink) -> Result<bool, VoiceError> {
        if self.is_recording() {
            return Ok(false);
        }
        let capability = self.capability.as_ref().ok_or(VoiceError::Unsupported)?;
        capability.start(sink)?;
        self.state = VoiceState::Recording;
        tracing::debug!("Voice capture started");
        Ok(true)
    }

    /// Stop capture without committing the preview
    pub fn stop(&mut self, draft: &mut Draft) -> bool {
        if !self.is_recording() {
            return false;
        }
        if let Some(capability) = &self.capability {
            capability.stop();
        }
        self.state = VoiceState::Idle;
        draft.preview = None;
        tracing::debug!("Voice capture stopped");
        true
    }

    /// Apply a capability event to `draft`
    pub fn handle(&mut self, event: VoiceEvent, draft: &mut Draft) -> VoiceOutcome {
        if !self.is_recording() {
            tracing::debug!(?event, "Voice event while idle; ignored");
            return VoiceOutcome::Ignored;
        }
        match event {
            VoiceEvent::Interim(text) => {
                draft.preview = Some(text);
                VoiceOutcome::PreviewUpdated
            }
            VoiceEvent::Final(text) => {
                draft.text = text;
                self.stop(draft);
                VoiceOutcome::Finalized
            }
            VoiceEvent::Error(code) => {
                self.stop(draft);
                tracing::warn!(code = %code, "Voice capability error");
                VoiceOutcome::Failed(VoiceError::Recognition(code))
            }
        }
    }
}

// ============================================================================
// Simulated capability
// ============================================================================

/// Capability driven by explicit calls, for tests and the console
#[derive(Debug, Default)]
pub struct SimulatedVoice {
    sink: Mutex<Option<VoiceSink>>,
    fail_start: bool,
}

impl SimulatedVoice {
    /// Create a capability that starts successfully
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a capability whose `start` fails
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sink: Mutex::new(None),
            fail_start: true,
        }
    }

    /// Whether `start` was called and `stop` was not
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.sink.lock().is_some()
    }

    /// Emit an interim transcript
    pub fn interim(&self, text: impl Into<String>) -> bool {
        self.emit(VoiceEvent::Interim(text.into()))
    }

    /// Emit a final transcript
    pub fn finalize(&self, text: impl Into<String>) -> bool {
        self.emit(VoiceEvent::Final(text.into()))
    }

    /// Emit an error code
    pub fn fail(&self, code: impl Into<String>) -> bool {
        self.emit(VoiceEvent::Error(code.into()))
    }

    fn emit(&self, event: VoiceEvent) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => sink.emit(event),
            None => false,
        }
    }
}

impl VoiceCapability for SimulatedVoice {
    fn start(&self, sink: VoiceSink) -> Result<(), VoiceError> {
        if self.fail_start {
            return Err(VoiceError::Recognition("audio-capture".into()));
        }
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn stop(&self) {
        self.sink.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ControllerInput;
    use tokio::sync::mpsc;

    fn sink() -> (VoiceSink, mpsc::UnboundedReceiver<ControllerInput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (VoiceSink::new(ControllerHandle::new(tx)), rx)
    }

    #[test]
    fn test_start_without_capability_is_unsupported() {
        let mut bridge = VoiceBridge::new(None);
        let (sink, _rx) = sink();
        assert_eq!(bridge.start(sink), Err(VoiceError::Unsupported));
        assert!(!bridge.is_recording());
    }

    #[test]
    fn test_start_twice_is_noop() {
        let mut bridge = VoiceBridge::new(Some(Arc::new(SimulatedVoice::new())));
        let (sink, _rx) = sink();
        assert_eq!(bridge.start(sink.clone()), Ok(true));
        assert_eq!(bridge.start(sink), Ok(false));
        assert_eq!(bridge.state(), VoiceState::Recording);
    }

    #[test]
    fn test_final_overwrites_manual_edit() {
        let mut bridge = VoiceBridge::new(Some(Arc::new(SimulatedVoice::new())));
        let mut draft = Draft::default();
        let (sink, _rx) = sink();
        bridge.start(sink).unwrap();

        assert_eq!(
            bridge.handle(VoiceEvent::Interim("go to the".into()), &mut draft),
            VoiceOutcome::PreviewUpdated
        );
        draft.text = "ignore me".into();
        assert_eq!(draft.display(), "go to the");

        assert_eq!(
            bridge.handle(VoiceEvent::Final("go to the store".into()), &mut draft),
            VoiceOutcome::Finalized
        );
        assert_eq!(draft.text, "go to the store");
        assert_eq!(draft.display(), "go to the store");
        assert!(!bridge.is_recording());
    }

    #[test]
    fn test_stop_discards_preview() {
        let capability = Arc::new(SimulatedVoice::new());
        let mut bridge = VoiceBridge::new(Some(capability.clone()));
        let mut draft = Draft {
            text: "typed".into(),
            preview: None,
        };
        let (sink, _rx) = sink();
        bridge.start(sink).unwrap();
        assert!(capability.is_capturing());

        bridge.handle(VoiceEvent::Interim("spoken".into()), &mut draft);
        assert!(bridge.stop(&mut draft));
        assert_eq!(draft.display(), "typed");
        assert!(!capability.is_capturing());
        assert!(!bridge.stop(&mut draft));
    }

    #[test]
    fn test_error_returns_to_idle_and_idle_events_ignored() {
        let mut bridge = VoiceBridge::new(Some(Arc::new(SimulatedVoice::new())));
        let mut draft = Draft::default();
        let (sink, _rx) = sink();
        bridge.start(sink).unwrap();

        assert_eq!(
            bridge.handle(VoiceEvent::Error("no-speech".into()), &mut draft),
            VoiceOutcome::Failed(VoiceError::Recognition("no-speech".into()))
        );
        assert!(!bridge.is_recording());
        assert_eq!(
            bridge.handle(VoiceEvent::Final("late".into()), &mut draft),
            VoiceOutcome::Ignored
        );
        assert_eq!(draft.text, "");
    }

    #[test]
    fn test_failing_capability_stays_idle() {
        let mut bridge = VoiceBridge::new(Some(Arc::new(SimulatedVoice::failing())));
        let (sink, _rx) = sink();
        assert!(bridge.start(sink).is_err());
        assert!(!bridge.is_recording());
    }

    #[test]
    fn test_simulated_voice_forwards_to_inbox() {
        let capability = SimulatedVoice::new();
        let (sink, mut rx) = sink();
        assert!(!capability.interim("early"));
        capability.start(sink).unwrap();
        assert!(capability.interim("hello"));
        assert!(matches!(
            rx.try_recv(),
            Ok(ControllerInput::Voice(VoiceEvent::Interim(text))) if text == "hello"
        ));
    }
}
