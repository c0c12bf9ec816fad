//! Per-call session state
//!
//! The session is a data holder with small, lock-scoped helpers. Heavier
//! orchestration lives in the turn pipeline; nothing here performs I/O.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use voicebot_core::{ConversationHistory, SampleRate, Turn};

/// Greeting progress; `Done` is absorbing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreetingState {
    Pending,
    InProgress,
    Done,
}

/// State for one active call
pub struct CallSession {
    /// Opaque call identifier (carrier-supplied or synthesized)
    pub call_id: String,
    /// Carrier leg sample rate, fixed at accept time
    pub sample_rate: SampleRate,
    /// Assigned by the carrier in the first event that carries it; immutable after
    stream_sid: RwLock<Option<String>>,
    custom_parameters: RwLock<HashMap<String, String>>,
    inbound: Mutex<Vec<u8>>,
    history: Mutex<ConversationHistory>,
    sequence: AtomicU64,
    active: AtomicBool,
    greeting: Mutex<GreetingState>,
    processing_turn: AtomicBool,
    barge_in: AtomicBool,
    created_at: Instant,
    last_activity: Mutex<Instant>,
}

impl CallSession {
    pub fn new(call_id: impl Into<String>, sample_rate: SampleRate) -> Self {
        Self {
            call_id: call_id.into(),
            sample_rate,
            stream_sid: RwLock::new(None),
            custom_parameters: RwLock::new(HashMap::new()),
            inbound: Mutex::new(Vec::new()),
            history: Mutex::new(ConversationHistory::new()),
            sequence: AtomicU64::new(0),
            active: AtomicBool::new(true),
            greeting: Mutex::new(GreetingState::Pending),
            processing_turn: AtomicBool::new(false),
            barge_in: AtomicBool::new(false),
            created_at: Instant::now(),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    // --- stream identity ---

    /// Pin the stream sid on first sight. Returns `true` only for the call
    /// that actually set it; later values are ignored.
    pub fn set_stream_sid(&self, sid: &str) -> bool {
        let mut guard = self.stream_sid.write();
        if guard.is_some() {
            return false;
        }
        *guard = Some(sid.to_string());
        true
    }

    pub fn stream_sid(&self) -> Option<String> {
        self.stream_sid.read().clone()
    }

    // --- custom parameters ---

    /// Merge parameters supplied by a `connected`/`start` event
    pub fn merge_custom_parameters(&self, params: &HashMap<String, String>) {
        let mut guard = self.custom_parameters.write();
        for (k, v) in params {
            guard.insert(k.clone(), v.clone());
        }
    }

    pub fn custom_parameter(&self, key: &str) -> Option<String> {
        self.custom_parameters.read().get(key).cloned()
    }

    pub fn custom_parameters_snapshot(&self) -> HashMap<String, String> {
        self.custom_parameters.read().clone()
    }

    // --- inbound audio buffer ---

    /// Append caller PCM. Inactive sessions accept nothing.
    pub fn push_inbound(&self, pcm: &[u8]) -> bool {
        if !self.is_active() {
            return false;
        }
        self.inbound.lock().extend_from_slice(pcm);
        self.touch();
        true
    }

    /// Snapshot and clear the inbound buffer
    pub fn take_inbound(&self) -> Vec<u8> {
        std::mem::take(&mut *self.inbound.lock())
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.lock().len()
    }

    /// Enough audio buffered for a turn, and nothing else holding the wire.
    /// A greeting mid-stream defers the turn so sequence order stays strict.
    pub fn should_trigger_turn(&self) -> bool {
        self.is_active()
            && !self.processing_turn.load(Ordering::Acquire)
            && self.greeting_state() != GreetingState::InProgress
            && self.inbound_len() >= self.sample_rate.turn_trigger_bytes()
    }

    // --- turn gating ---

    /// Acquire the single-turn gate; `false` when a turn is already running
    pub fn begin_turn(&self) -> bool {
        self.processing_turn
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_turn(&self) {
        self.processing_turn.store(false, Ordering::Release);
    }

    pub fn turn_in_flight(&self) -> bool {
        self.processing_turn.load(Ordering::Acquire)
    }

    // --- barge-in ---

    pub fn request_barge_in(&self) {
        self.barge_in.store(true, Ordering::Release);
    }

    pub fn barge_in_pending(&self) -> bool {
        self.barge_in.load(Ordering::Acquire)
    }

    /// Clear the flag, reporting whether it was set
    pub fn clear_barge_in(&self) -> bool {
        self.barge_in.swap(false, Ordering::AcqRel)
    }

    // --- sequencing ---

    /// Allocate the next outbound sequence number (strictly monotonic)
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::AcqRel)
    }

    /// Sequence numbers allocated so far
    pub fn sequence_count(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    // --- lifecycle ---

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    // --- greeting state machine ---

    /// Transition pending -> in_progress; `false` if already started or done
    pub fn greeting_begin(&self) -> bool {
        let mut guard = self.greeting.lock();
        if *guard == GreetingState::Pending {
            *guard = GreetingState::InProgress;
            true
        } else {
            false
        }
    }

    /// Transition in_progress -> done (absorbing)
    pub fn greeting_done(&self) {
        *self.greeting.lock() = GreetingState::Done;
    }

    /// Roll in_progress back to pending (greeting failed before any audio)
    pub fn greeting_revert(&self) {
        let mut guard = self.greeting.lock();
        if *guard == GreetingState::InProgress {
            *guard = GreetingState::Pending;
        }
    }

    pub fn greeting_state(&self) -> GreetingState {
        *self.greeting.lock()
    }

    // --- conversation history ---

    pub fn set_system_message(&self, text: impl Into<String>) {
        self.history.lock().set_system(text);
    }

    pub fn push_user(&self, text: impl Into<String>) {
        self.history.lock().push_user(text);
    }

    pub fn push_assistant(&self, text: impl Into<String>) {
        self.history.lock().push_assistant(text);
    }

    pub fn history_snapshot(&self) -> ConversationHistory {
        self.history.lock().clone()
    }

    pub fn history_turns(&self) -> Vec<Turn> {
        self.history.lock().turns().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> CallSession {
        CallSession::new("CA123", SampleRate::Hz8000)
    }

    #[test]
    fn test_stream_sid_pinned_once() {
        let s = session();
        assert!(s.set_stream_sid("S1"));
        assert!(!s.set_stream_sid("S2"));
        assert_eq!(s.stream_sid().as_deref(), Some("S1"));
    }

    #[test]
    fn test_sequence_monotonic() {
        let s = session();
        assert_eq!(s.next_sequence(), 0);
        assert_eq!(s.next_sequence(), 1);
        assert_eq!(s.next_sequence(), 2);
        assert_eq!(s.sequence_count(), 3);
    }

    #[test]
    fn test_inactive_session_accepts_no_audio() {
        let s = session();
        assert!(s.push_inbound(&[0u8; 320]));
        s.close();
        assert!(!s.push_inbound(&[0u8; 320]));
        assert_eq!(s.inbound_len(), 320);
    }

    #[test]
    fn test_turn_trigger_threshold() {
        let s = session();
        s.push_inbound(&vec![1u8; 31999]);
        assert!(!s.should_trigger_turn());
        s.push_inbound(&[1u8]);
        assert!(s.should_trigger_turn()); // 2s at 8kHz = 32000 bytes

        assert!(s.begin_turn());
        assert!(!s.should_trigger_turn());
        assert!(!s.begin_turn());
        s.end_turn();
        assert!(s.begin_turn());
    }

    #[test]
    fn test_take_inbound_clears_buffer() {
        let s = session();
        s.push_inbound(&[1, 2, 3, 4]);
        assert_eq!(s.take_inbound(), vec![1, 2, 3, 4]);
        assert_eq!(s.inbound_len(), 0);
    }

    #[test]
    fn test_barge_in_flag() {
        let s = session();
        assert!(!s.clear_barge_in());
        s.request_barge_in();
        assert!(s.barge_in_pending());
        assert!(s.clear_barge_in());
        assert!(!s.barge_in_pending());
    }

    #[test]
    fn test_greeting_transitions() {
        let s = session();
        assert_eq!(s.greeting_state(), GreetingState::Pending);
        assert!(s.greeting_begin());
        assert!(!s.greeting_begin());

        s.greeting_revert();
        assert_eq!(s.greeting_state(), GreetingState::Pending);

        assert!(s.greeting_begin());
        s.greeting_done();
        assert_eq!(s.greeting_state(), GreetingState::Done);

        // Done is absorbing
        s.greeting_revert();
        assert_eq!(s.greeting_state(), GreetingState::Done);
        assert!(!s.greeting_begin());
    }

    #[test]
    fn test_custom_parameter_merge() {
        let s = session();
        let mut params = HashMap::new();
        params.insert("voice".to_string(), "nova".to_string());
        s.merge_custom_parameters(&params);

        let mut more = HashMap::new();
        more.insert("greeting".to_string(), "Hi.".to_string());
        s.merge_custom_parameters(&more);

        assert_eq!(s.custom_parameter("voice").as_deref(), Some("nova"));
        assert_eq!(s.custom_parameter("greeting").as_deref(), Some("Hi."));
    }
}
