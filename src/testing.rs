//! In-memory capability fakes for tests and native previews.
//!
//! Built for unit tests and behind the `testing` feature.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::Notify;

use crate::capabilities::{
    AttachmentRestore, AutoRefresh, Clock, DashboardRefresh, Dom, DomError, HookError,
    HostNotifier, HttpError, HttpHeaders, HttpRequest, HttpResponse, HttpTransport, ListenerKind,
    ModalHiddenCallback, ModalProtection, RegionWatcher, ViolationHandler, WatchHandle,
    WatchRegion,
};
use crate::model::Severity;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `2024-01-15` at the given time.
///
/// # Panics
/// On an out-of-range time.
#[must_use]
pub fn fixed_time(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 15)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .expect("valid time of day")
}

fn first_id(html: &str) -> Option<String> {
    let start = html.find("id=\"")? + 4;
    let len = html[start..].find('"')?;
    Some(html[start..start + len].to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeElement {
    pub html: String,
    pub text: String,
    pub class_name: String,
}

#[derive(Default)]
struct DomState {
    elements: Vec<(String, FakeElement)>,
    appended: Vec<String>,
    inputs: HashMap<String, String>,
    checked: HashMap<(String, String), Vec<String>>,
    listener_targets: HashMap<String, usize>,
    tagged: HashMap<String, usize>,
    listener_calls: Vec<(String, ListenerKind, usize)>,
    shown: Vec<String>,
    hidden: Vec<String>,
    hidden_callbacks: HashMap<String, Vec<ModalHiddenCallback>>,
}

impl DomState {
    fn find_mut(&mut self, id: &str) -> Option<&mut FakeElement> {
        self.elements
            .iter_mut()
            .find(|(el_id, _)| el_id == id)
            .map(|(_, el)| el)
    }

    fn contains(&self, id: &str) -> bool {
        self.elements.iter().any(|(el_id, _)| el_id == id)
    }
}

/// A page made of elements addressed by id.
///
/// `append_to_body` registers the appended markup under the first `id="…"`
/// it contains.
#[derive(Default)]
pub struct FakeDom {
    state: Mutex<DomState>,
    fail_appends: bool,
    fail_listeners: AtomicBool,
}

impl FakeDom {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_element(self, id: &str) -> Self {
        lock(&self.state)
            .elements
            .push((id.to_string(), FakeElement::default()));
        self
    }

    #[must_use]
    pub fn with_input(self, id: &str, value: &str) -> Self {
        lock(&self.state)
            .inputs
            .insert(id.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_checked(self, scope_id: &str, input_name: &str, values: &[&str]) -> Self {
        lock(&self.state).checked.insert(
            (scope_id.to_string(), input_name.to_string()),
            values.iter().map(ToString::to_string).collect(),
        );
        self
    }

    /// Pretend `count` elements match `selector`.
    #[must_use]
    pub fn with_listener_targets(self, selector: &str, count: usize) -> Self {
        lock(&self.state)
            .listener_targets
            .insert(selector.to_string(), count);
        self
    }

    #[must_use]
    pub fn failing_appends(mut self) -> Self {
        self.fail_appends = true;
        self
    }

    #[must_use]
    pub fn failing_listeners(self) -> Self {
        self.set_failing_listeners(true);
        self
    }

    pub fn set_failing_listeners(&self, failing: bool) {
        self.fail_listeners.store(failing, Ordering::SeqCst);
    }

    /// Add more matching elements, as a page re-render would.
    pub fn add_listener_targets(&self, selector: &str, count: usize) {
        *lock(&self.state)
            .listener_targets
            .entry(selector.to_string())
            .or_default() += count;
    }

    #[must_use]
    pub fn element(&self, id: &str) -> Option<FakeElement> {
        lock(&self.state)
            .elements
            .iter()
            .find(|(el_id, _)| el_id == id)
            .map(|(_, el)| el.clone())
    }

    #[must_use]
    pub fn count_with_id(&self, id: &str) -> usize {
        lock(&self.state)
            .elements
            .iter()
            .filter(|(el_id, _)| el_id == id)
            .count()
    }

    #[must_use]
    pub fn appended(&self) -> Vec<String> {
        lock(&self.state).appended.clone()
    }

    #[must_use]
    pub fn shown_modals(&self) -> Vec<String> {
        lock(&self.state).shown.clone()
    }

    #[must_use]
    pub fn hidden_modals(&self) -> Vec<String> {
        lock(&self.state).hidden.clone()
    }

    #[must_use]
    pub fn listener_calls(&self) -> Vec<(String, ListenerKind, usize)> {
        lock(&self.state).listener_calls.clone()
    }

    /// Elements matching `selector` that currently carry the listener marker.
    #[must_use]
    pub fn tagged(&self, selector: &str) -> usize {
        lock(&self.state).tagged.get(selector).copied().unwrap_or(0)
    }

    /// Simulate the user dismissing modal `id`. Returns whether any callback ran.
    pub fn fire_modal_hidden(&self, id: &str) -> bool {
        let callbacks = lock(&self.state)
            .hidden_callbacks
            .remove(id)
            .unwrap_or_default();
        let fired = !callbacks.is_empty();
        for callback in callbacks {
            callback();
        }
        fired
    }
}

impl Dom for FakeDom {
    fn set_inner_html(&self, id: &str, html: &str) -> Result<bool, DomError> {
        Ok(lock(&self.state)
            .find_mut(id)
            .map(|el| el.html = html.to_string())
            .is_some())
    }

    fn set_text(&self, id: &str, text: &str) -> Result<bool, DomError> {
        Ok(lock(&self.state)
            .find_mut(id)
            .map(|el| el.text = text.to_string())
            .is_some())
    }

    fn set_class_name(&self, id: &str, class_name: &str) -> Result<bool, DomError> {
        Ok(lock(&self.state)
            .find_mut(id)
            .map(|el| el.class_name = class_name.to_string())
            .is_some())
    }

    fn input_value(&self, id: &str) -> Result<Option<String>, DomError> {
        Ok(lock(&self.state).inputs.get(id).cloned())
    }

    fn checked_values(&self, scope_id: &str, input_name: &str) -> Result<Vec<String>, DomError> {
        Ok(lock(&self.state)
            .checked
            .get(&(scope_id.to_string(), input_name.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn append_to_body(&self, html: &str) -> Result<(), DomError> {
        if self.fail_appends {
            return Err(DomError::Unavailable("body is read-only".into()));
        }
        let mut state = lock(&self.state);
        state.appended.push(html.to_string());
        if let Some(id) = first_id(html) {
            state.elements.push((
                id,
                FakeElement {
                    html: html.to_string(),
                    ..FakeElement::default()
                },
            ));
        }
        Ok(())
    }

    fn remove_element(&self, id: &str) -> Result<bool, DomError> {
        let mut state = lock(&self.state);
        match state.elements.iter().position(|(el_id, _)| el_id == id) {
            Some(index) => {
                state.elements.remove(index);
                // Listeners go with the element.
                state.hidden_callbacks.remove(id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn attach_listener(
        &self,
        selector: &str,
        kind: ListenerKind,
        _marker_attr: &str,
    ) -> Result<usize, DomError> {
        if self.fail_listeners.load(Ordering::SeqCst) {
            return Err(DomError::InvalidSelector(selector.to_string()));
        }
        let mut state = lock(&self.state);
        let targets = state.listener_targets.get(selector).copied().unwrap_or(0);
        let tagged = state.tagged.entry(selector.to_string()).or_default();
        let attached = targets.saturating_sub(*tagged);
        *tagged = targets;
        state
            .listener_calls
            .push((selector.to_string(), kind, attached));
        Ok(attached)
    }

    fn strip_attribute(&self, _attr: &str) -> Result<usize, DomError> {
        let mut state = lock(&self.state);
        let stripped = state.tagged.values().sum();
        state.tagged.clear();
        Ok(stripped)
    }

    fn show_modal(&self, id: &str) -> Result<bool, DomError> {
        let mut state = lock(&self.state);
        state.shown.push(id.to_string());
        Ok(state.contains(id))
    }

    fn hide_modal(&self, id: &str) -> Result<bool, DomError> {
        let mut state = lock(&self.state);
        state.hidden.push(id.to_string());
        Ok(state.contains(id))
    }

    fn on_modal_hidden(&self, id: &str, callback: ModalHiddenCallback) -> Result<bool, DomError> {
        let mut state = lock(&self.state);
        state
            .hidden_callbacks
            .entry(id.to_string())
            .or_default()
            .push(callback);
        Ok(state.contains(id))
    }
}

/// Replies with queued responses in order; an empty queue is a network error.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, status: u16, body: serde_json::Value) {
        lock(&self.responses).push_back(Ok(HttpResponse::json_body(status, &body)));
    }

    pub fn push_raw(&self, status: u16, body: Vec<u8>) {
        lock(&self.responses).push_back(Ok(HttpResponse::new(status, HttpHeaders::new(), body)));
    }

    pub fn push_error(&self, error: HttpError) {
        lock(&self.responses).push_back(Err(error));
    }

    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        lock(&self.requests).push(request);
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| {
                Err(HttpError::Network {
                    message: "no scripted response".into(),
                })
            })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, Severity)>>,
    fail: bool,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every notification without recording it.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn messages(&self) -> Vec<(String, Severity)> {
        lock(&self.messages).clone()
    }
}

impl HostNotifier for RecordingNotifier {
    fn notify(&self, message: &str, severity: Severity) -> Result<(), HookError> {
        if self.fail {
            return Err(HookError::Failed("notifier crashed".into()));
        }
        lock(&self.messages).push((message.to_string(), severity));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDashboard {
    payloads: Mutex<Vec<serde_json::Value>>,
    fail: bool,
}

impl RecordingDashboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn payloads(&self) -> Vec<serde_json::Value> {
        lock(&self.payloads).clone()
    }
}

impl DashboardRefresh for RecordingDashboard {
    fn refresh(&self, payload: &serde_json::Value) -> Result<(), HookError> {
        lock(&self.payloads).push(payload.clone());
        if self.fail {
            return Err(HookError::Failed("dashboard widget missing".into()));
        }
        Ok(())
    }
}

/// Counts calls; serves as modal protection and attachment restore hook.
#[derive(Debug, Default)]
pub struct RecordingHook {
    calls: AtomicUsize,
}

impl RecordingHook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModalProtection for RecordingHook {
    fn protect(&self) -> Result<(), HookError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl AttachmentRestore for RecordingHook {
    fn restore(&self) -> Result<(), HookError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Refresh outcomes served in order; once drained every round succeeds
/// without a server time.
#[derive(Default)]
pub struct ScriptedRefresh {
    outcomes: Mutex<VecDeque<Result<Option<NaiveDateTime>, HookError>>>,
    calls: AtomicUsize,
}

impl ScriptedRefresh {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: Result<Option<NaiveDateTime>, HookError>) {
        lock(&self.outcomes).push_back(outcome);
    }

    pub fn push_failures(&self, count: usize) {
        let mut outcomes = lock(&self.outcomes);
        for _ in 0..count {
            outcomes.push_back(Err(HookError::Failed("server unreachable".into())));
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AutoRefresh for ScriptedRefresh {
    async fn refresh(&self) -> Result<Option<NaiveDateTime>, HookError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.outcomes).pop_front().unwrap_or(Ok(None))
    }
}

pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    #[must_use]
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *lock(&self.now) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *lock(&self.now)
    }
}

struct FakeWatchHandle {
    disconnects: Arc<AtomicUsize>,
    connected: bool,
    fail: bool,
}

impl WatchHandle for FakeWatchHandle {
    fn disconnect(&mut self) -> Result<(), DomError> {
        if self.fail {
            return Err(DomError::Unavailable("observer already gone".into()));
        }
        if self.connected {
            self.connected = false;
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Records watch registrations. A gated watcher parks every `watch` call
/// until [`FakeWatcher::open_gate`] releases it.
#[derive(Default)]
pub struct FakeWatcher {
    regions: Mutex<Vec<WatchRegion>>,
    handlers: Mutex<Vec<ViolationHandler>>,
    disconnects: Arc<AtomicUsize>,
    entered: AtomicUsize,
    gate: Option<Notify>,
    fail_watch: bool,
    fail_disconnect: bool,
}

impl FakeWatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_watch: true,
            ..Self::default()
        }
    }

    /// Make every `watch` fail, after passing the gate if there is one.
    #[must_use]
    pub fn fail_watches(mut self) -> Self {
        self.fail_watch = true;
        self
    }

    #[must_use]
    pub fn failing_disconnect() -> Self {
        Self {
            fail_disconnect: true,
            ..Self::default()
        }
    }

    /// Let one parked (or the next) `watch` call through.
    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    /// `watch` calls started, including parked ones.
    #[must_use]
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// `watch` calls that returned a handle.
    #[must_use]
    pub fn watch_calls(&self) -> usize {
        lock(&self.regions).len()
    }

    #[must_use]
    pub fn regions(&self) -> Vec<WatchRegion> {
        lock(&self.regions).clone()
    }

    #[must_use]
    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Fire every registered violation handler, as a DOM mutation would.
    pub fn trigger_violation(&self) {
        let handlers = lock(&self.handlers).clone();
        for handler in handlers {
            handler();
        }
    }
}

#[async_trait]
impl RegionWatcher for FakeWatcher {
    async fn watch(
        &self,
        region: &WatchRegion,
        on_violation: ViolationHandler,
    ) -> Result<Box<dyn WatchHandle>, DomError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_watch {
            return Err(DomError::Unavailable("mutation observer unsupported".into()));
        }
        lock(&self.regions).push(region.clone());
        lock(&self.handlers).push(on_violation);
        Ok(Box::new(FakeWatchHandle {
            disconnects: Arc::clone(&self.disconnects),
            connected: true,
            fail: self.fail_disconnect,
        }))
    }
}
