/// Best-effort React detection in the page realm
///
/// A single check at script load is not enough: the page may not have
/// booted React yet. The detector checks once, then keeps re-checking on
/// DOM mutations and on a fixed backoff schedule until something is found
/// or the hook gets installed by other means.

use crate::relay::{Context, Detection, Envelope, MessageSink, Payload};
use regex::Regex;
use std::rc::Rc;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Attributes older React versions stamp on rendered markup
pub const REACT_ATTRIBUTES: [&str; 2] = ["data-reactroot", "data-reactid"];

/// Independent heuristics, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    GlobalReact = 1,
    GlobalReactDom,
    DevtoolsHook,
    LegacyDevtoolsHook,
    RootAttribute,
    ReactIdAttribute,
    InternalKeys,
    RootContainer,
    DevtoolsAttach,
}

impl Probe {
    pub const ALL: [Probe; 9] = [
        Probe::GlobalReact,
        Probe::GlobalReactDom,
        Probe::DevtoolsHook,
        Probe::LegacyDevtoolsHook,
        Probe::RootAttribute,
        Probe::ReactIdAttribute,
        Probe::InternalKeys,
        Probe::RootContainer,
        Probe::DevtoolsAttach,
    ];

    /// 1-based id reported in `reactDetected`
    pub fn id(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Error)]
#[error("probe {probe:?} failed: {reason}")]
pub struct ProbeError {
    pub probe: Probe,
    pub reason: String,
}

/// Where probes are evaluated (the page's window and document)
pub trait ProbeTarget {
    fn probe(&self, probe: Probe) -> Result<bool, ProbeError>;

    /// Elements that look like React roots, counting at most `limit`
    fn count_roots(&self, limit: usize) -> Result<usize, ProbeError>;

    fn react_version(&self) -> Option<String>;
}

/// Property names React attaches to DOM nodes it manages
pub fn is_react_internal_key(key: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^__react(Fiber|InternalInstance|Container|Props)\$").ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(key))
}

/// First probe that says yes. A probe that fails counts as a no.
pub fn detect<T: ProbeTarget + ?Sized>(target: &T) -> Option<Probe> {
    for probe in Probe::ALL {
        match target.probe(probe) {
            Ok(true) => {
                log::debug!("React detected using method {}", probe.id());
                return Some(probe);
            }
            Ok(false) => {}
            Err(e) => log::warn!("Error in React detection method {}: {}", probe.id(), e),
        }
    }
    None
}

/// Timers and the mutation observer driving the retries
pub trait Scheduler {
    type Timer;

    /// Arrange for `Detector::on_timer(attempt)` to run after `delay`.
    fn schedule(&self, delay: Duration, attempt: usize) -> Self::Timer;

    fn cancel(&self, timer: Self::Timer);

    /// Start delivering `Detector::on_mutation` for React attribute and
    /// child-list changes.
    fn observe(&self);

    fn disconnect(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    Searching,
    Detected(Probe),
    /// The hook got installed without a detection; retries are pointless
    Installed,
}

pub struct Detector<T, S: Scheduler> {
    target: T,
    scheduler: S,
    delays: Vec<Duration>,
    sink: Rc<dyn MessageSink>,
    session: Uuid,
    state: DetectorState,
    pending: Vec<(usize, S::Timer)>,
    observing: bool,
    attempts: usize,
    reported_absent: bool,
}

impl<T: ProbeTarget, S: Scheduler> Detector<T, S> {
    pub fn new(
        target: T,
        scheduler: S,
        delays: Vec<Duration>,
        sink: Rc<dyn MessageSink>,
        session: Uuid,
    ) -> Self {
        Detector {
            target,
            scheduler,
            delays,
            sink,
            session,
            state: DetectorState::Idle,
            pending: Vec::new(),
            observing: false,
            attempts: 0,
            reported_absent: false,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn pending_retries(&self) -> usize {
        self.pending.len()
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Check immediately; on failure start observing and schedule retries.
    ///
    /// Returns the probe when this call made the detection. Every detection
    /// is returned exactly once across `start`, `on_mutation` and `on_timer`.
    pub fn start(&mut self) -> Option<Probe> {
        if self.state != DetectorState::Idle {
            return None;
        }
        self.state = DetectorState::Searching;

        if let Some(probe) = self.attempt() {
            return Some(probe);
        }

        log::debug!("React not detected initially, setting up observer and retries");
        self.scheduler.observe();
        self.observing = true;
        for (attempt, delay) in self.delays.iter().enumerate() {
            let timer = self.scheduler.schedule(*delay, attempt);
            self.pending.push((attempt, timer));
        }
        if self.pending.is_empty() {
            self.report_absent();
        }
        None
    }

    pub fn on_mutation(&mut self) -> Option<Probe> {
        if self.state != DetectorState::Searching {
            return None;
        }
        self.attempt()
    }

    pub fn on_timer(&mut self, attempt: usize) -> Option<Probe> {
        if self.state != DetectorState::Searching {
            return None;
        }
        // the timer already fired, so it is dropped rather than cancelled
        self.pending.retain(|(pending, _)| *pending != attempt);

        let found = self.attempt();
        if found.is_some() {
            log::debug!("React detected after retry {}", attempt + 1);
        } else if self.pending.is_empty() {
            self.report_absent();
        }
        found
    }

    /// Stop all retries because the hook is in place regardless.
    pub fn mark_installed(&mut self) {
        if matches!(self.state, DetectorState::Idle | DetectorState::Searching) {
            self.state = DetectorState::Installed;
            self.stop();
        }
    }

    fn attempt(&mut self) -> Option<Probe> {
        self.attempts += 1;
        let probe = detect(&self.target)?;

        self.state = DetectorState::Detected(probe);
        self.stop();
        self.post(Payload::ReactDetected(Detection {
            method: probe.id(),
            version: self.target.react_version(),
        }));
        Some(probe)
    }

    fn stop(&mut self) {
        for (_, timer) in self.pending.drain(..) {
            self.scheduler.cancel(timer);
        }
        if self.observing {
            self.scheduler.disconnect();
            self.observing = false;
        }
    }

    // Once per page, when the backoff schedule ran out. The observer stays.
    fn report_absent(&mut self) {
        if !self.reported_absent {
            self.reported_absent = true;
            log::debug!("React not detected after {} attempts", self.attempts);
            self.post(Payload::ReactNotDetected);
        }
    }

    fn post(&self, payload: Payload) {
        self.sink
            .post(Envelope::new(Context::Page, payload).with_session(self.session));
    }
}

/// Low-frequency re-scan for roots that appear after detection
#[derive(Debug, Clone)]
pub struct RootScanner {
    max_ticks: u32,
    max_roots: usize,
    ticks: u32,
    last_count: usize,
    cancelled: bool,
}

impl RootScanner {
    pub fn new(max_ticks: u32, max_roots: usize) -> Self {
        RootScanner {
            max_ticks,
            max_roots,
            ticks: 0,
            last_count: 0,
            cancelled: false,
        }
    }

    /// Scan once. Returns the count when it changed to a non-zero value.
    pub fn tick<T: ProbeTarget + ?Sized>(&mut self, target: &T) -> Option<usize> {
        if self.is_finished() {
            return None;
        }
        self.ticks += 1;

        let count = match target.count_roots(self.max_roots) {
            Ok(count) => count,
            Err(e) => {
                log::warn!("Root scan failed: {}", e);
                return None;
            }
        };
        if count == self.last_count {
            return None;
        }
        self.last_count = count;
        log::debug!("Found React roots: {}", count);
        (count > 0).then_some(count)
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_finished(&self) -> bool {
        self.cancelled || self.ticks >= self.max_ticks
    }
}
