//! Tiered deviation alerts.
//!
//! Each configured target keeps its own state. On every [`DeviationSample`]
//! the engine evaluates, per target and in this order:
//!
//! 1. zero to non-zero: `RecoveredFromZero`, delivered immediately
//! 2. non-zero to zero: `FullyRestored`, delivered immediately; the last tier
//!    drops back to `None` and a pending escalation is discarded
//! 3. a strictly higher tier: `Escalated`, delivered after the target's delay;
//!    a newer escalation supersedes one still waiting
//! 4. crossing the mention threshold: folded into the escalation from step 3
//!    when there is one, otherwise delivered as `MentionCrossed`
//!
//! Tiers never step down except through the zero reset, so a dip below a
//! previously reached tier is silent.

mod tier;

pub use tier::{Tier, ZERO_EPSILON, is_zero};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pixguard_core::{ActivityKind, ActorRecord, DeviationSample, NotifySettings};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::tracker::ActorEventSink;

/// Event handed to a [`TierSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum TierEvent {
    /// The tier rose; delivered after the debounce delay.
    Escalated {
        /// New tier.
        tier: Tier,
        /// Value that produced it.
        value: f64,
        /// The mention threshold was crossed by this escalation.
        mention: bool,
        /// Sample that produced it.
        sample: DeviationSample,
    },
    /// Deviation appeared after being zero.
    RecoveredFromZero {
        /// Current value.
        value: f64,
        /// Triggering sample.
        sample: DeviationSample,
    },
    /// Deviation returned to zero.
    FullyRestored {
        /// Triggering sample.
        sample: DeviationSample,
    },
    /// The mention threshold was crossed without a tier change.
    MentionCrossed {
        /// Current value.
        value: f64,
        /// Triggering sample.
        sample: DeviationSample,
    },
    /// An actor reached the burst threshold.
    BurstActor {
        /// Direction of the burst.
        kind: ActivityKind,
        /// Detached copy of the actor record.
        actor: ActorRecord,
    },
}

/// Delivery strategy for engine events.
pub trait TierSink: Send + Sync {
    /// Deliver `event` for `target`. Must not block.
    fn deliver(&self, target: &str, event: TierEvent);
}

impl<F> TierSink for F
where
    F: Fn(&str, TierEvent) + Send + Sync,
{
    fn deliver(&self, target: &str, event: TierEvent) {
        self(target, event);
    }
}

#[derive(Debug)]
struct TargetState {
    settings: NotifySettings,
    last_tier: Tier,
    mention_triggered: bool,
    was_zero: bool,
    pending: Option<JoinHandle<()>>,
    pending_mention: bool,
}

impl TargetState {
    const fn new(settings: NotifySettings) -> Self {
        Self {
            settings,
            last_tier: Tier::None,
            mention_triggered: false,
            was_zero: true,
            pending: None,
            pending_mention: false,
        }
    }

    fn waiting(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn cancel_pending(&mut self) -> bool {
        let was_waiting = self.waiting();
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        self.pending_mention = false;
        was_waiting
    }
}

#[derive(Debug, Default)]
struct EngineState {
    targets: BTreeMap<String, TargetState>,
    suppressed: bool,
}

struct EngineInner {
    sink: Arc<dyn TierSink>,
    state: Mutex<EngineState>,
}

/// Per-target tier tracking with debounced escalation.
///
/// Clones share targets and sink.
#[derive(Clone)]
pub struct NotificationTierEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for NotificationTierEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationTierEngine")
            .field("targets", &self.targets())
            .field("suppressed", &self.is_suppressed())
            .finish_non_exhaustive()
    }
}

impl NotificationTierEngine {
    /// Engine without targets delivering to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn TierSink>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                sink,
                state: Mutex::new(EngineState::default()),
            }),
        }
    }

    /// Add a target or replace its settings. Either way its state starts fresh.
    pub fn configure(&self, target: impl Into<String>, settings: NotifySettings) {
        let target = target.into();
        let mut state = self.state();
        if let Some(mut old) = state.targets.insert(target.clone(), TargetState::new(settings)) {
            old.cancel_pending();
        }
        debug!(target_id = %target, threshold = settings.threshold, "notification target configured");
    }

    /// Forget a target. Returns `false` if it was unknown.
    pub fn remove(&self, target: &str) -> bool {
        self.state()
            .targets
            .remove(target)
            .map(|mut st| st.cancel_pending())
            .is_some()
    }

    /// Clear a target's last tier, mention flag and pending escalation.
    pub fn reset(&self, target: &str) {
        if let Some(st) = self.state().targets.get_mut(target) {
            st.cancel_pending();
            *st = TargetState::new(st.settings);
        }
    }

    /// Ignore updates while `suppressed` is true. Target state is left as is.
    pub fn suppress(&self, suppressed: bool) {
        self.state().suppressed = suppressed;
        info!(suppressed, "notification suppression changed");
    }

    /// True while updates are ignored.
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.state().suppressed
    }

    /// Configured target ids in order.
    #[must_use]
    pub fn targets(&self) -> Vec<String> {
        self.state().targets.keys().cloned().collect()
    }

    /// Last recorded tier of a target.
    #[must_use]
    pub fn last_tier(&self, target: &str) -> Option<Tier> {
        self.state().targets.get(target).map(|st| st.last_tier)
    }

    /// True while an escalation for `target` is waiting out its delay.
    #[must_use]
    pub fn has_pending(&self, target: &str) -> bool {
        self.state()
            .targets
            .get(target)
            .is_some_and(TargetState::waiting)
    }

    /// Abort every waiting escalation.
    pub fn cancel_all_pending(&self) {
        let mut state = self.state();
        let aborted = state
            .targets
            .values_mut()
            .map(TargetState::cancel_pending)
            .filter(|aborted| *aborted)
            .count();
        if aborted > 0 {
            debug!(aborted, "pending escalations aborted");
        }
    }

    /// Evaluate `sample` against every enabled target.
    pub fn update(&self, sample: &DeviationSample) {
        let mut immediate: Vec<(String, TierEvent)> = Vec::new();
        {
            let mut state = self.state();
            if state.suppressed {
                return;
            }
            for (target, st) in &mut state.targets {
                if !st.settings.auto_notify_enabled {
                    continue;
                }
                self.evaluate(target, st, sample, &mut immediate);
            }
        }
        for (target, event) in immediate {
            self.inner.sink.deliver(&target, event);
        }
    }

    fn evaluate(
        &self,
        target: &str,
        st: &mut TargetState,
        sample: &DeviationSample,
        immediate: &mut Vec<(String, TierEvent)>,
    ) {
        let settings = st.settings;
        let value = sample.value(settings.metric);
        let zero = is_zero(value);

        if st.was_zero && !zero {
            info!(target_id = %target, value, "deviation appeared");
            immediate.push((
                target.to_owned(),
                TierEvent::RecoveredFromZero {
                    value,
                    sample: sample.clone(),
                },
            ));
        } else if !st.was_zero && zero {
            info!(target_id = %target, "deviation fully restored");
            st.last_tier = Tier::None;
            st.cancel_pending();
            immediate.push((
                target.to_owned(),
                TierEvent::FullyRestored {
                    sample: sample.clone(),
                },
            ));
        }
        st.was_zero = zero;

        let tier = Tier::calculate(value, settings.threshold);
        let crossing = value >= settings.mention_threshold && !st.mention_triggered;
        st.mention_triggered = value >= settings.mention_threshold;

        if tier > st.last_tier {
            st.last_tier = tier;
            let carried = st.waiting() && st.pending_mention;
            st.cancel_pending();
            let mention = crossing || carried;
            let event = TierEvent::Escalated {
                tier,
                value,
                mention,
                sample: sample.clone(),
            };
            info!(target_id = %target, %tier, value, mention, "tier escalated");
            self.schedule(target, st, event, mention, immediate);
        } else if crossing {
            info!(target_id = %target, value, "mention threshold crossed");
            immediate.push((
                target.to_owned(),
                TierEvent::MentionCrossed {
                    value,
                    sample: sample.clone(),
                },
            ));
        }
    }

    fn schedule(
        &self,
        target: &str,
        st: &mut TargetState,
        event: TierEvent,
        mention: bool,
        immediate: &mut Vec<(String, TierEvent)>,
    ) {
        let delay = st.settings.delay;
        if delay.is_zero() {
            immediate.push((target.to_owned(), event));
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(target_id = %target, "no runtime for debounce; delivering escalation now");
            immediate.push((target.to_owned(), event));
            return;
        };
        let sink = Arc::clone(&self.inner.sink);
        let target = target.to_owned();
        let deadline = tokio::time::Instant::now() + delay;
        st.pending_mention = mention;
        st.pending = Some(runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            sink.deliver(&target, event);
        }));
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ActorEventSink for NotificationTierEngine {
    fn on_burst(&self, kind: ActivityKind, actor: ActorRecord) {
        let targets: Vec<String> = self
            .state()
            .targets
            .iter()
            .filter(|(_, st)| match kind {
                ActivityKind::Vandal => st.settings.vandal_alerts,
                ActivityKind::Restore => st.settings.restore_alerts,
            })
            .map(|(id, _)| id.clone())
            .collect();
        for target in targets {
            self.inner.sink.deliver(
                &target,
                TierEvent::BurstActor {
                    kind,
                    actor: actor.clone(),
                },
            );
        }
    }
}
