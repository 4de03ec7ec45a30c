use crate::attrs::{default_class_names, OverlayAttrs, TriggerAttrs};
use crate::config::Config;
use crate::focus::FocusTarget;
use crate::geometry::{compute_position, Layout, Placement, Position, Rect, Size};
use crate::popup::{Closer, Mode, PopupSpec};
use crate::scheduler::DelayScheduler;
use crate::subscription::{DocumentEvent, Subscription};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Delay before a flipped placement is committed after a layout change.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// The overlay currently shown (or about to be shown).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveOverlay {
    /// Placement the spec is configured under.
    pub key: Placement,
    pub mode: Mode,
    /// Side actually rendered, possibly flipped away from `key`.
    pub placement: Placement,
    pub position: Position,
}

impl ActiveOverlay {
    fn new(key: Placement, mode: Mode, layout: Layout) -> Self {
        Self {
            key,
            mode,
            placement: layout.placement,
            position: layout.position,
        }
    }

    fn is_pair(&self, key: Placement, mode: Mode) -> bool {
        self.key == key && self.mode == mode
    }
}

/// Single-slot visibility: at most one overlay is open per trigger.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Visibility {
    #[default]
    Closed,
    Open(ActiveOverlay),
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Open(ActiveOverlay),
    /// Focus goes back to the trigger once the overlay is gone.
    Close { restore_focus: bool },
}

/// Everything a presenter needs to draw the open overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderState {
    pub id: String,
    pub placement: Placement,
    pub mode: Mode,
    pub position: Position,
    pub content: String,
    pub trigger: TriggerAttrs,
    pub overlay: OverlayAttrs,
    pub class_names: Vec<String>,
}

/// Actions the machine wants the presenter to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Mount or re-render the overlay.
    Show(RenderState),
    /// Unmount the overlay (exit transition is the presenter's business).
    Hide { trigger: TriggerAttrs },
    /// Move the mounted overlay without re-rendering it.
    Reposition { position: Position },
    Focus { target: FocusTarget },
    /// Suppress the browser's default handling of the current key event.
    PreventDefault,
    Listen { events: Vec<DocumentEvent> },
    Unlisten { events: Vec<DocumentEvent> },
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Hook {
    Open,
    Close,
    MouseEnter,
    MouseLeave,
}

pub struct VisibilityMachine {
    id: String,
    config: Config,
    trigger: Rect,
    viewport: Size,
    /// Real overlay size once the presenter has measured it.
    measured: Option<Size>,
    state: Visibility,
    scheduler: DelayScheduler<Transition>,
    /// Flipped placement waiting for the next frame.
    frame: Option<(Instant, Placement)>,
    subscription: Subscription,
    closer: Closer,
}

impl VisibilityMachine {
    pub fn new(id: impl Into<String>, config: Config, trigger: Rect, viewport: Size) -> Self {
        Self {
            id: id.into(),
            config,
            trigger,
            viewport,
            measured: None,
            state: Visibility::Closed,
            scheduler: DelayScheduler::new(),
            frame: None,
            subscription: Subscription::default(),
            closer: Closer::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> Visibility {
        self.state
    }

    pub fn active(&self) -> Option<ActiveOverlay> {
        match self.state {
            Visibility::Open(active) => Some(active),
            Visibility::Closed => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, Visibility::Open(_))
    }

    /// Overlay a pending open timer will show.
    pub fn pending_open(&self) -> Option<ActiveOverlay> {
        match self.scheduler.pending_action() {
            Some(Transition::Open(target)) => Some(*target),
            _ => None,
        }
    }

    /// The overlay the most recent intent is about: a pending open wins
    /// over the one currently shown.
    pub fn current_target(&self) -> Option<ActiveOverlay> {
        self.pending_open().or_else(|| self.active())
    }

    pub fn is_listening(&self) -> bool {
        self.subscription.is_attached()
    }

    pub fn closer(&self) -> &Closer {
        &self.closer
    }

    pub fn trigger_rect(&self) -> Rect {
        self.trigger
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn overlay_size(&self) -> Size {
        self.measured
            .unwrap_or_else(|| self.config.general.fallback_size())
    }

    /// Bounds of the open overlay.
    pub fn overlay_rect(&self) -> Option<Rect> {
        self.active()
            .map(|active| Rect::at(active.position, self.overlay_size()))
    }

    pub fn spec(&self, key: Placement, mode: Mode) -> Option<&PopupSpec> {
        self.config.placements.get(key, mode)
    }

    pub fn active_spec(&self) -> Option<&PopupSpec> {
        self.active()
            .and_then(|active| self.spec(active.key, active.mode))
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let frame = self.frame.map(|(due, _)| due);
        match (self.scheduler.next_deadline(), frame) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn layout_for(&self, key: Placement, spec: &PopupSpec) -> Layout {
        self.layout_with_size(key, spec, self.overlay_size())
    }

    /// Layout for an overlay that is not mounted yet. The measured size
    /// belongs to whatever is open now.
    fn fresh_layout_for(&self, key: Placement, spec: &PopupSpec) -> Layout {
        self.layout_with_size(key, spec, self.config.general.fallback_size())
    }

    fn layout_with_size(&self, key: Placement, spec: &PopupSpec, overlay: Size) -> Layout {
        compute_position(
            &self.trigger,
            overlay,
            key,
            self.config.offset_for(spec),
            self.viewport,
            self.config.allow_flip(spec),
        )
    }

    /// Request the overlay for (key, mode). Undefined pairs are ignored.
    ///
    /// The layout is computed now, with the fallback size if the overlay was
    /// never measured, so the first paint already lands on the right side.
    pub fn open(&mut self, key: Placement, mode: Mode, now: Instant) {
        let Some(spec) = self.spec(key, mode) else {
            debug!(placement = %key, mode = %mode, "no popup configured, ignoring open");
            return;
        };

        if self.active().is_some_and(|a| a.is_pair(key, mode)) {
            if self.scheduler.cancel_pending() {
                debug!(placement = %key, mode = %mode, "already open, pending transition cancelled");
            }
            return;
        }

        let delay = spec.open_delay(mode);
        let target = ActiveOverlay::new(key, mode, self.fresh_layout_for(key, spec));
        debug!(placement = %key, resolved = %target.placement, mode = %mode, ?delay, "scheduling open");
        self.scheduler.schedule_open(now, delay, Transition::Open(target));
    }

    /// Request the open overlay to close after its spec's close delay.
    ///
    /// An open that has not fired yet is simply cancelled.
    pub fn close(&mut self, now: Instant) {
        self.schedule_close(now, false);
    }

    /// Like [`close`](Self::close), but hand focus back to the trigger once
    /// the overlay is gone.
    pub fn close_restoring_focus(&mut self, now: Instant) {
        self.schedule_close(now, true);
    }

    fn schedule_close(&mut self, now: Instant, restore_focus: bool) {
        let Some(active) = self.active() else {
            if self.scheduler.cancel_pending() {
                debug!("pending open cancelled");
            }
            return;
        };

        let delay = self
            .spec(active.key, active.mode)
            .map(|spec| spec.close_delay(active.mode))
            .unwrap_or_default();
        debug!(placement = %active.placement, mode = %active.mode, ?delay, restore_focus, "scheduling close");
        self.scheduler
            .schedule_close(now, delay, Transition::Close { restore_focus });
    }

    pub fn cancel_pending_close(&mut self) -> bool {
        self.scheduler.cancel_pending_close()
    }

    /// Fire whatever is due: the pending transition, then a deferred
    /// placement commit.
    pub fn check_timer(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();

        if let Some((_, transition)) = self.scheduler.take_due(now) {
            match transition {
                Transition::Open(target) => self.finish_open(target, &mut actions),
                Transition::Close { restore_focus } => self.finish_close(restore_focus, &mut actions),
            }
        }

        if let Some((due, placement)) = self.frame {
            if due <= now {
                self.frame = None;
                self.commit_placement(placement, &mut actions);
            }
        }

        actions
    }

    fn finish_open(&mut self, target: ActiveOverlay, actions: &mut Vec<Action>) {
        if let Visibility::Open(previous) = self.state {
            debug!(placement = %previous.placement, mode = %previous.mode, "superseded by another popup");
            self.invoke(previous.key, previous.mode, Hook::Close);
            self.measured = None;
        }

        self.state = Visibility::Open(target);
        self.frame = None;
        debug!(placement = %target.placement, mode = %target.mode, "overlay opened");
        self.invoke(target.key, target.mode, Hook::Open);

        actions.push(Action::Show(self.render_state(&target)));
        actions.extend(self.subscription.attach());
        if target.mode == Mode::Click {
            actions.push(Action::Focus {
                target: FocusTarget::Overlay,
            });
        }
    }

    fn finish_close(&mut self, restore_focus: bool, actions: &mut Vec<Action>) {
        let Visibility::Open(previous) = std::mem::take(&mut self.state) else {
            return;
        };
        self.frame = None;
        self.measured = None;
        debug!(placement = %previous.placement, mode = %previous.mode, "overlay closed");
        self.invoke(previous.key, previous.mode, Hook::Close);

        actions.push(Action::Hide {
            trigger: TriggerAttrs::closed(),
        });
        actions.extend(self.subscription.detach());
        if restore_focus {
            actions.push(Action::Focus {
                target: FocusTarget::Trigger,
            });
        }
    }

    fn commit_placement(&mut self, placement: Placement, actions: &mut Vec<Action>) {
        let Visibility::Open(active) = &mut self.state else {
            return;
        };
        if active.placement == placement {
            return;
        }
        debug!(from = %active.placement, to = %placement, "committing flipped placement");
        active.placement = placement;
        let active = *active;
        actions.push(Action::Show(self.render_state(&active)));
    }

    pub(crate) fn invoke(&self, key: Placement, mode: Mode, hook: Hook) {
        let Some(spec) = self.spec(key, mode) else {
            return;
        };
        let callback = match hook {
            Hook::Open => &spec.on_open,
            Hook::Close => &spec.on_close,
            Hook::MouseEnter => &spec.on_mouse_enter,
            Hook::MouseLeave => &spec.on_mouse_leave,
        };
        crate::popup::fire(callback);
    }

    fn render_state(&self, active: &ActiveOverlay) -> RenderState {
        let spec = self.spec(active.key, active.mode);
        let content = spec
            .map(|spec| spec.content.render(&self.closer))
            .unwrap_or_default();
        let class_names = if spec.is_some_and(|spec| spec.apply_default_class_names) {
            default_class_names(active.placement, active.mode)
        } else {
            Vec::new()
        };

        RenderState {
            id: self.id.clone(),
            placement: active.placement,
            mode: active.mode,
            position: active.position,
            content,
            trigger: TriggerAttrs::open(&self.id),
            overlay: OverlayAttrs::new(&self.id, active.mode, active.placement),
            class_names,
        }
    }

    /// Render state of the open overlay, if any.
    pub fn render(&self) -> Option<RenderState> {
        self.active().map(|active| self.render_state(&active))
    }

    pub fn trigger_attrs(&self) -> TriggerAttrs {
        if self.is_open() {
            TriggerAttrs::open(&self.id)
        } else {
            TriggerAttrs::closed()
        }
    }

    pub fn set_viewport(&mut self, viewport: Size, now: Instant) -> Vec<Action> {
        self.viewport = viewport;
        self.relayout(now)
    }

    pub fn set_trigger_rect(&mut self, trigger: Rect, now: Instant) -> Vec<Action> {
        self.trigger = trigger;
        self.relayout(now)
    }

    pub fn set_overlay_size(&mut self, size: Size, now: Instant) -> Vec<Action> {
        self.measured = Some(size);
        self.relayout(now)
    }

    /// React to a layout change.
    ///
    /// The new position is applied right away; a placement change waits for
    /// the next frame and only happens when the spec may flip.
    fn relayout(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();

        if let Some(pending) = self.pending_open() {
            if let Some(spec) = self.spec(pending.key, pending.mode) {
                let refreshed = ActiveOverlay::new(pending.key, pending.mode, self.fresh_layout_for(pending.key, spec));
                if let Some(Transition::Open(target)) = self.scheduler.pending_action_mut() {
                    *target = refreshed;
                }
            }
        }

        let Some(active) = self.active() else {
            return actions;
        };
        let Some(spec) = self.spec(active.key, active.mode) else {
            return actions;
        };
        let layout = self.layout_for(active.key, spec);
        let allow_flip = self.config.allow_flip(spec);

        if layout.position != active.position {
            if let Visibility::Open(open) = &mut self.state {
                open.position = layout.position;
            }
            actions.push(Action::Reposition {
                position: layout.position,
            });
        }

        if layout.placement == active.placement {
            self.frame = None;
        } else if allow_flip && self.frame.map(|(_, p)| p) != Some(layout.placement) {
            debug!(from = %active.placement, to = %layout.placement, "placement change deferred to next frame");
            self.frame = Some((now + FRAME_INTERVAL, layout.placement));
        }

        actions
    }

    /// Drop every pending timer and listener. Used when the host view goes
    /// away; lifecycle hooks are not called.
    pub fn teardown(&mut self) -> Vec<Action> {
        self.scheduler.cancel_pending();
        self.frame = None;
        self.state = Visibility::Closed;
        self.measured = None;
        debug!(id = %self.id, "trigger torn down");
        self.subscription.detach().into_iter().collect()
    }
}
