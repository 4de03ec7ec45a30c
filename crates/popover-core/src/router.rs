use crate::config::Config;
use crate::focus::{Descendant, FocusTarget, FocusTrap};
use crate::geometry::{Placement, Point, Rect, Size};
use crate::machine::{Action, Hook, VisibilityMachine};
use crate::popup::Mode;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Enter,
    Space,
    Escape,
    Tab,
    #[serde(other)]
    Other,
}

/// Raw input reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputEvent {
    PointerEnterTrigger,
    PointerLeaveTrigger,
    PointerEnterOverlay,
    PointerLeaveOverlay,
    /// Primary click on the trigger.
    Click,
    KeyDown {
        key: Key,
        #[serde(default)]
        shift: bool,
        /// Element holding focus when the key went down.
        focus: FocusTarget,
    },
    /// Pointer pressed anywhere in the document.
    PointerDown { point: Point },
    Resize { viewport: Size },
    /// The trigger moved in the viewport (scrolling or relayout).
    Scroll { trigger: Rect },
    OverlayMeasured { size: Size },
    /// Children of the mounted overlay, in document order.
    OverlayChildren { children: Vec<Descendant> },
}

/// One trigger instance: its state machine plus the rules that turn input
/// into open/close intents.
pub struct Trigger {
    machine: VisibilityMachine,
    trap: FocusTrap,
}

impl Trigger {
    pub fn new(id: impl Into<String>, config: Config, trigger: Rect, viewport: Size) -> Self {
        Self {
            machine: VisibilityMachine::new(id, config, trigger, viewport),
            trap: FocusTrap::default(),
        }
    }

    pub fn machine(&self) -> &VisibilityMachine {
        &self.machine
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.machine.next_deadline()
    }

    pub fn check_timer(&mut self, now: Instant) -> Vec<Action> {
        let before = self.shown_pair();
        self.poll_close_request(now);
        let actions = self.machine.check_timer(now);
        self.after(before, actions)
    }

    pub fn teardown(&mut self) -> Vec<Action> {
        self.trap = FocusTrap::default();
        self.machine.teardown()
    }

    pub fn handle(&mut self, event: InputEvent, now: Instant) -> Vec<Action> {
        let before = self.shown_pair();
        self.poll_close_request(now);

        let actions = match event {
            InputEvent::PointerEnterTrigger => {
                self.trigger_entered(now);
                Vec::new()
            }
            InputEvent::PointerLeaveTrigger => {
                self.trigger_left(now);
                Vec::new()
            }
            InputEvent::PointerEnterOverlay => {
                self.overlay_entered();
                Vec::new()
            }
            InputEvent::PointerLeaveOverlay => {
                self.overlay_left(now);
                Vec::new()
            }
            InputEvent::Click => {
                self.clicked(now);
                Vec::new()
            }
            InputEvent::KeyDown { key, shift, focus } => self.key_down(key, shift, focus, now),
            InputEvent::PointerDown { point } => {
                self.pointer_down(point, now);
                Vec::new()
            }
            InputEvent::Resize { viewport } => self.machine.set_viewport(viewport, now),
            InputEvent::Scroll { trigger } => self.machine.set_trigger_rect(trigger, now),
            InputEvent::OverlayMeasured { size } => self.machine.set_overlay_size(size, now),
            InputEvent::OverlayChildren { children } => {
                self.trap = FocusTrap::from_descendants(&children);
                Vec::new()
            }
        };

        self.after(before, actions)
    }

    fn shown_pair(&self) -> Option<(Placement, Mode)> {
        self.machine.active().map(|a| (a.key, a.mode))
    }

    /// Tab stops belong to one mounted overlay; forget them when it goes away
    /// or another overlay replaces it.
    fn after(&mut self, before: Option<(Placement, Mode)>, actions: Vec<Action>) -> Vec<Action> {
        let hidden = actions.iter().any(|a| matches!(a, Action::Hide { .. }));
        let replaced = self.shown_pair() != before
            && actions.iter().any(|a| matches!(a, Action::Show(_)));
        if hidden || replaced {
            self.trap = FocusTrap::default();
        }
        actions
    }

    fn poll_close_request(&mut self, now: Instant) {
        if self.machine.closer().take_request() {
            debug!("content requested close");
            self.machine.close(now);
        }
    }

    /// Only the first hover placement in the configuration is reachable.
    fn trigger_entered(&mut self, now: Instant) {
        if let Some(key) = self.machine.config().placements.first_hover() {
            self.machine.open(key, Mode::Hover, now);
        }
    }

    fn trigger_left(&mut self, now: Instant) {
        let Some(target) = self.machine.current_target() else {
            return;
        };
        if target.mode != Mode::Hover {
            return;
        }

        // An enterable overlay survives so the pointer can travel onto it;
        // one that has not appeared yet has nothing to travel to.
        let enterable = self
            .machine
            .spec(target.key, target.mode)
            .is_some_and(|spec| spec.is_enterable(target.mode));
        let shown = self.machine.active() == Some(target);
        if enterable && shown {
            return;
        }
        self.machine.close(now);
    }

    /// The open overlay, if the pointer is allowed onto it.
    fn enterable_hover(&self) -> Option<(Placement, Mode)> {
        let active = self.machine.active()?;
        let spec = self.machine.spec(active.key, active.mode)?;
        spec.is_enterable(active.mode).then_some((active.key, active.mode))
    }

    fn overlay_entered(&mut self) {
        let Some((key, mode)) = self.enterable_hover() else {
            return;
        };
        self.machine.cancel_pending_close();
        self.machine.invoke(key, mode, Hook::MouseEnter);
    }

    fn overlay_left(&mut self, now: Instant) {
        let Some((key, mode)) = self.enterable_hover() else {
            return;
        };
        self.machine.close(now);
        self.machine.invoke(key, mode, Hook::MouseLeave);
    }

    /// Opens every click placement in order; the single slot keeps the last.
    fn clicked(&mut self, now: Instant) {
        let keys: Vec<_> = self
            .machine
            .config()
            .placements
            .placements_for(Mode::Click)
            .collect();
        for key in keys {
            self.machine.open(key, Mode::Click, now);
        }
    }

    fn pointer_down(&mut self, point: Point, now: Instant) {
        if !self.machine.is_listening() {
            return;
        }
        let Some(active) = self.machine.active() else {
            return;
        };
        if active.mode != Mode::Click {
            return;
        }
        let on_trigger = self.machine.trigger_rect().contains(point);
        let on_overlay = self
            .machine
            .overlay_rect()
            .is_some_and(|rect| rect.contains(point));
        if !on_trigger && !on_overlay {
            debug!(x = point.x, y = point.y, "pointer down outside, closing");
            self.machine.close(now);
        }
    }

    fn key_down(&mut self, key: Key, shift: bool, focus: FocusTarget, now: Instant) -> Vec<Action> {
        match key {
            Key::Enter | Key::Space if focus == FocusTarget::Trigger => {
                self.clicked(now);
                Vec::new()
            }
            Key::Escape if self.machine.is_listening() && self.machine.is_open() => {
                debug!("escape pressed, closing");
                self.machine.close_restoring_focus(now);
                Vec::new()
            }
            Key::Tab if self.machine.is_listening() => self.tab(shift, focus),
            _ => Vec::new(),
        }
    }

    fn tab(&mut self, backwards: bool, focus: FocusTarget) -> Vec<Action> {
        if self.machine.active().map(|a| a.mode) != Some(Mode::Click) {
            return Vec::new();
        }
        match self.trap.wrap(focus, backwards) {
            Some(target) => vec![Action::PreventDefault, Action::Focus { target }],
            None => Vec::new(),
        }
    }
}
