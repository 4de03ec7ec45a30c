use serde::{Deserialize, Deserializer, Serialize};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;

/// Lifecycle hook attached to a popup spec.
pub type Callback = Rc<dyn Fn()>;

/// How an overlay is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Hover,
    Click,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hover => "hover",
            Self::Click => "click",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hover" => Ok(Self::Hover),
            "click" => Ok(Self::Click),
            other => Err(format!("unknown interaction mode '{}'", other)),
        }
    }
}

/// Handed to content renderers so the content can close its own overlay.
///
/// Calling [`Closer::close`] only records the request; the trigger turns it
/// into a close intent the next time it handles an event or polls timers.
#[derive(Debug, Clone, Default)]
pub struct Closer {
    requested: Rc<Cell<bool>>,
}

impl Closer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.requested.set(true);
    }

    /// Consume a pending close request.
    pub fn take_request(&self) -> bool {
        self.requested.replace(false)
    }
}

/// What an overlay shows: fixed text, or a function of the overlay's closer.
#[derive(Clone)]
pub enum Content {
    Static(String),
    Render(Rc<dyn Fn(&Closer) -> String>),
}

impl Content {
    /// Produce the content. Only called while the overlay is mounted.
    pub fn render(&self, closer: &Closer) -> String {
        match self {
            Self::Static(text) => text.clone(),
            Self::Render(f) => f(closer),
        }
    }
}

impl Default for Content {
    fn default() -> Self {
        Self::Static(String::new())
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Self::Render(_) => f.write_str("Render(..)"),
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Static(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Static(text)
    }
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Content::Static)
    }
}

/// Behavior of one (placement, mode) cell of a configuration.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PopupSpec {
    #[serde(default, rename = "element")]
    pub content: Content,
    /// Gap to the trigger. Falls back to the global offset when unset.
    #[serde(default)]
    pub offset: Option<f64>,
    #[serde(default)]
    pub disable_flip: bool,
    /// Hover only.
    #[serde(default)]
    pub open_delay_ms: u64,
    /// Hover only.
    #[serde(default)]
    pub close_delay_ms: u64,
    /// Hover only: the pointer may move onto the overlay without closing it.
    #[serde(default)]
    pub enterable: bool,
    #[serde(default = "PopupSpec::default_apply_class_names")]
    pub apply_default_class_names: bool,
    #[serde(skip)]
    pub on_open: Option<Callback>,
    #[serde(skip)]
    pub on_close: Option<Callback>,
    #[serde(skip)]
    pub on_mouse_enter: Option<Callback>,
    #[serde(skip)]
    pub on_mouse_leave: Option<Callback>,
}

impl PopupSpec {
    fn default_apply_class_names() -> bool { true }

    pub fn new(content: impl Into<Content>) -> Self {
        Self {
            content: content.into(),
            offset: None,
            disable_flip: false,
            open_delay_ms: 0,
            close_delay_ms: 0,
            enterable: false,
            apply_default_class_names: true,
            on_open: None,
            on_close: None,
            on_mouse_enter: None,
            on_mouse_leave: None,
        }
    }

    /// Content computed from the overlay's [`Closer`] each time it mounts.
    pub fn render(f: impl Fn(&Closer) -> String + 'static) -> Self {
        Self::new(Content::Render(Rc::new(f)))
    }

    #[must_use]
    pub fn offset(mut self, offset: f64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn disable_flip(mut self, disable: bool) -> Self {
        self.disable_flip = disable;
        self
    }

    #[must_use]
    pub fn open_delay_ms(mut self, ms: u64) -> Self {
        self.open_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn close_delay_ms(mut self, ms: u64) -> Self {
        self.close_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn enterable(mut self, enterable: bool) -> Self {
        self.enterable = enterable;
        self
    }

    #[must_use]
    pub fn default_class_names(mut self, apply: bool) -> Self {
        self.apply_default_class_names = apply;
        self
    }

    #[must_use]
    pub fn on_open(mut self, f: impl Fn() + 'static) -> Self {
        self.on_open = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_close(mut self, f: impl Fn() + 'static) -> Self {
        self.on_close = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_mouse_enter(mut self, f: impl Fn() + 'static) -> Self {
        self.on_mouse_enter = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_mouse_leave(mut self, f: impl Fn() + 'static) -> Self {
        self.on_mouse_leave = Some(Rc::new(f));
        self
    }

    /// Click transitions are immediate regardless of the delay fields.
    pub fn open_delay(&self, mode: Mode) -> Duration {
        match mode {
            Mode::Hover => Duration::from_millis(self.open_delay_ms),
            Mode::Click => Duration::ZERO,
        }
    }

    pub fn close_delay(&self, mode: Mode) -> Duration {
        match mode {
            Mode::Hover => Duration::from_millis(self.close_delay_ms),
            Mode::Click => Duration::ZERO,
        }
    }

    /// Enterable only has meaning for hover overlays.
    pub fn is_enterable(&self, mode: Mode) -> bool {
        mode == Mode::Hover && self.enterable
    }
}

impl Default for PopupSpec {
    fn default() -> Self {
        Self::new(Content::default())
    }
}

impl fmt::Debug for PopupSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupSpec")
            .field("content", &self.content)
            .field("offset", &self.offset)
            .field("disable_flip", &self.disable_flip)
            .field("open_delay_ms", &self.open_delay_ms)
            .field("close_delay_ms", &self.close_delay_ms)
            .field("enterable", &self.enterable)
            .field("apply_default_class_names", &self.apply_default_class_names)
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_mouse_enter", &self.on_mouse_enter.is_some())
            .field("on_mouse_leave", &self.on_mouse_leave.is_some())
            .finish()
    }
}

/// Invoke an optional hook.
pub(crate) fn fire(callback: &Option<Callback>) {
    if let Some(f) = callback {
        f();
    }
}
