use serde::{Deserialize, Serialize};

/// Where keyboard focus is, or should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusTarget {
    Trigger,
    /// The overlay container itself.
    Overlay,
    /// A child of the overlay, by index in the reported child list.
    Descendant { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Button,
    Link,
    Input,
    Select,
    Textarea,
    Other,
}

/// A child element of a mounted overlay, as reported by the presenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descendant {
    pub kind: ElementKind,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub tab_index: Option<i32>,
}

impl Descendant {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            disabled: false,
            tab_index: None,
        }
    }

    /// Controls are tab stops unless disabled or opted out with a negative
    /// tabindex; any element with an explicit non-negative tabindex is one.
    pub fn is_tab_stop(&self) -> bool {
        match self.tab_index {
            Some(idx) if idx >= 0 => true,
            Some(_) => false,
            None => self.kind != ElementKind::Other && !self.disabled,
        }
    }
}

/// Tab stops of an open overlay, used to keep Tab cycling inside it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FocusTrap {
    stops: Vec<usize>,
}

impl FocusTrap {
    pub fn from_descendants(descendants: &[Descendant]) -> Self {
        let stops = descendants
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_tab_stop())
            .map(|(i, _)| i)
            .collect();
        Self { stops }
    }

    pub fn first(&self) -> Option<FocusTarget> {
        self.stops.first().map(|&index| FocusTarget::Descendant { index })
    }

    pub fn last(&self) -> Option<FocusTarget> {
        self.stops.last().map(|&index| FocusTarget::Descendant { index })
    }

    /// Target to move to when Tab (or Shift+Tab with `backwards`) would
    /// leave the overlay. `None` means the default traversal is fine.
    pub fn wrap(&self, focused: FocusTarget, backwards: bool) -> Option<FocusTarget> {
        let (edge, other) = if backwards {
            (self.first()?, self.last()?)
        } else {
            (self.last()?, self.first()?)
        };
        (focused == edge).then_some(other)
    }
}
