//! Accessibility attributes presenters must put on the trigger and overlay.

use crate::geometry::Placement;
use crate::popup::Mode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerAttrs {
    pub aria_haspopup: bool,
    pub aria_expanded: bool,
    /// Id of the open overlay.
    pub aria_describedby: Option<String>,
}

impl TriggerAttrs {
    pub fn closed() -> Self {
        Self {
            aria_haspopup: true,
            aria_expanded: false,
            aria_describedby: None,
        }
    }

    pub fn open(overlay_id: &str) -> Self {
        Self {
            aria_haspopup: true,
            aria_expanded: true,
            aria_describedby: Some(overlay_id.to_string()),
        }
    }

    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("aria-haspopup", self.aria_haspopup.to_string()),
            ("aria-expanded", self.aria_expanded.to_string()),
        ];
        if let Some(id) = &self.aria_describedby {
            pairs.push(("aria-describedby", id.clone()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayAttrs {
    pub id: String,
    pub role: String,
    pub aria_live: String,
    pub aria_modal: bool,
    pub tabindex: i32,
    pub data_placement: Placement,
}

impl OverlayAttrs {
    /// Click overlays behave like dialogs: modal, assertive, focusable.
    pub fn new(id: &str, mode: Mode, placement: Placement) -> Self {
        let click = mode == Mode::Click;
        Self {
            id: id.to_string(),
            role: "tooltip".to_string(),
            aria_live: if click { "assertive" } else { "polite" }.to_string(),
            aria_modal: click,
            tabindex: if click { 0 } else { -1 },
            data_placement: placement,
        }
    }

    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("id", self.id.clone()),
            ("role", self.role.clone()),
            ("aria-live", self.aria_live.clone()),
        ];
        if self.aria_modal {
            pairs.push(("aria-modal", "true".to_string()));
        }
        pairs.push(("tabindex", self.tabindex.to_string()));
        pairs.push(("data-placement", self.data_placement.to_string()));
        pairs
    }
}

/// Class names added when a spec keeps the default styling hooks.
pub fn default_class_names(placement: Placement, mode: Mode) -> Vec<String> {
    vec![
        "popover".to_string(),
        format!("popover-{}", placement),
        format!("popover-{}", mode),
    ]
}
