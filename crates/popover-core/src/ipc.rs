use crate::geometry::{Placement, Rect, Size};
use crate::machine::Action;
use crate::popup::Mode;
use crate::router::InputEvent;
use serde::{Deserialize, Serialize};

/// Lifecycle hooks forwarded to the host that mounted a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Open,
    Close,
    MouseEnter,
    MouseLeave,
}

/// Messages from daemon to hosts (JSON-lines over Unix socket).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DaemonMsg {
    /// Something the presenter must do to the document.
    #[serde(rename = "apply")]
    Apply { action: Action },
    /// A popup spec's lifecycle hook ran.
    #[serde(rename = "lifecycle")]
    Lifecycle {
        event: LifecycleEvent,
        placement: Placement,
        mode: Mode,
    },
    /// Acknowledgement for mount/unmount.
    #[serde(rename = "ack")]
    Ack { ok: bool, message: String },
}

/// Messages from hosts to daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    /// Create the trigger instance for this connection.
    #[serde(rename = "mount")]
    Mount {
        id: String,
        trigger: Rect,
        viewport: Size,
        /// TOML configuration; the daemon's own is used when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        config: Option<String>,
    },
    #[serde(rename = "input")]
    Input { event: InputEvent },
    /// Tear the instance down, keeping the connection open.
    #[serde(rename = "unmount")]
    Unmount,
}

/// Serialize a message as a JSON line (with trailing newline).
pub fn encode(msg: &impl Serialize) -> String {
    let mut s = serde_json::to_string(msg).expect("serialize IPC message");
    s.push('\n');
    s
}

/// Deserialize a JSON line. Returns None on empty/whitespace or malformed input.
pub fn decode_daemon(line: &str) -> Option<DaemonMsg> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

pub fn decode_client(line: &str) -> Option<ClientMsg> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::TriggerAttrs;
    use crate::focus::FocusTarget;
    use crate::geometry::Position;
    use crate::router::Key;

    #[test]
    fn encode_produces_single_trailing_newline() {
        let encoded = encode(&DaemonMsg::Apply {
            action: Action::Reposition {
                position: Position { top: 1.0, left: 2.0 },
            },
        });
        assert!(encoded.ends_with('\n'));
        assert_eq!(encoded.matches('\n').count(), 1);
    }

    #[test]
    fn encode_never_yields_blank_line() {
        let encoded = encode(&ClientMsg::Unmount);
        assert_eq!(encoded, "{\"type\":\"unmount\"}\n");
    }

    #[test]
    fn mount_without_config_decodes() {
        let line = r#"{"type":"mount","id":"tip","trigger":{"top":300,"left":400,"width":80,"height":30},"viewport":{"width":1024,"height":768}}"#;
        match decode_client(line).expect("should decode") {
            ClientMsg::Mount { id, trigger, viewport, config } => {
                assert_eq!(id, "tip");
                assert_eq!(trigger.right(), 480.0);
                assert_eq!(viewport, Size::new(1024.0, 768.0));
                assert!(config.is_none());
            }
            other => panic!("expected Mount, got {:?}", other),
        }
    }

    #[test]
    fn input_carries_router_event() {
        let line = r#"{"type":"input","event":{"kind":"key_down","key":"tab","shift":true,"focus":{"descendant":{"index":3}}}}"#;
        let msg = decode_client(line).expect("should decode");
        assert_eq!(
            msg,
            ClientMsg::Input {
                event: InputEvent::KeyDown {
                    key: Key::Tab,
                    shift: true,
                    focus: FocusTarget::Descendant { index: 3 },
                }
            }
        );
    }

    #[test]
    fn action_is_nested_under_apply() {
        let encoded = encode(&DaemonMsg::Apply {
            action: Action::Hide {
                trigger: TriggerAttrs::closed(),
            },
        });
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["type"], "apply");
        assert_eq!(value["action"]["type"], "hide");
        assert_eq!(value["action"]["trigger"]["aria_expanded"], false);
    }

    #[test]
    fn lifecycle_uses_lowercase_names() {
        let encoded = encode(&DaemonMsg::Lifecycle {
            event: LifecycleEvent::MouseEnter,
            placement: Placement::Left,
            mode: Mode::Hover,
        });
        assert!(encoded.contains(r#""event":"mouse_enter""#));
        assert!(encoded.contains(r#""placement":"left""#));
        assert_eq!(decode_daemon(&encoded).map(|m| matches!(m, DaemonMsg::Lifecycle { .. })), Some(true));
    }

    // --- empty/whitespace input → None ---

    #[test]
    fn decode_returns_none_for_empty() {
        for line in ["", "   ", "\n"] {
            assert!(decode_daemon(line).is_none());
            assert!(decode_client(line).is_none());
        }
    }

    // --- invalid JSON → None (not panic) ---

    #[test]
    fn decode_returns_none_for_garbage() {
        assert!(decode_daemon("not json").is_none());
        assert!(decode_daemon(r#"{"type":"unknown_variant"}"#).is_none());
        assert!(decode_client(r#"{"type":"input","event":{"kind":"teleport"}}"#).is_none());
    }
}
