pub mod attrs;
pub mod config;
pub mod focus;
pub mod geometry;
pub mod ipc;
pub mod machine;
pub mod popup;
pub mod router;
pub mod scheduler;
pub mod subscription;

pub use config::{Config, Configuration};
pub use geometry::{compute_position, Placement, Point, Position, Rect, Size};
pub use machine::{Action, RenderState, VisibilityMachine};
pub use popup::{Closer, Mode, PopupSpec};
pub use router::{InputEvent, Key, Trigger};
