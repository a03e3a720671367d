pub mod keys;
pub mod preview;

pub use keys::{action_for, poll_action, print_line, KeyAction, RawMode, KEY_HELP};
pub use preview::annotate_detections;
