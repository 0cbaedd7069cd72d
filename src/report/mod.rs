//! Report formatting: HTML for the renderer and mrkdwn text for chat.

pub mod html;
pub mod message;

pub use html::generate_html;
pub use message::{dry_run_message, image_caption, report_message};
