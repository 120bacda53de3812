//! Display hand-off
//!
//! Producers on any context enqueue [`UiUpdate`]s; the render loop on the
//! widget-owning context applies them.

pub mod audio_view;
pub mod queue;
pub mod render;

pub use queue::{create_shared_queue, SharedUiQueue, UiUpdate, UiUpdateQueue, UiUpdateSender};
pub use render::{RenderHandle, RenderLoop, RenderStats, UiSink};
