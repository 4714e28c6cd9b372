//! 跟读状态机、翻页策略、读错记录和渲染快照

mod engine;
mod mistakes;
mod page_policy;
mod snapshot;

pub use engine::{IgnoreReason, RecitationTracker, TokenOutcome, TrackerState};
pub use mistakes::{Mistake, MistakeLog};
pub use page_policy::{on_page_complete, PagePolicy};
pub use snapshot::{RenderSnapshot, WordView};
