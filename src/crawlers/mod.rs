pub mod progress;
pub mod renderer;
pub mod scheduler;
pub mod visited;
pub mod web;

pub use progress::{CrawlProgress, ProgressSnapshot};
pub use renderer::{PageRenderer, WebDriverRenderer};
pub use web::{RunSummary, Traversal};
