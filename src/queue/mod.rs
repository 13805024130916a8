//! # Queue Module
//!
//! Separa le responsabilità della coda in sottomoduli:
//! - `manager`: Orchestratore principale (FIFO, lock, drain, watch)
//! - `task`: Pipeline di un singolo video con un tentativo di recupero
//! - `progress_tracker`: Stadi e feedback (stato, spinner, JSON)
//! - `path_resolver`: Path di output per item

pub mod manager;
pub mod path_resolver;
pub mod progress_tracker;
pub mod task;

pub use manager::{QueueManager, Step};
pub use path_resolver::PathResolver;
pub use progress_tracker::{ProgressTracker, Stage};
pub use task::{ItemOutcome, ItemTask};
