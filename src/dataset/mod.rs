//! Recipient datasets: loading, validation and identifier checks.

pub mod loader;
pub mod model;
pub mod phone;
pub mod preview;
pub mod validator;

pub use loader::{load_dataset, write_sample_dataset};
pub use model::*;
pub use preview::{Preview, PreviewEntry, preview};
pub use validator::{DatasetValidator, validate};
