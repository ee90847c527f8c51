//! Channel abstraction for driving the target application.

pub mod channel;
pub mod simulated;
pub mod webdriver;

pub use channel::*;
pub use simulated::SimulatedChannel;
pub use webdriver::WebDriverChannel;
