//! Bell Module
//!
//! XKB bell capture and window metadata/icon extraction.

pub mod event;
pub mod hints;
pub mod icons;
pub mod pixels;
pub mod query;
pub mod resolver;
pub mod session;

pub use event::BellEvent;
pub use icons::IconStrategy;
pub use pixels::IconImage;
pub use resolver::IconOptions;
pub use session::DisplaySession;
