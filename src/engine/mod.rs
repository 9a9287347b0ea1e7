pub mod draft;
pub mod draft_engine;
pub mod error;
pub mod events;
pub mod room;
pub mod session;
pub mod validation;
