pub mod capture;
pub mod classify;
pub mod diagnostic;
pub mod fallback;
pub mod history;
pub mod process;
pub mod record;
pub mod sanitize;
