#![forbid(unsafe_code)]

pub mod debounce;
pub mod error;
pub mod model;
pub mod session;
pub mod time;
pub mod virtual_list;

pub use error::Error;
pub use time::Clock;
