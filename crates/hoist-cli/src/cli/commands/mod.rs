pub mod install;
pub mod key;
pub mod repo;
pub mod store;

mod dispatch;
pub use dispatch::dispatch;
