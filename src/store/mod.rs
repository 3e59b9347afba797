pub mod db;
pub mod traces;

pub use db::Store;
pub use traces::TraceStore;
