pub mod dispatcher;
pub mod parser;
