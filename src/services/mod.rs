pub mod crypto;
pub mod document_schema;
pub mod form;
pub mod hosted;
pub mod local;
pub mod platform;
pub mod state;
pub mod totals;
