pub mod event;
pub mod issue;
pub mod mapping;
