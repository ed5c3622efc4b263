pub mod extractor;
pub mod layout;
