pub mod archive;
pub mod backup;
pub mod summary;
pub mod tools;
