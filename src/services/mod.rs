pub mod github;
pub mod image;
pub mod remote;
pub mod staging;
pub mod sync;
pub mod worker;
