pub mod update_index;

pub use update_index::{UpdateIndex, UpdateObserver};
