pub mod gallery_item;
pub mod raw_record;
pub mod record_store;

pub use gallery_item::*;
pub use raw_record::*;
pub use record_store::*;
