pub mod index_entry;
pub mod package;
pub mod package_header;
pub mod package_index;
pub mod package_writer;
pub mod resource_key;
