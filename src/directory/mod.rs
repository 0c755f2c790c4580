pub mod dir;
pub mod fs;
pub mod mmap;
pub mod ram;
pub mod sqlite;
