pub mod checksum;
pub mod io;
