pub mod printf;

pub use printf::format_into;
