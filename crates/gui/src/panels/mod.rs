pub mod console;
pub mod controls;
