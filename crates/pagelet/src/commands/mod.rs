pub mod build;
pub mod check;
pub mod dev;
pub mod extract;
pub mod init;
pub mod transpile;
