pub mod cleanup;
pub mod init;
pub mod reset;
pub mod run;
pub mod start;
pub mod status;
pub mod stop;
pub mod tick;
