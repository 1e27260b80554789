pub mod question;
pub mod transcript;
