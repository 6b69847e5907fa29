pub mod controller;

pub use controller::Spoolpost;
