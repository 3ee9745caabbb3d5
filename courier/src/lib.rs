pub mod controller;
pub mod credentials;
