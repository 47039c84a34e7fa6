pub mod revive;
pub mod tools;
