pub mod add;
pub mod path;
pub mod verify;
