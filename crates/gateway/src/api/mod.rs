pub mod users;
pub mod world;
