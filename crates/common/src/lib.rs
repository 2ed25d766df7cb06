// hexgate-common: shared types and wire protocol for the hexgate workspace

pub mod protocol;
pub mod room;
pub mod world;
