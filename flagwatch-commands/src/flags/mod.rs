pub(crate) mod embeds;
pub mod flagconfig;
pub mod pending;
pub mod release;
pub mod resetconfig;
pub mod setconfig;
