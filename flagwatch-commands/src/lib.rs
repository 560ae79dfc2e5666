pub mod flags;
pub mod utility;

use flagwatch_core::{Data, Error};

pub struct CommandMeta {
    pub name: &'static str,
    pub desc: &'static str,
    pub category: &'static str,
    pub usage: &'static str,
}

pub const COMMANDS: &[CommandMeta] = &[
    utility::help::META,
    flags::setconfig::META,
    flags::resetconfig::META,
    flags::flagconfig::META,
    flags::pending::META,
    flags::release::META,
];

pub fn commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        utility::help::help(),
        flags::setconfig::setconfig(),
        flags::resetconfig::resetconfig(),
        flags::flagconfig::flagconfig(),
        flags::pending::pending(),
        flags::release::release(),
    ]
}
