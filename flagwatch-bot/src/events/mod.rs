pub mod flag_reaction;
