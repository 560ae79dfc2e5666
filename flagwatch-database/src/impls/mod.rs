pub mod flag_config;
