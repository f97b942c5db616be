pub mod constants;
pub mod prize_table;
pub mod shared_wheel_game;
pub mod validation;
