//! `SeaORM` entities for the mactrack tables.

pub mod prelude;

pub mod mac_address;
pub mod mac_movement;
